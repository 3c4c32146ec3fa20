// Route exports
pub mod admin;
pub mod auth;
pub mod matches;

use crate::config::AuthSettings;
use crate::core::{ExchangeEngine, ListingRepository, MatchingError};
use crate::models::ErrorResponse;
use crate::services::PostgresClient;
use actix_web::{error, http::StatusCode, web, HttpRequest, HttpResponse, ResponseError};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState<R> {
    pub engine: Arc<ExchangeEngine<R>>,
    /// Outcome archive and weight history; handlers run without it in tests
    pub postgres: Option<Arc<PostgresClient>>,
    pub auth: AuthSettings,
    /// Raised to stop a running bulk regeneration between listings
    pub cancel_regeneration: Arc<AtomicBool>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            postgres: self.postgres.clone(),
            auth: self.auth.clone(),
            cancel_regeneration: Arc::clone(&self.cancel_regeneration),
        }
    }
}

impl<R: ListingRepository> AppState<R> {
    pub fn new(
        engine: Arc<ExchangeEngine<R>>,
        postgres: Option<Arc<PostgresClient>>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            engine,
            postgres,
            auth,
            cancel_regeneration: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Write newly archived matches to Postgres
    ///
    /// Best effort: a failed write is logged and the request still succeeds.
    pub async fn persist_archived(&self) {
        let archived = self.engine.take_archived();
        if archived.is_empty() {
            return;
        }
        match &self.postgres {
            Some(postgres) => {
                let written = postgres.archive_matches(&archived).await;
                tracing::debug!("Persisted {}/{} archived matches", written, archived.len());
            }
            None => tracing::debug!(
                "No database configured, {} archived matches kept in memory",
                archived.len()
            ),
        }
    }
}

pub fn configure_routes<R: ListingRepository + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure::<R>)
            .service(web::scope("/admin").configure(admin::configure::<R>)),
    );
}

impl ResponseError for MatchingError {
    fn status_code(&self) -> StatusCode {
        match self {
            MatchingError::InvalidWeights(_) | MatchingError::InsufficientData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MatchingError::UnknownListing(_)
            | MatchingError::UnknownMatch(_)
            | MatchingError::UnknownWeightVersion(_) => StatusCode::NOT_FOUND,
            MatchingError::InvalidTransition { .. } | MatchingError::VersionConflict { .. } => {
                StatusCode::CONFLICT
            }
            MatchingError::NotPersisted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MatchingError::Repository(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let (error, current_weights) = match self {
            MatchingError::InvalidWeights(_) => ("invalid_weights", None),
            MatchingError::InsufficientData { current, .. } => {
                ("insufficient_data", Some(current.as_ref().clone()))
            }
            MatchingError::UnknownListing(_) => ("unknown_listing", None),
            MatchingError::UnknownMatch(_) => ("unknown_match", None),
            MatchingError::InvalidTransition { .. } => ("invalid_transition", None),
            MatchingError::UnknownWeightVersion(_) => ("unknown_weight_version", None),
            MatchingError::VersionConflict { .. } => ("version_conflict", None),
            MatchingError::NotPersisted { .. } => ("weights_not_persisted", None),
            MatchingError::Repository(_) => ("listing_source_unavailable", None),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: error.to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
            current_weights,
        })
    }
}

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(
    err: error::JsonPayloadError,
    req: &HttpRequest,
) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(
    err: error::QueryPayloadError,
    _req: &HttpRequest,
) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Reject a request whose body failed validation
pub(crate) fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "validation_failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
        current_weights: None,
    })
}
