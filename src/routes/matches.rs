use crate::core::{ListingRepository, MatchingError};
use crate::models::{
    ErrorResponse, HealthResponse, ListingId, MatchEvent, MatchId, ProposeMatchesRequest,
    ProposeMatchesResponse, RecordEventRequest, RecordEventResponse,
};
use crate::routes::{validation_failed, AppState};
use actix_web::{web, HttpResponse};
use validator::Validate;

/// Configure listing and match routes
pub fn configure<R: ListingRepository + 'static>(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check::<R>))
        .route("/listings/{listing_id}/matches", web::post().to(propose_matches::<R>))
        .route("/matches/{match_id}", web::get().to(get_match::<R>))
        .route("/matches/{match_id}/events", web::post().to(record_event::<R>));
}

/// Health check endpoint
async fn health_check<R: ListingRepository>(state: web::Data<AppState<R>>) -> HttpResponse {
    let db_healthy = match &state.postgres {
        Some(postgres) => postgres.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if db_healthy { "healthy" } else { "degraded" };
    let lifecycle = state.engine.lifecycle();

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        weights_version: state.engine.get_weights().version,
        active_matches: lifecycle.active_count(),
        archived_matches: lifecycle.archived_count(),
        timestamp: chrono::Utc::now(),
    })
}

/// Propose matches endpoint
///
/// POST /api/v1/listings/{listing_id}/matches
///
/// Optional request body:
/// ```json
/// { "top_k": 5 }
/// ```
async fn propose_matches<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    path: web::Path<ListingId>,
    body: Option<web::Json<ProposeMatchesRequest>>,
) -> Result<HttpResponse, MatchingError> {
    let listing_id = path.into_inner();
    let req = body.map(web::Json::into_inner).unwrap_or_default();

    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for propose_matches on {}: {}", listing_id, errors);
        return Ok(validation_failed(errors));
    }

    tracing::info!("Proposing matches for listing {}", listing_id);

    let matches = state.engine.propose_matches(listing_id, req.top_k).await?;

    // Registering may lazily expire a stale pair
    state.persist_archived().await;

    Ok(HttpResponse::Ok().json(ProposeMatchesResponse::new(listing_id, matches)))
}

/// GET /api/v1/matches/{match_id}
async fn get_match<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    path: web::Path<MatchId>,
) -> Result<HttpResponse, MatchingError> {
    let result = state.engine.get_match(path.into_inner());
    state.persist_archived().await;

    Ok(HttpResponse::Ok().json(result?))
}

/// Record match event endpoint
///
/// POST /api/v1/matches/{match_id}/events
///
/// Request body:
/// ```json
/// { "event": "viewed|contacted|completed|declined" }
/// ```
async fn record_event<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    path: web::Path<MatchId>,
    req: web::Json<RecordEventRequest>,
) -> Result<HttpResponse, MatchingError> {
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }

    let Some(event) = MatchEvent::parse(&req.event) else {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "invalid_event".to_string(),
            message: "Event must be one of: viewed, contacted, completed, declined".to_string(),
            status_code: 400,
            current_weights: None,
        }));
    };

    let match_id = path.into_inner();
    let result = state.engine.record_event(match_id, event);

    // The event, or the expiry it uncovered, may have closed the match
    state.persist_archived().await;

    let updated = result?;
    tracing::debug!("Match {} is now {}", match_id, updated.state);

    Ok(HttpResponse::Ok().json(RecordEventResponse::from(&updated)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            weights_version: 0,
            active_matches: 0,
            archived_matches: 0,
            timestamp: chrono::Utc::now(),
        };

        assert_eq!(response.status, "healthy");
    }
}
