use crate::core::{ListingRepository, MatchingError};
use crate::models::{
    BulkRegenerateResponse, CommitWeightsRequest, ExpireResponse, ProposeWeightsRequest,
    ProposeWeightsResponse, RegenerateMatchesRequest, StatsResponse, SuggestWeightsRequest,
    SuggestWeightsResponse,
};
use crate::routes::auth::authorize;
use crate::routes::{validation_failed, AppState};
use crate::services::PostgresError;
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::atomic::Ordering;
use validator::Validate;

/// Configure weight administration and bulk maintenance routes
///
/// Every route requires an administrator bearer token.
pub fn configure<R: ListingRepository + 'static>(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/weights", web::get().to(get_weights::<R>))
        .route("/weights", web::post().to(commit_weights::<R>))
        .route("/weights/history", web::get().to(weight_history::<R>))
        .route("/weights/{version:\\d+}", web::get().to(get_weight_version::<R>))
        .route("/weights/propose", web::post().to(propose_weights::<R>))
        .route("/weights/suggest", web::post().to(suggest_weights::<R>))
        .route("/matches/regenerate", web::post().to(regenerate_matches::<R>))
        .route("/matches/regenerate/cancel", web::post().to(cancel_regeneration::<R>))
        .route("/matches/expire", web::post().to(expire_matches::<R>))
        .route("/stats", web::get().to(stats::<R>));
}

/// GET /api/v1/admin/weights
async fn get_weights<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;
    Ok(HttpResponse::Ok().json(state.engine.get_weights()))
}

/// GET /api/v1/admin/weights/history
async fn weight_history<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;
    Ok(HttpResponse::Ok().json(state.engine.weight_history()))
}

/// GET /api/v1/admin/weights/{version}
async fn get_weight_version<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;
    Ok(HttpResponse::Ok().json(state.engine.weight_version(path.into_inner())?))
}

/// Preview a partial weight update
///
/// POST /api/v1/admin/weights/propose
///
/// Accepts any subset of weights, including the WordPress slider keys:
/// ```json
/// { "weight_category_match": 0.4, "urgency": 0.1 }
/// ```
async fn propose_weights<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
    req: web::Json<ProposeWeightsRequest>,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;

    let proposed = state.engine.propose_weight_adjustment(&req.weights)?;

    Ok(HttpResponse::Ok().json(ProposeWeightsResponse {
        current: state.engine.get_weights(),
        proposed,
    }))
}

/// Commit a new weight version
///
/// POST /api/v1/admin/weights
async fn commit_weights<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
    req: web::Json<CommitWeightsRequest>,
) -> actix_web::Result<HttpResponse> {
    let admin = authorize(&http_req, &state.auth)?;

    let staged = state.engine.stage_weights(&req.weights, &admin.author)?;

    // A version only goes live once it is stored
    if let Some(postgres) = &state.postgres {
        postgres
            .save_weight_version(&staged)
            .await
            .map_err(|e| match e {
                PostgresError::VersionTaken(found) => MatchingError::VersionConflict {
                    expected: state.engine.get_weights().version + 1,
                    found,
                },
                other => MatchingError::NotPersisted {
                    version: staged.version,
                    reason: other.to_string(),
                },
            })?;
    }

    let committed = state.engine.publish_weights(staged)?;

    Ok(HttpResponse::Created().json(committed))
}

/// Ask the optimizer for a recommendation; nothing is committed
///
/// POST /api/v1/admin/weights/suggest
async fn suggest_weights<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
    body: Option<web::Json<SuggestWeightsRequest>>,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;

    let req = body.map(web::Json::into_inner).unwrap_or_default();
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }

    let lookback_days = req
        .lookback_days
        .unwrap_or(state.engine.optimizer().config().default_lookback_days);

    let current = state.engine.get_weights();
    let suggestion = state
        .engine
        .suggest_weights(chrono::Duration::days(lookback_days))?;

    Ok(HttpResponse::Ok().json(SuggestWeightsResponse {
        current,
        proposed: suggestion.proposed,
        lookback_days,
        rationale: suggestion.rationale,
    }))
}

/// Re-score listings in bulk
///
/// POST /api/v1/admin/matches/regenerate
///
/// Without `listing_ids` every active listing is processed. Per-listing
/// failures are reported in the body rather than failing the request.
async fn regenerate_matches<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
    body: Option<web::Json<RegenerateMatchesRequest>>,
) -> actix_web::Result<HttpResponse> {
    let admin = authorize(&http_req, &state.auth)?;

    let req = body.map(web::Json::into_inner).unwrap_or_default();
    if let Err(errors) = req.validate() {
        return Ok(validation_failed(errors));
    }

    state.cancel_regeneration.store(false, Ordering::Release);
    tracing::info!("Bulk regeneration started by {}", admin.author);

    let report = match &req.listing_ids {
        Some(ids) => {
            state
                .engine
                .regenerate_matches(ids, &state.cancel_regeneration)
                .await
        }
        None => {
            state
                .engine
                .regenerate_all(&state.cancel_regeneration)
                .await?
        }
    };

    state.persist_archived().await;

    tracing::info!(
        "Bulk regeneration processed {} listings ({} failures{})",
        report.processed,
        report.failures.len(),
        if report.interrupted { ", interrupted" } else { "" }
    );

    Ok(HttpResponse::Ok().json(BulkRegenerateResponse::from(&report)))
}

/// POST /api/v1/admin/matches/regenerate/cancel
async fn cancel_regeneration<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
) -> actix_web::Result<HttpResponse> {
    let admin = authorize(&http_req, &state.auth)?;
    state.cancel_regeneration.store(true, Ordering::Release);
    tracing::info!("Bulk regeneration cancellation requested by {}", admin.author);
    Ok(HttpResponse::Accepted().finish())
}

/// Run the expiry sweep now
///
/// POST /api/v1/admin/matches/expire
async fn expire_matches<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;

    let expired = state.engine.expire_stale();
    state.persist_archived().await;

    Ok(HttpResponse::Ok().json(ExpireResponse {
        expired: expired.len(),
        match_ids: expired.iter().map(|m| m.id).collect(),
    }))
}

/// GET /api/v1/admin/stats
async fn stats<R: ListingRepository>(
    state: web::Data<AppState<R>>,
    http_req: HttpRequest,
) -> actix_web::Result<HttpResponse> {
    authorize(&http_req, &state.auth)?;

    let archive = match &state.postgres {
        Some(postgres) => match postgres.archive_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!("Archive statistics unavailable: {}", e);
                None
            }
        },
        None => None,
    };

    let lifecycle = state.engine.lifecycle();
    Ok(HttpResponse::Ok().json(StatsResponse {
        weights_version: state.engine.get_weights().version,
        active_matches: lifecycle.active_count(),
        archived_matches: lifecycle.archived_count(),
        archive,
    }))
}
