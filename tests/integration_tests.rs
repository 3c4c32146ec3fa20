// Integration tests for the exchange matching engine

use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use exchange_match::config::AuthSettings;
use exchange_match::core::{
    ExchangeEngine, LifecycleConfig, LifecycleManager, Matcher, MatchingError, WeightOptimizer,
    WeightStore,
};
use exchange_match::models::{
    Coordinates, ExchangeType, Listing, ListingStatus, MatchEvent, MatchState, OwnerStats,
    Weights,
};
use exchange_match::routes::{self, AppState};
use exchange_match::services::InMemoryListingRepository;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const BERLIN: (f64, f64) = (52.5200, 13.4050);
// ~2 km north of BERLIN
const TWO_KM_NORTH: (f64, f64) = (52.5380, 13.4050);

fn create_listing(id: u64, exchange_type: ExchangeType, category: &str, at: (f64, f64)) -> Listing {
    Listing {
        id,
        title: format!("Listing {}", id),
        exchange_type,
        category: Some(category.to_string()),
        condition: None,
        value_range: None,
        coordinates: Some(Coordinates {
            latitude: at.0,
            longitude: at.1,
        }),
        urgency: None,
        co2_saved_kg: None,
        owner_id: 100 + id,
        owner_stats: None,
        status: ListingStatus::Active,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn category_location_weights() -> Weights {
    Weights {
        category_match: 0.5,
        location_proximity: 0.5,
        ..Weights::zero()
    }
}

fn create_engine(listings: Vec<Listing>) -> ExchangeEngine<InMemoryListingRepository> {
    ExchangeEngine::new(
        InMemoryListingRepository::with_listings(listings),
        Matcher::with_defaults(),
        WeightStore::new(Weights::default()).unwrap(),
        LifecycleManager::default(),
        WeightOptimizer::default(),
    )
}

fn electronics_pool() -> Vec<Listing> {
    vec![
        create_listing(1, ExchangeType::Give, "electronics", BERLIN),
        create_listing(2, ExchangeType::Request, "electronics", TWO_KM_NORTH),
        create_listing(3, ExchangeType::Request, "books", TWO_KM_NORTH),
    ]
}

#[tokio::test]
async fn test_integration_category_and_location_scenario() {
    let engine = create_engine(electronics_pool());
    engine
        .commit_weights(&category_location_weights(), "test")
        .unwrap();

    let matches = engine.propose_matches(1, None).await.unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].candidate_listing_id, 2);
    assert_eq!(matches[1].candidate_listing_id, 3);
    assert!((matches[0].score - 0.98).abs() < 0.01, "B scored {}", matches[0].score);
    assert!((matches[1].score - 0.48).abs() < 0.01, "C scored {}", matches[1].score);
    assert!(matches[0].reasons.contains(&"Same category".to_string()));
    assert!(matches[0].reasons.contains(&"Within 3 km".to_string()));
}

#[tokio::test]
async fn test_integration_scores_and_features_stay_in_unit_range() {
    let mut pool = electronics_pool();
    pool[0].co2_saved_kg = Some(400.0);
    pool[1].co2_saved_kg = Some(-12.0);
    pool[2].urgency = Some(9);
    pool[2].owner_stats = Some(OwnerStats {
        completed_exchanges: 40,
        completion_rate: Some(3.0),
        rating: Some(11.0),
    });

    let engine = create_engine(pool);
    for m in engine.propose_matches(1, Some(20)).await.unwrap() {
        assert!((0.0..=1.0).contains(&m.score));
        for feature in exchange_match::models::Feature::ALL {
            assert!((0.0..=1.0).contains(&m.features.get(feature)));
        }
    }
}

#[tokio::test]
async fn test_integration_empty_pool_returns_no_matches() {
    let engine = create_engine(vec![create_listing(1, ExchangeType::Give, "electronics", BERLIN)]);

    let matches = engine.propose_matches(1, None).await.unwrap();
    assert!(matches.is_empty());
}

#[tokio::test]
async fn test_integration_unknown_listing() {
    let engine = create_engine(Vec::new());

    let result = engine.propose_matches(404, None).await;
    assert!(matches!(result, Err(MatchingError::UnknownListing(404))));
}

#[tokio::test]
async fn test_integration_propose_is_idempotent() {
    let engine = create_engine(electronics_pool());

    let first = engine.propose_matches(1, None).await.unwrap();
    let second = engine.propose_matches(1, None).await.unwrap();

    let ids = |ms: &[exchange_match::Match]| ms.iter().map(|m| m.id).collect::<Vec<_>>();
    let scores = |ms: &[exchange_match::Match]| ms.iter().map(|m| m.score).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(scores(&first), scores(&second));
    assert_eq!(engine.lifecycle().active_count(), 2);
}

#[tokio::test]
async fn test_integration_tie_break_by_user_compatibility_then_recency() {
    let now = Utc::now();
    let mut reliable = create_listing(2, ExchangeType::Request, "electronics", TWO_KM_NORTH);
    reliable.created_at = now - Duration::days(10);
    let mut older = create_listing(3, ExchangeType::Request, "electronics", TWO_KM_NORTH);
    older.created_at = now - Duration::days(5);
    let mut newer = create_listing(4, ExchangeType::Request, "electronics", TWO_KM_NORTH);
    newer.created_at = now - Duration::days(1);

    let engine = create_engine(vec![
        create_listing(1, ExchangeType::Give, "electronics", BERLIN),
        reliable,
        older,
        newer,
    ]);
    engine.repository().set_owner_stats(
        102,
        OwnerStats {
            completed_exchanges: 20,
            completion_rate: Some(1.0),
            rating: Some(5.0),
        },
    );
    engine
        .commit_weights(
            &Weights {
                category_match: 1.0,
                ..Weights::zero()
            },
            "test",
        )
        .unwrap();

    let matches = engine.propose_matches(1, None).await.unwrap();
    let order: Vec<u64> = matches.iter().map(|m| m.candidate_listing_id).collect();

    assert!(matches.iter().all(|m| (m.score - 1.0).abs() < 1e-9));
    assert_eq!(order, vec![2, 4, 3]);
}

#[tokio::test]
async fn test_integration_state_machine() {
    let engine = create_engine(electronics_pool());
    let matches = engine.propose_matches(1, None).await.unwrap();
    let id = matches[0].id;

    // Completing straight from proposed is not allowed
    assert!(matches!(
        engine.record_event(id, MatchEvent::Completed),
        Err(MatchingError::InvalidTransition {
            from: MatchState::Proposed,
            ..
        })
    ));

    assert_eq!(engine.record_event(id, MatchEvent::Viewed).unwrap().state, MatchState::Viewed);
    // Repeats are harmless
    assert_eq!(engine.record_event(id, MatchEvent::Viewed).unwrap().state, MatchState::Viewed);
    assert_eq!(
        engine.record_event(id, MatchEvent::Contacted).unwrap().state,
        MatchState::Contacted
    );
    assert_eq!(
        engine.record_event(id, MatchEvent::Declined).unwrap().state,
        MatchState::Declined
    );

    for event in [MatchEvent::Viewed, MatchEvent::Contacted, MatchEvent::Completed] {
        assert!(matches!(
            engine.record_event(id, event),
            Err(MatchingError::InvalidTransition {
                from: MatchState::Declined,
                ..
            })
        ));
    }

    let archived = engine.take_archived();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].transitions.len(), 3);
}

#[tokio::test]
async fn test_integration_closed_pair_is_not_proposed_again() {
    let engine = create_engine(electronics_pool());
    let first = engine.propose_matches(1, Some(1)).await.unwrap();
    let closed = first[0].id;
    engine.record_event(closed, MatchEvent::Contacted).unwrap();
    engine.record_event(closed, MatchEvent::Completed).unwrap();

    let again = engine.propose_matches(1, None).await.unwrap();
    assert!(again.iter().all(|m| m.candidate_listing_id != first[0].candidate_listing_id));
}

#[tokio::test]
async fn test_integration_stale_pair_is_expired_not_reproposed() {
    let pool = electronics_pool();
    let engine = create_engine(pool.clone());

    let long_ago = Utc::now() - Duration::days(15);
    let earlier = Matcher::with_defaults().find_matches(
        &pool[0],
        &pool,
        &engine.get_weights(),
        5,
        &Default::default(),
    );
    assert_eq!(earlier.matches.len(), 2);
    for mut m in earlier.matches {
        m.created_at = long_ago;
        m.updated_at = long_ago;
        assert!(engine.lifecycle().register(m, long_ago).is_some());
    }

    // No sweep has run; re-proposing must expire the stale pairs, not reopen them
    let matches = engine.propose_matches(1, None).await.unwrap();
    assert!(matches.is_empty());
    assert_eq!(engine.lifecycle().active_count(), 0);
    assert_eq!(engine.lifecycle().archived_count(), 2);
    assert_eq!(engine.take_archived().len(), 2);

    assert!(engine.propose_matches(1, None).await.unwrap().is_empty());
    assert_eq!(engine.lifecycle().active_count(), 0);
}

#[tokio::test]
async fn test_integration_optimizer_insufficient_data_keeps_weights() {
    let engine = create_engine(electronics_pool());
    let before = engine.get_weights();

    let result = engine.suggest_weights(Duration::days(90));

    match result {
        Err(MatchingError::InsufficientData { found, required, current }) => {
            assert_eq!(found, 0);
            assert_eq!(required, 20);
            assert_eq!(current.version, before.version);
        }
        other => panic!("expected InsufficientData, got {:?}", other),
    }
    assert_eq!(engine.get_weights(), before);
}

#[tokio::test]
async fn test_integration_commit_is_stamped_on_new_matches_only() {
    let engine = create_engine(electronics_pool());

    let first = engine.propose_matches(1, Some(1)).await.unwrap();
    let archived_id = first[0].id;
    assert_eq!(first[0].weights.version, 0);
    engine.record_event(archived_id, MatchEvent::Contacted).unwrap();
    engine.record_event(archived_id, MatchEvent::Completed).unwrap();

    let committed = engine
        .commit_weights(&category_location_weights(), "ops")
        .unwrap();
    assert_eq!(committed.version, 1);
    assert!((committed.weights.sum() - 1.0).abs() < 1e-9);

    let next = engine.propose_matches(1, None).await.unwrap();
    assert!(!next.is_empty());
    assert!(next.iter().all(|m| m.weights.version == 1));

    let archived = engine.get_match(archived_id).unwrap();
    assert_eq!(archived.state, MatchState::Completed);
    assert_eq!(archived.weights.version, 0);
}

#[tokio::test]
async fn test_integration_bulk_regeneration_isolates_failures() {
    let engine = create_engine(electronics_pool());
    engine.repository().mark_unavailable(3);
    let cancel = AtomicBool::new(false);

    let report = engine.regenerate_matches(&[1, 404, 3, 2], &cancel).await;

    assert_eq!(report.processed, 4);
    assert!(!report.interrupted);
    let failed: Vec<u64> = report.failures.iter().map(|f| f.listing_id).collect();
    assert_eq!(failed, vec![404, 3]);
    assert_eq!(report.proposed.len(), 2);
}

#[tokio::test]
async fn test_integration_bulk_regeneration_cancelled() {
    let engine = create_engine(electronics_pool());
    let cancel = AtomicBool::new(true);

    let report = engine.regenerate_matches(&[1, 2, 3], &cancel).await;

    assert_eq!(report.processed, 0);
    assert!(report.interrupted);
    assert_eq!(engine.lifecycle().active_count(), 0);
}

#[::core::prelude::v1::test]
fn test_integration_ttl_expiry_feeds_the_optimizer() {
    let lifecycle = LifecycleManager::new(&LifecycleConfig {
        ttl_days: 14,
        sweep_interval_secs: 60,
    });
    let matcher = Matcher::with_defaults();
    let store = WeightStore::new(Weights::default()).unwrap();
    let pool = electronics_pool();

    let result = matcher.find_matches(
        &pool[0],
        &pool,
        &store.get_current(),
        5,
        &Default::default(),
    );
    let engine_time = Utc::now();
    for m in result.matches {
        assert!(lifecycle.register(m, engine_time).is_some());
    }

    assert!(lifecycle.expire_stale(engine_time + Duration::days(13)).is_empty());
    let expired = lifecycle.expire_stale(engine_time + Duration::days(14));
    assert_eq!(expired.len(), 2);
    assert!(expired.iter().all(|m| m.state == MatchState::Expired));

    let outcomes = lifecycle.outcomes_since(engine_time);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| !o.is_positive()));
}

// HTTP surface

fn auth_settings() -> AuthSettings {
    AuthSettings {
        jwt_secret: "integration-secret".to_string(),
        admin_role: "administrator".to_string(),
    }
}

fn admin_token(role: &str) -> String {
    let claims = exchange_match::routes::auth::Claims {
        sub: "1".to_string(),
        name: Some("site-admin".to_string()),
        role: Some(role.to_string()),
        exp: (Utc::now().timestamp() + 600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"integration-secret"),
    )
    .unwrap()
}

fn app_state() -> AppState<InMemoryListingRepository> {
    AppState::new(Arc::new(create_engine(electronics_pool())), None, auth_settings())
}

#[actix_web::test]
async fn test_http_propose_then_record_event() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(routes::configure_routes::<InMemoryListingRepository>),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/listings/1/matches")
        .set_json(serde_json::json!({ "top_k": 1 }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["listing_id"], 1);
    let match_id = body["match_ids"][0].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/matches/{}/events", match_id))
        .set_json(serde_json::json!({ "event": "viewed" }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["state"], "viewed");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/matches/{}/events", match_id))
        .set_json(serde_json::json!({ "event": "completed" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
async fn test_http_unknown_match_is_404() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(routes::configure_routes::<InMemoryListingRepository>),
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/matches/{}", uuid::Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_http_admin_routes_require_administrator() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(routes::configure_routes::<InMemoryListingRepository>),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/admin/weights").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/weights")
        .insert_header(("Authorization", format!("Bearer {}", admin_token("editor"))))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/weights")
        .insert_header(("Authorization", format!("Bearer {}", admin_token("administrator"))))
        .set_json(serde_json::json!({ "weights": {
            "weight_category_match": 2.0,
            "weight_location_proximity": 2.0,
            "weight_environmental_impact": 0.0,
            "weight_item_condition": 0.0,
            "weight_value_range": 0.0,
            "weight_urgency": 0.0,
            "weight_user_compatibility": 0.0
        }}))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["version"], 1);
    assert_eq!(body["author"], "site-admin");
    assert_eq!(body["weights"]["category_match"], 0.5);
}

#[actix_web::test]
async fn test_http_suggest_without_outcomes_returns_current_weights() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(app_state()))
            .configure(routes::configure_routes::<InMemoryListingRepository>),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/admin/weights/suggest")
        .insert_header(("Authorization", format!("Bearer {}", admin_token("administrator"))))
        .set_json(serde_json::json!({ "lookback_days": 30 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 422);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "insufficient_data");
    assert_eq!(body["current_weights"]["version"], 0);
}

#[actix_web::test]
async fn test_http_weight_versions_and_stats() {
    let state = app_state();
    state
        .engine
        .commit_weights(&category_location_weights(), "ops")
        .unwrap();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure_routes::<InMemoryListingRepository>),
    )
    .await;
    let bearer = format!("Bearer {}", admin_token("administrator"));

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/weights/0")
        .insert_header(("Authorization", bearer.clone()))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["version"], 0);
    assert_eq!(body["author"], "system-default");

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/weights/7")
        .insert_header(("Authorization", bearer.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unknown_weight_version");

    let req = test::TestRequest::get()
        .uri("/api/v1/admin/stats")
        .insert_header(("Authorization", bearer))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["weights_version"], 1);
    assert_eq!(body["active_matches"], 0);
    assert!(body["archive"].is_null());
}
