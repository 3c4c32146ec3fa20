use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use exchange_match::config::Settings;
use exchange_match::core::{ExchangeEngine, LifecycleManager, Matcher, WeightOptimizer, WeightStore};
use exchange_match::routes::{self, AppState};
use exchange_match::services::{
    CacheManager, CachedListingRepository, PostgresClient, WordPressListingClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type Repository = CachedListingRepository<WordPressListingClient>;

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    init_logging(&settings.logging.level, &settings.logging.format);

    info!("Starting exchange matching service...");

    // Initialize PostgreSQL client
    let postgres = Arc::new(
        PostgresClient::from_settings(
            &settings.database.url,
            settings.database.max_connections,
            settings.database.min_connections,
            settings.database.acquire_timeout_secs,
            settings.database.idle_timeout_secs,
        )
        .await
        .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?,
    );

    info!("PostgreSQL client initialized");

    // Restore weight history
    let history = postgres
        .load_weight_history()
        .await
        .map_err(|e| startup_error("Failed to load weight history", e))?;
    let weights = WeightStore::from_history(settings.default_weights(), history)
        .map_err(|e| startup_error("Invalid default weights", e))?;

    info!("Weight store initialized at version {}", weights.current_version());

    // Closed pairs stay excluded for good, whatever their age
    let lifecycle = LifecycleManager::new(&settings.lifecycle);
    let closed_pairs = postgres
        .load_closed_pairs()
        .await
        .map_err(|e| startup_error("Failed to load closed pairs", e))?;
    info!("Restored {} closed pairs", lifecycle.restore_closed_pairs(closed_pairs));

    // Outcome samples only matter inside the optimizer window
    let since =
        chrono::Utc::now() - chrono::Duration::days(settings.optimizer.default_lookback_days);
    match postgres.load_archived_matches(since).await {
        Ok(archived) => info!("Restored {} archived matches", lifecycle.restore_archived(archived)),
        Err(e) => warn!("Starting without archived outcomes: {}", e),
    }

    // Initialize cache manager (Redis tier is optional)
    let cache_ttl = settings.cache.ttl_secs.unwrap_or(300);
    let l1_cache_size = settings.cache.l1_cache_size.unwrap_or(1000);

    let cache = match &settings.cache.redis_url {
        Some(url) => match CacheManager::new(url, l1_cache_size, cache_ttl).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to connect to Redis ({}), using in-process cache only", e);
                CacheManager::in_memory(l1_cache_size, cache_ttl)
            }
        },
        None => CacheManager::in_memory(l1_cache_size, cache_ttl),
    };

    info!(
        "Cache manager initialized (L1: {} entries, TTL: {}s, shared: {})",
        l1_cache_size,
        cache_ttl,
        cache.has_shared_tier()
    );

    // Initialize WordPress listing client
    let wordpress = WordPressListingClient::new(
        settings.listings.base_url.clone(),
        settings.listings.username.clone(),
        settings.listings.application_password.clone(),
        settings.listings.page_size,
        settings.listings.timeout_secs,
    )
    .map_err(|e| startup_error("Failed to build WordPress client", e))?;

    let repository: Repository = CachedListingRepository::new(wordpress, Arc::new(cache));

    let engine = Arc::new(ExchangeEngine::new(
        repository,
        Matcher::new(settings.features.clone(), settings.matching.clone()),
        weights,
        lifecycle,
        WeightOptimizer::new(settings.optimizer.clone()),
    ));

    let app_state = AppState::new(engine, Some(postgres), settings.auth.clone());

    // Background expiry sweep
    let sweep_state = app_state.clone();
    let sweep_every = Duration::from_secs(settings.lifecycle.sweep_interval_secs.max(1));
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            sweep_state.engine.expire_stale();
            sweep_state.persist_archived().await;
        }
    });

    info!("Expiry sweep scheduled every {}s", sweep_every.as_secs());

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(routes::handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(routes::handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes::<Repository>)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}
