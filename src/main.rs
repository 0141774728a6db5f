use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use fairway_census::config::{CacheSettings, Settings};
use fairway_census::core::{Providers, QueryOrchestrator, ResultCache};
use fairway_census::routes::{self, search::AppState};
use fairway_census::services::{CacheBackend, CacheManager, CensusClient, GoogleMapsClient, HolcTable, MemoryCache};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Configuration error: {}", e)))?;

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.logging.level))
        .with_target(false)
        .with_level(true);

    if settings.logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting Fairway Census search service...");

    if settings.providers.google_maps_api_key.is_empty() {
        warn!("GOOGLE_MAPS_API_KEY is not set, geocoding and course search will be rejected upstream");
    }

    let http_timeout = Duration::from_secs(settings.providers.http_timeout_secs);

    let google = Arc::new(
        GoogleMapsClient::new(
            settings.providers.google_maps_base_url.clone(),
            settings.providers.google_maps_api_key.clone(),
            http_timeout,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Google Maps client: {}", e)))?,
    );

    let census = Arc::new(
        CensusClient::new(
            settings.providers.census_api_base_url.clone(),
            settings.providers.tigerweb_base_url.clone(),
            settings.providers.census_api_key.clone(),
            settings.providers.acs_year,
            http_timeout,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Census client: {}", e)))?,
    );

    info!("Upstream clients initialized (ACS {})", settings.providers.acs_year);

    let holc = match &settings.providers.holc_grades_path {
        Some(path) => match HolcTable::from_path(path) {
            Ok(table) => table,
            Err(e) => {
                warn!("Failed to load HOLC grades ({}), historical classification will match nothing", e);
                HolcTable::empty()
            }
        },
        None => {
            warn!("No HOLC grades configured, historical classification will match nothing");
            HolcTable::empty()
        }
    };

    let cache = ResultCache::new(connect_cache(&settings.cache).await);
    info!("Result cache ready ({})", cache.backend_name());

    let providers = Providers {
        geocoding: google.clone(),
        courses: google,
        census,
        holc: Arc::new(holc),
    };

    let orchestrator = QueryOrchestrator::new(providers, cache, &settings.search);

    info!(
        "Search defaults: {}mi radius, {}mi ceiling, step {}mi, {} policy, timeout {:?}",
        settings.search.default_radius_miles,
        settings.search.max_radius_miles,
        settings.search.radius_step_miles,
        settings.search.default_policy,
        orchestrator.timeout()
    );

    // Build application state
    let app_state = AppState {
        orchestrator: Arc::new(orchestrator),
        defaults: settings.search.clone(),
    };

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
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await
}

/// Redis-backed cache when configured and reachable, process-local otherwise
async fn connect_cache(settings: &CacheSettings) -> Arc<dyn CacheBackend> {
    let ttl = Duration::from_secs(settings.ttl_secs);

    let Some(redis_url) = &settings.redis_url else {
        return Arc::new(MemoryCache::new(settings.l1_cache_size, Some(ttl)));
    };

    match CacheManager::new(redis_url, settings.l1_cache_size, settings.ttl_secs).await {
        Ok(manager) => {
            info!(
                "Cache manager initialized (L1: {} entries, TTL: {}s)",
                settings.l1_cache_size, settings.ttl_secs
            );
            Arc::new(manager)
        }
        Err(e) => {
            error!("Failed to connect to Redis ({}), falling back to in-process cache", e);
            Arc::new(MemoryCache::new(settings.l1_cache_size, Some(ttl)))
        }
    }
}
