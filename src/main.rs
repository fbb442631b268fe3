use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::LevelFilter;

use token_market_proxy::config::Config;
use token_market_proxy::database::repositories::OfflineSnapshotStore;
use token_market_proxy::database::MongoDbService;
use token_market_proxy::routes::configure_routes;
use token_market_proxy::services::{
    Clock, MarketDataService, MemoryCache, PersistenceGate, ResponseCache, SnapshotStore,
    SystemClock, UpstreamClient, WriteRateLimiter,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value = "config/config.toml")]
    config: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 1. Parse command line arguments and setup logging
    let args = Args::parse();
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level.to_string())).init();

    // 2. Load and validate configuration
    let config = Config::load_from(&args.config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    config
        .validate()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    info!("Starting token market proxy...");
    info!(
        "Upstream: {} (api key configured: {})",
        config.upstream.base_url,
        config.upstream.api_key.is_some()
    );

    // 3. Durable storage; keep serving without it if MongoDB is down
    let store: Arc<dyn SnapshotStore> = match MongoDbService::new(&config.database).await {
        Ok(db_service) => {
            match db_service.count_snapshots().await {
                Ok(count) => info!("{} token snapshots stored", count),
                Err(e) => warn!("Failed to count stored snapshots: {}", e),
            }
            Arc::new(db_service.get_token_repo().clone())
        }
        Err(e) => {
            error!("Failed to connect to MongoDB, snapshots will not be persisted: {}", e);
            Arc::new(OfflineSnapshotStore)
        }
    };

    // 4. Pipeline: upstream client, cache, persistence gate
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let upstream = UpstreamClient::from_config(&config.upstream)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let cache_store = Arc::new(MemoryCache::new(clock.clone()));
    let cache = ResponseCache::new(cache_store.clone(), config.cache.ttl_secs);
    let gate = PersistenceGate::new(
        store,
        WriteRateLimiter::new(config.persistence.min_write_interval_ms),
        clock,
    );
    let market = web::Data::new(MarketDataService::new(
        upstream,
        cache,
        gate,
        config.market.clone(),
    ));

    // Drop expired cache entries in the background
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let purged = cache_store.purge_expired();
            if purged > 0 {
                log::debug!("Purged {} expired cache entries", purged);
            }
        }
    });

    // Build bind address from config
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Server will be available at http://{}", bind_addr);

    let config = Arc::new(config);
    HttpServer::new(move || {
        // Configure CORS from config
        let allowed_origins = config.cors.allowed_origins.clone();

        // Use allowed_origin_fn for more flexible origin matching
        let cors = Cors::default().allowed_origin_fn(move |origin, _req_head| {
            let origin_str = match origin.to_str() {
                Ok(s) => s,
                Err(_) => return false,
            };
            allowed_origins.iter().any(|allowed| origin_str == allowed)
        });

        // Convert string methods to HTTP methods
        let methods: Vec<actix_web::http::Method> = config
            .cors
            .allowed_methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();

        let cors = cors
            .allowed_methods(methods)
            .allowed_headers(config.cors.allowed_headers.clone())
            .max_age(3600);

        let cors = if config.cors.supports_credentials {
            cors.supports_credentials()
        } else {
            cors
        };

        App::new()
            .app_data(market.clone())
            .app_data(web::Data::new(config.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
