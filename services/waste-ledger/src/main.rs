use actix_cors::Cors;
use actix_web::{middleware, App, HttpServer};
use anyhow::{anyhow, Context};
use dotenv::dotenv;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use waste_ledger::{
    config::{Config, StorageBackend},
    handlers, metrics,
    middleware::{RateLimiter, RequestMetrics},
    seed,
    store::{LedgerStore, MemoryStore, PgStore},
    ServiceContainer,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("Starting Waste Ledger on port {}", config.server.port);

    metrics::register_metrics(prometheus::default_registry())
        .map_err(|e| anyhow!("Failed to register metrics: {}", e))?;

    let store: Arc<dyn LedgerStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PgStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            store
                .health_check()
                .await
                .context("Database not accessible")?;
            store.migrate().await.context("Failed to apply schema")?;
            Arc::new(store)
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };

    if config.storage.seed_catalog {
        seed::seed_catalog(store.as_ref())
            .await
            .context("Failed to seed catalog")?;
    }

    if let (Some(username), Some(password)) = (
        config.auth.bootstrap_admin_username.as_deref(),
        config.auth.bootstrap_admin_password.as_deref(),
    ) {
        seed::ensure_admin(store.as_ref(), username, password)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    let services = ServiceContainer::new(store, &config.auth, config.pagination.clone());
    let rate_limiter = RateLimiter::new(config.server.requests_per_minute);
    let server_config = config.server.clone();

    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    HttpServer::new(move || {
        let services = services.clone();

        App::new()
            .wrap(rate_limiter.clone())
            .wrap(RequestMetrics)
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .configure(|cfg| services.register(cfg))
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await?;

    Ok(())
}
