//! PhoneTank
//!
//! Bootstraps the number pool against PostgreSQL: loads configuration,
//! connects, applies migrations and reports the state of every tank.

use anyhow::Context;
use std::env;
use std::sync::Arc;
use tank_core::models::Tank;
use tank_core::{AppConfig, Query};
use tank_db::{create_pool_from_config, run_migrations, PgStore};
use tank_services::Repository;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "phone_tank={},tank_db={},tank_services={},sqlx=warn",
            log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

/// Log one line per tank with its pool usage
async fn log_pool_summary(store: Arc<PgStore>) -> anyhow::Result<()> {
    let tanks = Repository::<_, Tank>::new(store)
        .list(Query::new(), true)
        .await
        .context("Failed to list tanks")?;

    if tanks.is_empty() {
        warn!("No tanks configured");
    }

    for tank in &tanks {
        let capacity = if tank.is_bounded() {
            tank.max_tank_size.to_string()
        } else {
            "unbounded".to_string()
        };
        info!(
            tank = %tank.name,
            enabled = tank.enabled,
            numbers = tank.phone_numbers.len(),
            capacity = %capacity,
            subscriber = tank.subscriber.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
            "Tank loaded"
        );
    }

    info!("{} tanks loaded", tanks.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting PhoneTank v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool_from_config(&config.database)
        .await
        .context("Failed to create database pool")?;

    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to apply migrations")?;
    }

    info!(
        "Lease defaults: ttl {}s, {} attempts per assignment",
        config.pool.default_ttl_secs, config.pool.max_lease_attempts
    );

    let store = Arc::new(PgStore::new(pool));
    log_pool_summary(store).await?;

    Ok(())
}
