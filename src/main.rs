//! Visit analytics - request tracking for a personal portfolio site
//!
//! Counts every page request that is not a static asset and serves the
//! aggregates to authorized callers:
//! - Per-path, hourly and daily hit counts
//! - Browser / OS breakdown from the user agent
//! - Country breakdown via GeoIP

mod classify;
mod config;
mod geoip;
mod query;
mod store;
mod tracking;
mod web;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging based on LOG_FORMAT env var
    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    info!("Starting visit analytics...");

    // Open the stats store (starts its writer task)
    let store = store::StatsStore::open(&config.store.path).await;
    info!("Stats store ready at {}", store.path().display());

    // Initialize GeoIP
    let geoip = geoip::GeoIp::new(&config.geoip.database);
    if geoip.is_available() {
        info!("GeoIP enabled");
    } else {
        info!("GeoIP disabled (database not found), countries will be reported as Unknown");
    }

    let tracker = Arc::new(tracking::Tracker::new(
        store.clone(),
        Arc::new(geoip),
        config.geoip_timeout(),
    ));

    if config.auth.token.is_empty() {
        warn!("No auth token configured, statistics endpoints will reject every request");
    }

    let state = Arc::new(web::AppState {
        store: store.clone(),
        tracker,
        verifier: Arc::new(web::StaticToken::new(config.auth.token.clone())),
    });

    // Start background tasks for session retention
    web::start_background_tasks(store, config.session_retention());

    // Start web server (blocking)
    web::start_server(&config, state).await?;

    Ok(())
}
