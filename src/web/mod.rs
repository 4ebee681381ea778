//! Web server module

mod auth;
mod error;
mod middleware;
mod routes;

pub use auth::StaticToken;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::config::Config;
use crate::store::StatsStore;
use crate::tracking::Tracker;
use auth::SharedTokenVerifier;
use middleware::TrackingLayer;

pub struct AppState {
    pub store: StatsStore,
    pub tracker: Arc<Tracker>,
    pub verifier: SharedTokenVerifier,
}

fn cors_layer(production: bool) -> CorsLayer {
    if production {
        return CorsLayer::new();
    }
    CorsLayer::new()
        // Front-end dev server
        .allow_origin([
            HeaderValue::from_static("http://localhost:5173"),
            HeaderValue::from_static("http://127.0.0.1:5173"),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/api/visits", get(routes::api_visits))
        .route("/api/visits/basic", get(routes::api_basic))
        .route("/api/visits/pages", get(routes::api_pages))
        .route("/api/visits/time", get(routes::api_time))
        .route("/api/visits/tech", get(routes::api_tech))
        .route("/api/visits/geo", get(routes::api_geo))
        .route("/api/visits/generate-test-data", post(routes::api_generate_test_data))
        // Built front end for everything else
        .fallback_service(ServeDir::new(&config.server.static_dir))
        .layer(TrackingLayer::new(state.tracker.clone(), config.server.trust_proxy_headers))
        // Outermost, so preflights are answered before tracking sees them
        .layer(cors_layer(config.server.production))
        .with_state(state)
}

/// Start the hourly session retention sweep, if a retention window is set
pub fn start_background_tasks(store: StatsStore, retention: Option<chrono::Duration>) {
    let Some(retention) = retention else {
        info!("Session retention disabled, sessions are kept indefinitely");
        return;
    };

    info!("Session retention: {} days", retention.num_days());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            if let Err(e) = store.prune_idle_sessions(retention).await {
                tracing::warn!("Session retention sweep failed: {}", e);
            }
        }
    });
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let app = build_router(state, config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>()
    ).await?;

    Ok(())
}
