//! Statistics endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use super::auth::Authorized;
use super::error::ApiError;
use super::AppState;
use crate::query::{self, BasicStats, GeoStats, PageStats, TechStats, TimeStats};
use crate::store::AggregateRecord;

/// API: the whole aggregate record
pub async fn api_visits(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<AggregateRecord>, ApiError> {
    let snapshot = state.store.snapshot()?;
    Ok(Json(AggregateRecord::clone(&snapshot)))
}

/// API: total visits, unique visitors, last update
pub async fn api_basic(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<BasicStats>, ApiError> {
    Ok(Json(query::basic(&*state.store.snapshot()?)))
}

/// API: most visited pages first
pub async fn api_pages(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<PageStats>, ApiError> {
    Ok(Json(query::pages(&*state.store.snapshot()?)))
}

/// API: hourly and daily buckets
pub async fn api_time(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TimeStats>, ApiError> {
    Ok(Json(query::time(&*state.store.snapshot()?)))
}

/// API: browser and OS breakdown
pub async fn api_tech(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TechStats>, ApiError> {
    Ok(Json(query::tech(&*state.store.snapshot()?)))
}

/// API: countries, most visits first
pub async fn api_geo(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<GeoStats>, ApiError> {
    Ok(Json(query::geo(&*state.store.snapshot()?)))
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
}

/// API: push a fixed batch of sample visits through the tracker
pub async fn api_generate_test_data(
    _: Authorized,
    State(state): State<Arc<AppState>>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let generated = state.tracker.generate_samples().await?;
    tracing::info!("Generated {} sample visits", generated);

    Ok(Json(GenerateResponse {
        success: true,
        message: format!(
            "Generated {} sample visits. The other statistics endpoints now include them.",
            generated
        ),
    }))
}
