//! Health check route.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub strategy: String,
    pub sources: Vec<&'static str>,
    pub cache_entries: usize,
    pub in_flight: usize,
}

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let stats = state.service.cache().stats();

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        strategy: state.service.strategy().to_string(),
        sources: state.service.source_names(),
        cache_entries: stats.entry_count,
        in_flight: stats.in_flight_count,
    }))
}
