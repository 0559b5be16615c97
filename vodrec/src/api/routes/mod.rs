//! API route modules.

pub mod health;
pub mod videos;

use axum::{Router, routing::get};
use tower_http::services::{ServeDir, ServeFile};

use crate::api::server::AppState;

/// Create the router: landing page, video resolution and health.
pub fn create_router(state: AppState) -> Router {
    let index = ServeFile::new(state.public_dir.join("index.html"));
    let assets = ServeDir::new(&state.public_dir);

    Router::new()
        .route_service("/", index)
        .nest("/videos", videos::router())
        .route("/health", get(health::health_check))
        .fallback_service(assets)
        .with_state(state)
}
