//! Rule-based classification of network and security activity records,
//! served over HTTP with single-record and background batch endpoints.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::get,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod models;
pub mod utils;

pub use api::AppState;

/// Full application router with middleware applied
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(state.config.cors_origins())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        // Cache preflight requests for 1 hour
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(api::health::health_check))
        .nest("/api", api::routes::api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
