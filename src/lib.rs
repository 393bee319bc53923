//! Learning-progress orchestration: enrollments, lesson completion, quiz
//! grading and certificate issuance over remote catalog and profile services.

pub mod certificates;
pub mod config;
pub mod db;
pub mod enrollment;
pub mod error;
pub mod gateway;
pub mod grading;
pub mod memory;
pub mod models;
pub mod progress;
pub mod routes;
pub mod store;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use routes::AppState;

/// Full HTTP surface: health check, API routes and the shared layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(routes::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(1024 * 1024))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)),
        )
}
