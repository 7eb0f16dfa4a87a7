//! HTTP API routes and handlers.
//!
//! - `health` - Service health checks
//! - `tag` - Tag state, attribute writes and simulated taps
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod openapi;
pub mod tag;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                - Health check
/// /api
/// ├── /tag               - Tag state
/// │   ├── /url           - Write the URL attribute
/// │   ├── /name          - Write the device-name attribute
/// │   └── /tap           - Simulated reader tap
/// └── /openapi.json      - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/tag", tag::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
