//! `GET /health`: is the daemon up, and does the tag still answer.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Daemon liveness as seen by a bench operator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "tag_running": true
}))]
pub struct HealthResponse {
    /// `ok`, or `degraded` once the tag actor has stopped.
    #[schema(example = "ok")]
    pub status: String,

    /// exhibit-server build version.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Whether the tag actor answers requests.
    #[schema(example = true)]
    pub tag_running: bool,
}

impl HealthResponse {
    fn for_tag(tag_running: bool) -> Self {
        Self {
            status: if tag_running { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tag_running,
        }
    }
}

pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Asks the tag actor for a snapshot and reports whether it replied.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Daemon liveness",
    description = "Reports the build version and whether the exhibit tag \
        actor still answers.",
    responses(
        (status = 200, description = "Daemon liveness", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let tag_running = state.tag.snapshot().await.is_ok();
    Json(HealthResponse::for_tag(tag_running))
}
