//! Tag bench API endpoints.
//!
//! Writes go through the same attribute path a radio peer uses, so the
//! bench sees exactly the truncation, reset and failure behavior a phone
//! would. Taps drive the simulated reader's proximity field.

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use exhibit_core::{AttributeId, TagSnapshot, WriteOutcome};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the tag router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_tag))
        .route("/url", put(set_url))
        .route("/name", put(set_name))
        .route("/tap", post(tap))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current tag state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "url": "https://museum.example/exhibits/42",
    "visit_count": 3,
    "device_name": "MuseumGuide",
    "emulating": true,
    "served_url": "https://museum.example/exhibits/42",
    "checked_at_utc": "2025-01-15T10:30:00Z"
}))]
pub struct TagStatusResponse {
    /// Stored URL. Empty until the first write.
    #[schema(example = "https://museum.example/exhibits/42")]
    pub url: String,

    /// Visits counted since the URL was last written.
    #[schema(example = 3, minimum = 0)]
    pub visit_count: u32,

    /// Name currently advertised.
    #[schema(example = "MuseumGuide")]
    pub device_name: String,

    /// Whether NFC emulation is running.
    #[schema(example = true)]
    pub emulating: bool,

    /// URL a phone reads on tap, if a message is installed.
    #[schema(nullable)]
    pub served_url: Option<String>,

    /// UTC timestamp of this reading.
    #[schema(example = "2025-01-15T10:30:00Z")]
    pub checked_at_utc: String,
}

impl TagStatusResponse {
    fn from_snapshot(snapshot: &TagSnapshot) -> Self {
        Self {
            url: String::from_utf8_lossy(&snapshot.url).into_owned(),
            visit_count: snapshot.visits,
            device_name: snapshot.device_name.clone(),
            emulating: snapshot.emulating,
            served_url: snapshot.served_url(),
            checked_at_utc: Utc::now().to_rfc3339(),
        }
    }
}

/// Request body for writing the URL attribute.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "url": "https://museum.example/exhibits/42"
}))]
pub struct SetUrlRequest {
    /// URL bytes to write, at most 256 bytes once spliced.
    #[schema(example = "https://museum.example/exhibits/42", max_length = 256)]
    pub url: String,

    /// Byte offset to splice at, as in a long attribute write.
    #[serde(default)]
    #[schema(example = 0, minimum = 0)]
    pub offset: usize,
}

/// Request body for writing the device-name attribute.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Gallery3-Vase"
}))]
pub struct SetNameRequest {
    /// New name. Anything past 64 bytes is cut.
    #[schema(example = "Gallery3-Vase")]
    pub name: String,
}

/// Result of an accepted write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "stored_len": 34,
    "truncated_from": null,
    "degraded": null
}))]
pub struct WriteResponse {
    /// Bytes now held by the attribute.
    #[schema(example = 34)]
    pub stored_len: usize,

    /// Original length when the input was cut to fit.
    #[schema(nullable)]
    pub truncated_from: Option<usize>,

    /// Failure that left the value stored but not applied.
    #[schema(nullable)]
    pub degraded: Option<String>,
}

impl From<WriteOutcome> for WriteResponse {
    fn from(outcome: WriteOutcome) -> Self {
        Self {
            stored_len: outcome.stored_len,
            truncated_from: outcome.oversized.map(|oversized| oversized.len),
            degraded: outcome.degraded.map(|err| err.to_string()),
        }
    }
}

/// Result of a simulated tap.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "read_url": "https://museum.example/exhibits/42",
    "visit_count": 4
}))]
pub struct TapResponse {
    /// URL the reader got, or null when the tag was silent.
    #[schema(nullable)]
    pub read_url: Option<String>,

    /// Visit count after the tap was processed.
    #[schema(example = 4)]
    pub visit_count: u32,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the current tag state.
#[utoipa::path(
    get,
    path = "/api/tag",
    tag = "tag",
    operation_id = "getTag",
    summary = "Get tag state",
    description = "Returns the stored URL, visit count, advertised name and \
        what the NFC emulator is currently serving.",
    responses(
        (status = 200, description = "Tag state", body = TagStatusResponse),
        (status = 503, description = "Tag is not running", body = ErrorResponse)
    )
)]
pub async fn get_tag(State(state): State<SharedState>) -> ApiResult<Json<TagStatusResponse>> {
    let snapshot = state.tag.snapshot().await?;
    Ok(Json(TagStatusResponse::from_snapshot(&snapshot)))
}

/// Write the URL attribute.
///
/// Resets the visit count and re-serves the URL over NFC.
#[utoipa::path(
    put,
    path = "/api/tag/url",
    tag = "tag",
    operation_id = "setUrl",
    summary = "Write the URL",
    description = "Stores the URL, resets the visit count to zero and swaps \
        the NFC payload. A URL too long for the tag is still stored; the \
        previous payload keeps being served.",
    request_body = SetUrlRequest,
    responses(
        (status = 200, description = "URL stored", body = WriteResponse),
        (status = 400, description = "Offset or length rejected", body = ErrorResponse),
        (status = 424, description = "Stored but not served", body = ErrorResponse)
    )
)]
pub async fn set_url(
    State(state): State<SharedState>,
    Json(request): Json<SetUrlRequest>,
) -> ApiResult<Json<WriteResponse>> {
    let outcome = state
        .tag
        .write(AttributeId::Url, request.offset, request.url.into_bytes())
        .await?;
    Ok(Json(outcome.into()))
}

/// Write the device-name attribute.
///
/// Restarts advertising under the new name.
#[utoipa::path(
    put,
    path = "/api/tag/name",
    tag = "tag",
    operation_id = "setName",
    summary = "Rename the device",
    description = "Stores the name, cutting it to 64 bytes, and restarts \
        advertising under it.",
    request_body = SetNameRequest,
    responses(
        (status = 200, description = "Name stored", body = WriteResponse),
        (status = 424, description = "Stored but not advertised", body = ErrorResponse)
    )
)]
pub async fn set_name(
    State(state): State<SharedState>,
    Json(request): Json<SetNameRequest>,
) -> ApiResult<Json<WriteResponse>> {
    let outcome = state
        .tag
        .write(AttributeId::DeviceName, 0, request.name.into_bytes())
        .await?;
    Ok(Json(outcome.into()))
}

/// Tap the simulated reader against the tag.
#[utoipa::path(
    post,
    path = "/api/tag/tap",
    tag = "tag",
    operation_id = "tap",
    summary = "Simulate a phone tap",
    description = "Brings a simulated reader into the field, reads whatever \
        the tag serves and withdraws. Taps closer together than the \
        refractory window count once.",
    responses(
        (status = 200, description = "Tap performed", body = TapResponse),
        (status = 503, description = "No simulated reader", body = ErrorResponse)
    )
)]
pub async fn tap(State(state): State<SharedState>) -> ApiResult<Json<TapResponse>> {
    let field = state.field.as_ref().ok_or_else(|| ApiError::ServiceUnavailable {
        error_code: "NO_SIMULATED_READER".to_string(),
        message: "The tag is not running on the simulated NFC driver".to_string(),
    })?;

    let read = field.tap();
    // The tap's events are queued ahead of this request.
    let snapshot = state.tag.snapshot().await?;

    Ok(Json(TapResponse {
        read_url: read.and_then(|message| exhibit_core::parse_uri_message(&message).ok()),
        visit_count: snapshot.visits,
    }))
}
