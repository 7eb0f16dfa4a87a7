//! OpenAPI specification for the exhibit tag bench API.

use axum::Json;
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::tag::{SetNameRequest, SetUrlRequest, TagStatusResponse, TapResponse, WriteResponse};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json`.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for the exhibit tag daemon.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "exhibit-tag API",
        version = "0.1.0",
        description = r"
# exhibit-tag API

Local bench API for an exhibit tag. The tag advertises over Bluetooth LE,
serves its URL attribute to phones over NFC and counts their taps.

Writes here take the same path as writes from a Bluetooth peer:

- **setUrl** resets the visit count and swaps the NFC payload.
- **setName** cuts names to 64 bytes and restarts advertising.
- **tap** drives the simulated reader; taps within the refractory window count once.
",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local exhibit-tag daemon")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "tag", description = "Tag attributes and simulated taps")
    ),
    paths(
        super::health::health_check,
        super::tag::get_tag,
        super::tag::set_url,
        super::tag::set_name,
        super::tag::tap,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            TagStatusResponse,
            SetUrlRequest,
            SetNameRequest,
            WriteResponse,
            TapResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "exhibit-tag API");
        assert!(spec.paths.paths.contains_key("/api/tag/url"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"exhibit-tag API\""));
    }
}
