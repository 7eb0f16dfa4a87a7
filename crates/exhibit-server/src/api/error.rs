//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use exhibit_core::{AttributeError, ExhibitError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - The tag refused the request.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// ATT error code a radio peer would have received.
        att_code: Option<u8>,
    },

    /// 424 Failed Dependency - The value was stored but applying it failed.
    FailedDependency {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - The tag actor or simulated reader is gone.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "INVALID_LENGTH",
    "message": "Value of 300 bytes exceeds the 256-byte attribute",
    "details": { "att_code": 13 }
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "INVALID_OFFSET").
    #[schema(example = "INVALID_OFFSET")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Offset 40 is past the end of a 12-byte value")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest {
                error_code,
                message,
                att_code,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: att_code.map(|code| serde_json::json!({ "att_code": code })),
                },
            ),

            Self::FailedDependency {
                error_code,
                message,
                details,
            } => {
                tracing::warn!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Write stored but not applied"
                );

                (
                    StatusCode::FAILED_DEPENDENCY,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::ServiceUnavailable {
                error_code,
                message,
            } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::FailedDependency { message, .. } => {
                write!(f, "Failed Dependency: {message}")
            }
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from attribute rejections.
impl From<AttributeError> for ApiError {
    fn from(err: AttributeError) -> Self {
        let message = err.to_string();
        let att_code = err.att_code();

        match err {
            AttributeError::NotPermitted { .. }
            | AttributeError::InvalidOffset { .. }
            | AttributeError::InvalidLength { .. } => Self::BadRequest {
                error_code: ExhibitError::from(err).error_code().to_string(),
                message,
                att_code: Some(att_code),
            },
            AttributeError::WriteFailed(source) => Self::FailedDependency {
                error_code: ExhibitError::from(source.clone()).error_code().to_string(),
                message,
                details: Some(source.to_string()),
            },
            AttributeError::Unavailable => Self::ServiceUnavailable {
                error_code: ExhibitError::from(err).error_code().to_string(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use exhibit_core::attributes::Operation;
    use exhibit_core::{AttributeId, EncodeError, TagError};

    use super::*;

    #[test]
    fn test_invalid_length_is_bad_request() {
        let err = ApiError::from(AttributeError::InvalidLength {
            len: 300,
            capacity: 256,
        });
        match err {
            ApiError::BadRequest {
                error_code,
                att_code,
                ..
            } => {
                assert_eq!(error_code, "INVALID_LENGTH");
                assert_eq!(att_code, Some(0x0D));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_not_permitted_carries_att_code() {
        let err = ApiError::from(AttributeError::NotPermitted {
            attribute: AttributeId::VisitCount,
            operation: Operation::Write,
        });
        assert!(err.to_string().contains("Bad Request"));
        assert!(matches!(
            err,
            ApiError::BadRequest {
                att_code: Some(0x03),
                ..
            }
        ));
    }

    #[test]
    fn test_write_failed_names_the_cause() {
        let cause = TagError::Encode(EncodeError::CapacityExceeded {
            required: 300,
            capacity: 256,
        });
        let err = ApiError::from(AttributeError::WriteFailed(cause));
        match err {
            ApiError::FailedDependency { error_code, .. } => {
                assert_eq!(error_code, "ENCODE_FAILED");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unavailable_is_service_unavailable() {
        let response = ApiError::from(AttributeError::Unavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "INVALID_OFFSET".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_OFFSET"));
    }
}
