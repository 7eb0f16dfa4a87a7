//! Error types for the exhibit tag.
//!
//! Each component has its own error enum ([`EncodeError`], [`SwapError`],
//! [`AdvertisingError`], [`AttributeError`], [`NfcError`]).
//! [`TagError`] groups the failures that can follow an accepted attribute
//! write, and [`ExhibitError`] is the unified type for callers that do not
//! care which component failed.
//!
//! # Propagation
//!
//! Nothing here is fatal. Failures after an attribute write are logged
//! where they happen and leave the tag running in a degraded state; they
//! only reach the remote writer when `attributes.surface_write_failures`
//! is enabled.

use thiserror::Error;

use crate::advertising::AdvertisingError;
use crate::attributes::AttributeError;
use crate::emulator::SwapError;
use crate::ndef::EncodeError;
use crate::nfc::NfcError;

/// Input longer than its destination; cut rather than rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Input of {len} bytes exceeds the {max}-byte limit")]
pub struct OversizedInput {
    /// Bytes received.
    pub len: usize,
    /// Bytes kept.
    pub max: usize,
}

/// Failure while applying a stored attribute value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The URL could not be transcoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The transcoded payload could not be swapped in.
    #[error(transparent)]
    Swap(#[from] SwapError),

    /// The new name could not be advertised.
    #[error(transparent)]
    Advertising(#[from] AdvertisingError),
}

impl TagError {
    /// Whether the proximity-tap channel is left silent by this failure.
    #[inline]
    #[must_use]
    pub const fn silences_nfc(&self) -> bool {
        matches!(self, Self::Swap(SwapError::StartFailed(_)))
    }
}

/// The unified error type for exhibit tag operations.
#[derive(Debug, Error)]
pub enum ExhibitError {
    // =========================================================================
    // ATTRIBUTE ERRORS
    // =========================================================================
    /// An attribute request was rejected.
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    /// Applying a written value failed.
    #[error(transparent)]
    Tag(#[from] TagError),

    // =========================================================================
    // HARDWARE ERRORS
    // =========================================================================
    /// The NFC driver failed.
    #[error(transparent)]
    Nfc(#[from] NfcError),

    /// The Bluetooth stack failed.
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// A specialized [`Result`] type for exhibit tag operations.
pub type Result<T> = std::result::Result<T, ExhibitError>;

impl ExhibitError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Attribute(AttributeError::NotPermitted { .. }) => "NOT_PERMITTED",
            Self::Attribute(AttributeError::InvalidOffset { .. }) => "INVALID_OFFSET",
            Self::Attribute(AttributeError::InvalidLength { .. }) => "INVALID_LENGTH",
            Self::Attribute(AttributeError::WriteFailed(_)) => "WRITE_FAILED",
            Self::Attribute(AttributeError::Unavailable) => "TAG_UNAVAILABLE",
            Self::Tag(TagError::Encode(_)) => "ENCODE_FAILED",
            Self::Tag(TagError::Swap(_)) => "SWAP_FAILED",
            Self::Tag(TagError::Advertising(_)) => "ADVERTISING_FAILED",
            Self::Nfc(_) => "NFC_ERROR",
            Self::Bluetooth(_) => "BLUETOOTH_ERROR",
        }
    }
}

#[cfg(feature = "bluetooth")]
impl From<bluer::Error> for ExhibitError {
    fn from(err: bluer::Error) -> Self {
        Self::Bluetooth(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeId, Operation};

    fn capacity_error() -> TagError {
        TagError::Encode(EncodeError::CapacityExceeded {
            required: 300,
            capacity: 256,
        })
    }

    #[test]
    fn test_error_codes_name_the_failing_component() {
        let err: ExhibitError = AttributeError::NotPermitted {
            attribute: AttributeId::VisitCount,
            operation: Operation::Write,
        }
        .into();
        assert_eq!(err.error_code(), "NOT_PERMITTED");
        assert_eq!(ExhibitError::Tag(capacity_error()).error_code(), "ENCODE_FAILED");
        assert_eq!(ExhibitError::Nfc(NfcError::Busy).error_code(), "NFC_ERROR");
        assert_eq!(ExhibitError::Bluetooth("down".into()).error_code(), "BLUETOOTH_ERROR");
    }

    #[test]
    fn test_silences_nfc() {
        assert!(TagError::Swap(SwapError::StartFailed(NfcError::Busy)).silences_nfc());
        assert!(!TagError::Swap(SwapError::StopFailed(NfcError::Busy)).silences_nfc());
        assert!(!capacity_error().silences_nfc());
    }

    #[test]
    fn test_error_display_messages() {
        let err = ExhibitError::Tag(capacity_error());
        assert!(err.to_string().contains("300 bytes"));

        let err = OversizedInput { len: 65, max: 64 };
        assert_eq!(err.to_string(), "Input of 65 bytes exceeds the 64-byte limit");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ExhibitError>();
        assert_sync::<ExhibitError>();
    }
}
