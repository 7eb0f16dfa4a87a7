//! Remotely accessible attributes of the exhibit service.
//!
//! | Attribute    | UUID     | Access     | Wire format                  |
//! |--------------|----------|------------|------------------------------|
//! | URL          | `0x0001` | read/write | raw URL bytes, no length     |
//! | Visit count  | `0x0002` | read       | `u32`, 4 bytes, big-endian   |
//! | Device name  | `0x0003` | write      | raw name bytes, ≤ 64 kept    |
//!
//! The handlers themselves live on [`ExhibitTag`](crate::tag::ExhibitTag);
//! this module holds the identifiers, the access matrix and the read
//! window logic they share.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::error::{OversizedInput, TagError};

/// Primary service UUID of the exhibit tag.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x5253_ff4b_e47c_4ec8_9792_69fd_f492_fff6);

/// Expands a 16-bit UUID onto the Bluetooth base UUID.
#[must_use]
pub const fn uuid16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_0080_5f9b_34fb)
}

/// One of the three exhibit attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    /// The exhibit URL served over NFC.
    Url,
    /// Visits counted since the URL was last written.
    VisitCount,
    /// The advertised device name.
    DeviceName,
}

/// Read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Attribute read.
    Read,
    /// Attribute write.
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

impl AttributeId {
    /// All attributes in table order.
    pub const ALL: [Self; 3] = [Self::Url, Self::VisitCount, Self::DeviceName];

    /// Characteristic UUID.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Url => uuid16(0x0001),
            Self::VisitCount => uuid16(0x0002),
            Self::DeviceName => uuid16(0x0003),
        }
    }

    /// Looks an attribute up by characteristic UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.uuid() == uuid)
    }

    /// Whether the attribute can be read remotely.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        matches!(self, Self::Url | Self::VisitCount)
    }

    /// Whether the attribute can be written remotely.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Url | Self::DeviceName)
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url => f.write_str("url"),
            Self::VisitCount => f.write_str("visit-count"),
            Self::DeviceName => f.write_str("device-name"),
        }
    }
}

/// Byte range requested by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWindow {
    /// First byte to return.
    pub offset: usize,
    /// Most bytes to return.
    pub max_len: usize,
}

impl ReadWindow {
    /// The whole value.
    pub const FULL: Self = Self {
        offset: 0,
        max_len: usize::MAX,
    };

    /// A window of at most `max_len` bytes starting at `offset`.
    #[must_use]
    pub const fn new(offset: usize, max_len: usize) -> Self {
        Self { offset, max_len }
    }

    /// Everything from `offset` to the end.
    #[must_use]
    pub const fn from_offset(offset: usize) -> Self {
        Self {
            offset,
            max_len: usize::MAX,
        }
    }

    /// Slices `value` to this window.
    ///
    /// An offset equal to the value length yields an empty slice.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::InvalidOffset`] when the offset lies past
    /// the end of the value.
    pub fn slice<'a>(&self, value: &'a [u8]) -> Result<&'a [u8], AttributeError> {
        let rest = value
            .get(self.offset..)
            .ok_or(AttributeError::InvalidOffset {
                offset: self.offset,
                len: value.len(),
            })?;
        Ok(&rest[..rest.len().min(self.max_len)])
    }
}

impl Default for ReadWindow {
    fn default() -> Self {
        Self::FULL
    }
}

/// Rejection of an attribute request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttributeError {
    /// The access matrix forbids this operation.
    #[error("The {attribute} attribute does not allow {operation}")]
    NotPermitted {
        /// Attribute addressed.
        attribute: AttributeId,
        /// Operation attempted.
        operation: Operation,
    },

    /// The offset lies past the end of the value.
    #[error("Offset {offset} is past the end of a {len}-byte value")]
    InvalidOffset {
        /// Requested offset.
        offset: usize,
        /// Value length.
        len: usize,
    },

    /// The written value does not fit the attribute.
    #[error("Value of {len} bytes exceeds the {capacity}-byte attribute")]
    InvalidLength {
        /// Resulting value length.
        len: usize,
        /// Attribute capacity.
        capacity: usize,
    },

    /// The value was stored but a downstream step failed.
    ///
    /// Only returned when write failures are configured to surface.
    #[error("Write stored but not applied: {0}")]
    WriteFailed(#[source] TagError),

    /// The tag is no longer processing requests.
    #[error("Exhibit tag is not running")]
    Unavailable,
}

impl AttributeError {
    /// ATT protocol error code for this rejection.
    #[must_use]
    pub const fn att_code(&self) -> u8 {
        match self {
            Self::NotPermitted {
                operation: Operation::Read,
                ..
            } => 0x02,
            Self::NotPermitted {
                operation: Operation::Write,
                ..
            } => 0x03,
            Self::InvalidOffset { .. } => 0x07,
            Self::InvalidLength { .. } => 0x0D,
            Self::WriteFailed(_) | Self::Unavailable => 0x0E,
        }
    }
}

/// Result of an accepted write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes now held by the attribute.
    pub stored_len: usize,
    /// Set when input exceeded the attribute and was cut.
    pub oversized: Option<OversizedInput>,
    /// Set when the value was stored but applying it failed.
    pub degraded: Option<TagError>,
}

impl WriteOutcome {
    /// Whether the write took full effect.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.oversized.is_none() && self.degraded.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristic_uuids() {
        assert_eq!(
            AttributeId::Url.uuid().to_string(),
            "00000001-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            AttributeId::DeviceName.uuid().to_string(),
            "00000003-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            SERVICE_UUID.to_string(),
            "5253ff4b-e47c-4ec8-9792-69fdf492fff6"
        );
    }

    #[test]
    fn test_from_uuid_round_trips_table() {
        for id in AttributeId::ALL {
            assert_eq!(AttributeId::from_uuid(id.uuid()), Some(id));
        }
        assert_eq!(AttributeId::from_uuid(SERVICE_UUID), None);
    }

    #[test]
    fn test_access_matrix() {
        assert!(AttributeId::Url.is_readable() && AttributeId::Url.is_writable());
        assert!(AttributeId::VisitCount.is_readable());
        assert!(!AttributeId::VisitCount.is_writable());
        assert!(!AttributeId::DeviceName.is_readable());
        assert!(AttributeId::DeviceName.is_writable());
    }

    #[test]
    fn test_window_slicing() {
        let value = b"http://example.com";
        assert_eq!(ReadWindow::FULL.slice(value).unwrap(), value);
        assert_eq!(ReadWindow::new(7, 7).slice(value).unwrap(), b"example");
        assert_eq!(ReadWindow::from_offset(14).slice(value).unwrap(), b".com");
        assert_eq!(ReadWindow::from_offset(18).slice(value).unwrap(), b"");
        assert_eq!(
            ReadWindow::from_offset(19).slice(value),
            Err(AttributeError::InvalidOffset { offset: 19, len: 18 })
        );
    }

    #[test]
    fn test_att_codes() {
        let read = AttributeError::NotPermitted {
            attribute: AttributeId::DeviceName,
            operation: Operation::Read,
        };
        let write = AttributeError::NotPermitted {
            attribute: AttributeId::VisitCount,
            operation: Operation::Write,
        };
        assert_eq!(read.att_code(), 0x02);
        assert_eq!(write.att_code(), 0x03);
        assert_eq!(
            AttributeError::InvalidOffset { offset: 1, len: 0 }.att_code(),
            0x07
        );
        assert_eq!(AttributeError::Unavailable.att_code(), 0x0E);
    }
}
