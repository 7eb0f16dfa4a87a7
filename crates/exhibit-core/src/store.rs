//! Shared state for a single exhibit tag.
//!
//! Every value lives in a fixed-capacity buffer sized at compile time, so no
//! remote write can grow the footprint of the tag. The store does no locking
//! of its own; it is owned by exactly one [`ExhibitTag`](crate::tag::ExhibitTag),
//! which in turn is owned by the tag actor.

use std::fmt;

use tracing::warn;

/// Largest URL the URL attribute accepts, in bytes.
pub const URL_CAPACITY: usize = 256;

/// Largest device name that is advertised, in bytes.
pub const NAME_CAPACITY: usize = 64;

/// Size of the proximity-tap message buffer, in bytes.
pub const MESSAGE_CAPACITY: usize = 256;

/// Raw URL bytes as last written through the URL attribute.
///
/// The content is not validated; the transcoder may still reject it.
#[derive(Clone, PartialEq, Eq)]
pub struct UrlPayload {
    bytes: [u8; URL_CAPACITY],
    len: usize,
}

impl UrlPayload {
    /// An empty URL, the value at boot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: [0; URL_CAPACITY],
            len: 0,
        }
    }

    /// Copies `bytes` into a new payload.
    ///
    /// Returns `None` when `bytes` is longer than [`URL_CAPACITY`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > URL_CAPACITY {
            return None;
        }
        let mut payload = Self::empty();
        payload.bytes[..bytes.len()].copy_from_slice(bytes);
        payload.len = bytes.len();
        Some(payload)
    }

    /// The stored URL bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Number of stored bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no URL has been stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for UrlPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for UrlPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UrlPayload")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// Advertised device identity.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceName {
    bytes: [u8; NAME_CAPACITY],
    len: usize,
}

impl DeviceName {
    /// Builds a name from `bytes`, keeping at most [`NAME_CAPACITY`] bytes.
    ///
    /// The second value is `true` when input was cut off.
    #[must_use]
    pub fn truncating(bytes: &[u8]) -> (Self, bool) {
        let len = bytes.len().min(NAME_CAPACITY);
        let mut name = Self {
            bytes: [0; NAME_CAPACITY],
            len,
        };
        name.bytes[..len].copy_from_slice(&bytes[..len]);
        (name, bytes.len() > NAME_CAPACITY)
    }

    /// Builds a name from a string that must already fit.
    #[must_use]
    pub fn new(name: &str) -> Option<Self> {
        match Self::truncating(name.as_bytes()) {
            (name, false) => Some(name),
            (_, true) => None,
        }
    }

    /// The raw name bytes as written.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The name as handed to the advertising subsystem.
    ///
    /// Stops at the first byte that is not valid UTF-8, which also covers a
    /// multi-byte character split by truncation.
    #[must_use]
    pub fn advertised(&self) -> &str {
        match std::str::from_utf8(self.as_bytes()) {
            Ok(name) => name,
            Err(err) => {
                let valid = &self.as_bytes()[..err.valid_up_to()];
                std::str::from_utf8(valid).unwrap_or_default()
            }
        }
    }
}

impl fmt::Debug for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceName").field(&self.advertised()).finish()
    }
}

/// Encoded proximity-tap message, ready to hand to the driver.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedTagPayload {
    pub(crate) bytes: [u8; MESSAGE_CAPACITY],
    pub(crate) len: usize,
}

impl EncodedTagPayload {
    /// A payload with no content; nothing has been served yet.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            bytes: [0; MESSAGE_CAPACITY],
            len: 0,
        }
    }

    /// The encoded message bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Encoded length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for EncodedTagPayload {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for EncodedTagPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedTagPayload({:02x?})", self.as_bytes())
    }
}

/// URL, visit counter, debounce timestamp and device name of one tag.
///
/// The encoded proximity-tap payload is not held here: it belongs to the
/// [`TagEmulator`](crate::emulator::TagEmulator), which only ever swaps it
/// as a whole.
#[derive(Debug, Clone)]
pub struct TagStore {
    url: UrlPayload,
    visits: u32,
    last_scan_ms: Option<u64>,
    device_name: DeviceName,
}

impl TagStore {
    /// Creates a store with an empty URL, zero visits and the given name.
    #[must_use]
    pub const fn new(device_name: DeviceName) -> Self {
        Self {
            url: UrlPayload::empty(),
            visits: 0,
            last_scan_ms: None,
            device_name,
        }
    }

    /// Current URL.
    #[must_use]
    pub const fn url(&self) -> &UrlPayload {
        &self.url
    }

    /// Replaces the URL.
    pub fn set_url(&mut self, url: UrlPayload) {
        self.url = url;
    }

    /// Visits counted since the last URL change.
    #[must_use]
    pub const fn visits(&self) -> u32 {
        self.visits
    }

    /// Adds one visit and returns the new total.
    ///
    /// Saturates at `u32::MAX`.
    pub fn record_visit(&mut self) -> u32 {
        match self.visits.checked_add(1) {
            Some(next) => self.visits = next,
            None => warn!(visits = self.visits, "Visit counter saturated"),
        }
        self.visits
    }

    /// Clears the visit counter.
    pub fn reset_visits(&mut self) {
        self.visits = 0;
    }

    /// Timestamp of the last counted scan, if any.
    #[must_use]
    pub const fn last_scan_ms(&self) -> Option<u64> {
        self.last_scan_ms
    }

    /// Records the timestamp of a counted scan.
    pub fn set_last_scan_ms(&mut self, at_ms: u64) {
        self.last_scan_ms = Some(at_ms);
    }

    /// Current device name.
    #[must_use]
    pub const fn device_name(&self) -> &DeviceName {
        &self.device_name
    }

    /// Replaces the device name.
    pub fn set_device_name(&mut self, name: DeviceName) {
        self.device_name = name;
    }
}
