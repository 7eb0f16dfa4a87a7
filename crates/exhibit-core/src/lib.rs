//! # exhibit-core
//!
//! Core logic for an exhibit tag: a Bluetooth LE peripheral whose URL
//! attribute is re-served to phones over NFC tag emulation, and whose NFC
//! taps are counted back into a visit-count attribute.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`store`] - Fixed-capacity URL, name and visit counter state
//! - [`debounce`] - Collapses NFC event bursts into one visit per tap
//! - [`ndef`] - NDEF URI record encoding and decoding
//! - [`nfc`] - NFC driver trait and an in-memory simulated tag
//! - [`emulator`] - Stop, install, start payload swaps
//! - [`advertising`] - Advertising trait and a mock advertiser
//! - [`attributes`] - Attribute identifiers, access matrix and read windows
//! - [`tag`] - Attribute handlers tying the above together
//! - [`actor`] - Single owner task that serializes every event source
//! - [`config`] - Layered configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - `bluetooth` - BlueZ GATT and advertising adapters (feature `bluetooth`)

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod actor;
pub mod advertising;
pub mod attributes;
#[cfg(feature = "bluetooth")]
pub mod bluetooth;
pub mod config;
pub mod debounce;
pub mod emulator;
pub mod error;
pub mod ndef;
pub mod nfc;
pub mod store;
pub mod tag;

// Re-export primary types for convenience
pub use actor::{TagActor, TagHandle, TagSnapshot};
pub use advertising::{AdvertisementData, Advertiser, AdvertisingError, MockAdvertiser};
pub use attributes::{AttributeError, AttributeId, ReadWindow, WriteOutcome, SERVICE_UUID};
pub use config::{ConfigError, ConfigResult, ExhibitConfig};
pub use debounce::{MonotonicClock, ScanDebouncer, ScanOutcome, REFRACTORY_WINDOW_MS};
pub use emulator::{SwapError, TagEmulator};
pub use error::{ExhibitError, OversizedInput, Result, TagError};
pub use ndef::{encode_uri_message, parse_uri_message, DecodeError, EncodeError};
pub use nfc::{NfcDriver, NfcError, NfcEvent, SimulatedField, SimulatedTag};
pub use store::{DeviceName, EncodedTagPayload, TagStore, UrlPayload};
pub use tag::{ExhibitTag, TagSettings};
