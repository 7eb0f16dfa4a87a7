//! Proximity-tap driver boundary.
//!
//! [`NfcDriver`] mirrors the operations a Type 2 tag emulation library
//! exposes: register a callback, install a message, start and stop
//! emulation. [`SimulatedTag`] implements it in memory for host builds and
//! tests, with a [`SimulatedField`] standing in for a phone held to the tag.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, trace};

use crate::store::MESSAGE_CAPACITY;

/// Event raised by the tag hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NfcEvent {
    /// A reader's field was detected.
    FieldOn,
    /// The reader finished reading the message.
    DataRead,
    /// The reader's field went away.
    FieldOff,
    /// Emulation was stopped locally. Not a reader, so never counted.
    Stopped,
}

impl NfcEvent {
    /// Whether the event means a reader was in range.
    #[must_use]
    pub const fn is_scan(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Callback the driver invokes for every [`NfcEvent`].
///
/// Runs in the driver's event context and must not block.
pub type NfcCallback = Box<dyn Fn(NfcEvent) + Send + Sync>;

/// Driver-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NfcError {
    /// An operation was attempted before [`NfcDriver::setup`].
    #[error("NFC driver has not been set up")]
    NotSetUp,

    /// The message cannot change while emulation is running.
    #[error("NFC emulation is running")]
    Busy,

    /// The message is larger than the tag memory.
    #[error("NFC payload of {len} bytes exceeds tag capacity of {capacity}")]
    PayloadTooLarge {
        /// Bytes offered.
        len: usize,
        /// Bytes available.
        capacity: usize,
    },

    /// Any other driver failure.
    #[error("NFC driver error: {0}")]
    Driver(String),
}

/// Tag emulation hardware.
pub trait NfcDriver: Send {
    /// Registers the event callback. Called once before anything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the hardware cannot be initialised.
    fn setup(&mut self, callback: NfcCallback) -> Result<(), NfcError>;

    /// Starts serving the installed message.
    ///
    /// # Errors
    ///
    /// Returns an error if emulation cannot start.
    fn emulation_start(&mut self) -> Result<(), NfcError>;

    /// Stops serving.
    ///
    /// # Errors
    ///
    /// Returns an error if emulation cannot stop.
    fn emulation_stop(&mut self) -> Result<(), NfcError>;

    /// Installs a new message. Only valid while emulation is stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is rejected.
    fn payload_set(&mut self, payload: &[u8]) -> Result<(), NfcError>;
}

/// Driver step a [`SimulatedField`] can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// [`NfcDriver::emulation_stop`].
    Stop,
    /// [`NfcDriver::payload_set`].
    PayloadSet,
    /// [`NfcDriver::emulation_start`].
    Start,
}

#[derive(Default)]
struct SimulatedState {
    callback: Option<Arc<dyn Fn(NfcEvent) + Send + Sync>>,
    payload: Vec<u8>,
    emulating: bool,
    fault: Option<FaultPoint>,
}

impl SimulatedState {
    fn fail_if(&mut self, point: FaultPoint) -> Result<(), NfcError> {
        if self.fault == Some(point) {
            self.fault = None;
            return Err(NfcError::Driver(format!("injected {point:?} fault")));
        }
        Ok(())
    }
}

fn lock(state: &Mutex<SimulatedState>) -> MutexGuard<'_, SimulatedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory Type 2 tag.
#[derive(Default)]
pub struct SimulatedTag {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedTag {
    /// Creates a stopped tag with no message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for tapping the tag from outside.
    #[must_use]
    pub fn field(&self) -> SimulatedField {
        SimulatedField {
            state: Arc::clone(&self.state),
        }
    }
}

impl NfcDriver for SimulatedTag {
    fn setup(&mut self, callback: NfcCallback) -> Result<(), NfcError> {
        lock(&self.state).callback = Some(Arc::from(callback));
        debug!("Simulated NFC tag ready");
        Ok(())
    }

    fn emulation_start(&mut self) -> Result<(), NfcError> {
        let mut state = lock(&self.state);
        if state.callback.is_none() {
            return Err(NfcError::NotSetUp);
        }
        state.fail_if(FaultPoint::Start)?;
        state.emulating = true;
        Ok(())
    }

    fn emulation_stop(&mut self) -> Result<(), NfcError> {
        let callback = {
            let mut state = lock(&self.state);
            state.fail_if(FaultPoint::Stop)?;
            let was_emulating = std::mem::replace(&mut state.emulating, false);
            state.callback.clone().filter(|_| was_emulating)
        };

        if let Some(callback) = callback {
            callback(NfcEvent::Stopped);
        }
        Ok(())
    }

    fn payload_set(&mut self, payload: &[u8]) -> Result<(), NfcError> {
        let mut state = lock(&self.state);
        if state.emulating {
            return Err(NfcError::Busy);
        }
        if payload.len() > MESSAGE_CAPACITY {
            return Err(NfcError::PayloadTooLarge {
                len: payload.len(),
                capacity: MESSAGE_CAPACITY,
            });
        }
        state.fail_if(FaultPoint::PayloadSet)?;
        state.payload = payload.to_vec();
        Ok(())
    }
}

/// A reader's RF field near a [`SimulatedTag`].
#[derive(Clone)]
pub struct SimulatedField {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedField {
    /// Brings a reader into range.
    ///
    /// Returns the served message, or `None` when emulation is stopped (a
    /// stopped tag is silent and raises no events).
    #[must_use]
    pub fn tap(&self) -> Option<Vec<u8>> {
        let (payload, callback) = {
            let state = lock(&self.state);
            if !state.emulating {
                trace!("Tap on silent tag");
                return None;
            }
            (state.payload.clone(), state.callback.clone())
        };

        if let Some(callback) = callback {
            callback(NfcEvent::FieldOn);
            callback(NfcEvent::DataRead);
            callback(NfcEvent::FieldOff);
        }
        Some(payload)
    }

    /// Whether the tag is currently emulating.
    #[must_use]
    pub fn is_emulating(&self) -> bool {
        lock(&self.state).emulating
    }

    /// Makes the next call to the given driver step fail once.
    pub fn inject_fault(&self, point: FaultPoint) {
        lock(&self.state).fault = Some(point);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_tag() -> (SimulatedTag, Arc<AtomicUsize>) {
        let events = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&events);
        let mut tag = SimulatedTag::new();
        tag.setup(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        (tag, events)
    }

    #[test]
    fn test_start_requires_setup() {
        let mut tag = SimulatedTag::new();
        assert_eq!(tag.emulation_start(), Err(NfcError::NotSetUp));
    }

    #[test]
    fn test_payload_set_refused_while_emulating() {
        let (mut tag, _) = counting_tag();
        tag.payload_set(b"one").unwrap();
        tag.emulation_start().unwrap();
        assert_eq!(tag.payload_set(b"two"), Err(NfcError::Busy));
        assert_eq!(tag.field().tap().unwrap(), b"one");
    }

    #[test]
    fn test_payload_set_rejects_oversized_message() {
        let (mut tag, _) = counting_tag();
        let err = tag.payload_set(&[0; MESSAGE_CAPACITY + 1]).unwrap_err();
        assert!(matches!(err, NfcError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_tap_raises_event_burst() {
        let (mut tag, events) = counting_tag();
        tag.payload_set(b"msg").unwrap();
        tag.emulation_start().unwrap();
        assert_eq!(tag.field().tap().as_deref(), Some(&b"msg"[..]));
        assert_eq!(events.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_raises_stopped_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let mut tag = SimulatedTag::new();
        tag.setup(Box::new(move |event| log.lock().unwrap().push(event)))
            .unwrap();
        tag.emulation_start().unwrap();
        tag.emulation_stop().unwrap();
        // Stopping an idle tag raises nothing.
        tag.emulation_stop().unwrap();

        assert_eq!(*seen.lock().unwrap(), [NfcEvent::Stopped]);
        assert!(!NfcEvent::Stopped.is_scan());
        assert!(NfcEvent::DataRead.is_scan());
    }

    #[test]
    fn test_stopped_tag_is_silent() {
        let (tag, events) = counting_tag();
        assert!(tag.field().tap().is_none());
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_injected_fault_fires_once() {
        let (mut tag, _) = counting_tag();
        let field = tag.field();
        field.inject_fault(FaultPoint::Start);
        assert!(matches!(tag.emulation_start(), Err(NfcError::Driver(_))));
        assert!(!field.is_emulating());
        tag.emulation_start().unwrap();
        assert!(field.is_emulating());
    }
}
