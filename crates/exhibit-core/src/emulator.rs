//! Proximity-tap emulation session.
//!
//! The served message is only ever replaced whole, and only while emulation
//! is stopped: stop, install, start. A reader mid-tap therefore sees either
//! the old message or the new one, never a mix.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::nfc::{NfcCallback, NfcDriver, NfcError};
use crate::store::EncodedTagPayload;

/// Failure of one step of [`TagEmulator::swap_payload`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// The running session could not be stopped; nothing was changed.
    #[error("Failed to stop NFC emulation: {0}")]
    StopFailed(#[source] NfcError),

    /// The driver rejected the new message; the previous one is still installed.
    #[error("Failed to install NFC payload: {0}")]
    InstallFailed(#[source] NfcError),

    /// The new message is installed but emulation did not restart.
    #[error("Failed to start NFC emulation: {0}")]
    StartFailed(#[source] NfcError),
}

/// Owns the driver and the message it serves.
pub struct TagEmulator<D> {
    driver: D,
    served: EncodedTagPayload,
    running: bool,
}

impl<D: NfcDriver> TagEmulator<D> {
    /// Wraps a driver. Emulation starts on the first successful swap.
    pub const fn new(driver: D) -> Self {
        Self {
            driver,
            served: EncodedTagPayload::empty(),
            running: false,
        }
    }

    /// Registers the scan callback with the driver.
    ///
    /// # Errors
    ///
    /// Returns the driver error if setup fails.
    pub fn setup(&mut self, callback: NfcCallback) -> Result<(), NfcError> {
        self.driver.setup(callback)
    }

    /// Replaces the served message.
    ///
    /// No retry is attempted. After [`SwapError::StartFailed`] the new
    /// message stays installed and the tag is silent until the next swap.
    ///
    /// # Errors
    ///
    /// Returns the [`SwapError`] of the first step that failed.
    pub fn swap_payload(&mut self, payload: EncodedTagPayload) -> Result<(), SwapError> {
        let was_running = self.running;
        if was_running {
            self.driver.emulation_stop().map_err(SwapError::StopFailed)?;
            self.running = false;
        }

        if let Err(err) = self.driver.payload_set(payload.as_bytes()) {
            if was_running {
                self.resume_previous();
            }
            return Err(SwapError::InstallFailed(err));
        }
        self.served = payload;
        debug!(len = self.served.len(), "NFC payload installed");

        self.driver
            .emulation_start()
            .map_err(SwapError::StartFailed)?;
        self.running = true;
        info!(len = self.served.len(), "NFC emulation serving new payload");
        Ok(())
    }

    /// Puts the still-installed previous message back on air.
    fn resume_previous(&mut self) {
        match self.driver.emulation_start() {
            Ok(()) => self.running = true,
            Err(err) => warn!(%err, "Failed to resume previous NFC payload"),
        }
    }

    /// The message currently installed in the driver.
    pub const fn served(&self) -> &EncodedTagPayload {
        &self.served
    }

    /// Whether emulation is running.
    pub const fn is_running(&self) -> bool {
        self.running
    }
}
