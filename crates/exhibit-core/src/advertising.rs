//! Advertising subsystem boundary.
//!
//! The radio advertises the device name and the exhibit service UUID.
//! Changing the name means stopping the running advertisement before
//! starting a new one; starting twice is a transport protocol violation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Content of the advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementData {
    /// Complete local name.
    pub local_name: String,
    /// Primary service UUID listed in the advertisement.
    pub service_uuid: Uuid,
}

/// Advertising failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdvertisingError {
    /// The adapter rejected the new name.
    #[error("Failed to set device name: {0}")]
    SetName(String),

    /// The running advertisement could not be stopped.
    #[error("Failed to stop advertising: {0}")]
    Stop(String),

    /// Advertising could not be (re)started.
    #[error("Failed to start advertising: {0}")]
    Start(String),
}

/// Radio advertising control.
#[async_trait]
pub trait Advertiser: Send {
    /// Sets the device name used by the adapter.
    async fn set_name(&mut self, name: &str) -> Result<(), AdvertisingError>;

    /// Starts advertising. Fails if an advertisement is already running.
    async fn start(&mut self, data: &AdvertisementData) -> Result<(), AdvertisingError>;

    /// Stops advertising. Stopping when idle is not an error.
    async fn stop(&mut self) -> Result<(), AdvertisingError>;
}

/// A call recorded by [`MockAdvertiser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvertiserCall {
    /// [`Advertiser::set_name`].
    SetName(String),
    /// [`Advertiser::start`].
    Start(AdvertisementData),
    /// [`Advertiser::stop`].
    Stop,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<AdvertiserCall>,
    active: Option<AdvertisementData>,
    fail_next_start: bool,
}

/// In-memory advertiser for tests and radio-less builds.
///
/// Clones share state, so a test can keep one clone while the tag owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockAdvertiser {
    state: Arc<Mutex<MockState>>,
}

impl MockAdvertiser {
    /// Creates an idle advertiser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name in the running advertisement, if any.
    #[must_use]
    pub fn advertised_name(&self) -> Option<String> {
        self.lock().active.as_ref().map(|data| data.local_name.clone())
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<AdvertiserCall> {
        self.lock().calls.clone()
    }

    /// Makes the next [`Advertiser::start`] fail.
    pub fn fail_next_start(&self) {
        self.lock().fail_next_start = true;
    }
}

#[async_trait]
impl Advertiser for MockAdvertiser {
    async fn set_name(&mut self, name: &str) -> Result<(), AdvertisingError> {
        self.lock().calls.push(AdvertiserCall::SetName(name.to_string()));
        Ok(())
    }

    async fn start(&mut self, data: &AdvertisementData) -> Result<(), AdvertisingError> {
        let mut state = self.lock();
        state.calls.push(AdvertiserCall::Start(data.clone()));
        if std::mem::take(&mut state.fail_next_start) {
            return Err(AdvertisingError::Start("injected failure".to_string()));
        }
        if state.active.is_some() {
            return Err(AdvertisingError::Start("already advertising".to_string()));
        }
        state.active = Some(data.clone());
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AdvertisingError> {
        let mut state = self.lock();
        state.calls.push(AdvertiserCall::Stop);
        state.active = None;
        Ok(())
    }
}
