//! Application state shared across handlers.

use std::sync::Arc;

use exhibit_core::{ExhibitConfig, SimulatedField, TagHandle};

use crate::radio::Radio;

/// Handle to the shared state, cloned into every handler.
pub type SharedState = Arc<AppState>;

/// Shared application state.
///
/// Tag state itself lives in the actor; handlers only hold a [`TagHandle`].
pub struct AppState {
    /// Handle to the tag actor.
    pub tag: TagHandle,
    /// Proximity field of the simulated reader, if the tag runs on one.
    pub field: Option<SimulatedField>,
    /// Configuration the daemon was started with.
    pub config: ExhibitConfig,
}

impl AppState {
    /// Creates state for a running radio.
    #[must_use]
    pub fn new(radio: &Radio, config: ExhibitConfig) -> SharedState {
        Arc::new(Self {
            tag: radio.tag().clone(),
            field: Some(radio.field().clone()),
            config,
        })
    }
}
