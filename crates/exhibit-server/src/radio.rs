//! Radio bring-up.
//!
//! Builds the tag on the simulated NFC driver, starts advertising, spawns
//! the tag actor and, with BlueZ available, registers the GATT service.

use anyhow::Context;
use exhibit_core::{
    Advertiser, ExhibitConfig, ExhibitTag, MockAdvertiser, MonotonicClock, SimulatedField,
    SimulatedTag, TagActor, TagHandle, TagSettings,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running tag and whatever keeps its radios registered.
pub struct Radio {
    tag: TagHandle,
    field: SimulatedField,
    task: JoinHandle<()>,
    #[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
    _bluez: Option<BluezRegistration>,
}

/// Keeps the BlueZ session and GATT application alive.
#[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
struct BluezRegistration {
    _session: bluer::Session,
    _application: bluer::gatt::local::ApplicationHandle,
}

impl Radio {
    /// Starts the tag with the radio stack selected at build time.
    ///
    /// # Errors
    ///
    /// Returns an error if the NFC driver or BlueZ cannot be set up.
    pub async fn start(config: &ExhibitConfig) -> anyhow::Result<Self> {
        #[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
        {
            Self::start_bluez(config).await
        }
        #[cfg(not(all(feature = "bluetooth", not(feature = "mock-bluetooth"))))]
        {
            Self::start_mock(config).await
        }
    }

    /// Starts the tag with an in-memory advertiser and no GATT service.
    ///
    /// # Errors
    ///
    /// Returns an error if the NFC driver cannot be set up.
    pub async fn start_mock(config: &ExhibitConfig) -> anyhow::Result<Self> {
        info!("Using mock advertiser");
        let (tag, field, task) = spawn_tag(config, MockAdvertiser::new()).await?;
        Ok(Self {
            tag,
            field,
            task,
            #[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
            _bluez: None,
        })
    }

    /// Starts the tag on the default BlueZ adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if BlueZ is unreachable or rejects the service.
    #[cfg(all(feature = "bluetooth", not(feature = "mock-bluetooth")))]
    pub async fn start_bluez(config: &ExhibitConfig) -> anyhow::Result<Self> {
        use exhibit_core::bluetooth::{open_adapter, serve_attributes, BluezAdvertiser};

        let (session, adapter) = open_adapter()
            .await
            .context("Failed to open Bluetooth adapter")?;
        let advertiser = BluezAdvertiser::new(adapter.clone());
        let (tag, field, task) = spawn_tag(config, advertiser).await?;
        let application = serve_attributes(&adapter, tag.clone(), config.device.service_uuid)
            .await
            .context("Failed to register GATT service")?;

        Ok(Self {
            tag,
            field,
            task,
            _bluez: Some(BluezRegistration {
                _session: session,
                _application: application,
            }),
        })
    }

    /// Handle to the tag actor.
    #[must_use]
    pub const fn tag(&self) -> &TagHandle {
        &self.tag
    }

    /// The simulated reader's proximity field.
    #[must_use]
    pub const fn field(&self) -> &SimulatedField {
        &self.field
    }

    /// Whether the actor task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn spawn_tag<A>(
    config: &ExhibitConfig,
    advertiser: A,
) -> anyhow::Result<(TagHandle, SimulatedField, JoinHandle<()>)>
where
    A: Advertiser + 'static,
{
    let driver = SimulatedTag::new();
    let field = driver.field();
    let mut tag = ExhibitTag::new(TagSettings::from(config), driver, advertiser);

    // The tag stays reachable over NFC and the bench API without advertising.
    if let Err(err) = tag.start_advertising().await {
        warn!(%err, "Initial advertising failed");
    }

    let (handle, task) =
        TagActor::spawn(tag, MonotonicClock::start()).context("Failed to set up NFC")?;
    Ok((handle, field, task))
}
