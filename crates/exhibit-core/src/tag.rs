//! The exhibit tag: attribute handlers wired to state, transcoder,
//! emulator and advertiser.
//!
//! Every handler runs to completion against `&mut self`, so one
//! [`ExhibitTag`] processes requests strictly one after another. Concurrent
//! event sources reach it through the [`actor`](crate::actor) instead of
//! sharing it.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::advertising::{AdvertisementData, Advertiser, AdvertisingError};
use crate::attributes::{AttributeError, AttributeId, Operation, ReadWindow, WriteOutcome};
use crate::config::ExhibitConfig;
use crate::debounce::{ScanDebouncer, ScanOutcome};
use crate::emulator::TagEmulator;
use crate::error::{OversizedInput, TagError};
use crate::ndef::encode_uri_message;
use crate::nfc::{NfcCallback, NfcDriver, NfcError};
use crate::store::{
    DeviceName, EncodedTagPayload, TagStore, UrlPayload, NAME_CAPACITY, URL_CAPACITY,
};

/// Settings an [`ExhibitTag`] is built from.
#[derive(Debug, Clone)]
pub struct TagSettings {
    /// Name advertised at boot.
    pub device_name: DeviceName,
    /// Primary service UUID.
    pub service_uuid: Uuid,
    /// Refractory window for scan debouncing.
    pub refractory_window_ms: u64,
    /// Turn post-write failures into rejected writes.
    pub surface_write_failures: bool,
}

impl From<&ExhibitConfig> for TagSettings {
    fn from(config: &ExhibitConfig) -> Self {
        let (device_name, truncated) = DeviceName::truncating(config.device.name.as_bytes());
        if truncated {
            warn!(
                len = config.device.name.len(),
                max = NAME_CAPACITY,
                "Configured device name truncated"
            );
        }
        Self {
            device_name,
            service_uuid: config.device.service_uuid,
            refractory_window_ms: config.scan.refractory_window_ms,
            surface_write_failures: config.attributes.surface_write_failures,
        }
    }
}

impl Default for TagSettings {
    fn default() -> Self {
        Self::from(&ExhibitConfig::default())
    }
}

/// One exhibit tag.
pub struct ExhibitTag<D, A> {
    store: TagStore,
    debouncer: ScanDebouncer,
    emulator: TagEmulator<D>,
    advertiser: A,
    service_uuid: Uuid,
    surface_write_failures: bool,
}

impl<D: NfcDriver, A: Advertiser> ExhibitTag<D, A> {
    /// Builds a tag with empty state. Nothing is started yet.
    pub fn new(settings: TagSettings, driver: D, advertiser: A) -> Self {
        Self {
            store: TagStore::new(settings.device_name),
            debouncer: ScanDebouncer::new(settings.refractory_window_ms),
            emulator: TagEmulator::new(driver),
            advertiser,
            service_uuid: settings.service_uuid,
            surface_write_failures: settings.surface_write_failures,
        }
    }

    /// Registers the scan callback with the NFC driver.
    ///
    /// # Errors
    ///
    /// Returns the driver error if setup fails.
    pub fn setup_nfc(&mut self, callback: NfcCallback) -> Result<(), NfcError> {
        self.emulator.setup(callback)
    }

    /// Sets the adapter name and starts advertising.
    ///
    /// # Errors
    ///
    /// Returns the advertising error if the radio refuses.
    pub async fn start_advertising(&mut self) -> Result<(), AdvertisingError> {
        let data = self.advertisement();
        self.advertiser.set_name(&data.local_name).await?;
        self.advertiser.start(&data).await?;
        info!(name = %data.local_name, "Advertising started");
        Ok(())
    }

    fn advertisement(&self) -> AdvertisementData {
        AdvertisementData {
            local_name: self.store.device_name().advertised().to_string(),
            service_uuid: self.service_uuid,
        }
    }

    /// The shared state.
    pub const fn store(&self) -> &TagStore {
        &self.store
    }

    /// The message currently installed for proximity-tap readers.
    pub const fn served_payload(&self) -> &EncodedTagPayload {
        self.emulator.served()
    }

    /// Whether proximity-tap emulation is running.
    pub const fn is_emulating(&self) -> bool {
        self.emulator.is_running()
    }

    /// Handles a scan event from the NFC hardware.
    pub fn on_scan_event(&mut self, now_ms: u64) -> ScanOutcome {
        self.debouncer.on_scan_event(&mut self.store, now_ms)
    }

    /// Handles an attribute read.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::NotPermitted`] for the write-only name and
    /// [`AttributeError::InvalidOffset`] for a window past the value.
    pub fn read(
        &self,
        attribute: AttributeId,
        window: ReadWindow,
    ) -> Result<Vec<u8>, AttributeError> {
        let value = match attribute {
            AttributeId::Url => window.slice(self.store.url().as_bytes())?.to_vec(),
            AttributeId::VisitCount => window.slice(&self.store.visits().to_be_bytes())?.to_vec(),
            AttributeId::DeviceName => {
                return Err(AttributeError::NotPermitted {
                    attribute,
                    operation: Operation::Read,
                })
            }
        };
        debug!(%attribute, offset = window.offset, len = value.len(), "Attribute read");
        Ok(value)
    }

    /// Handles an attribute write.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError`] when the write is refused. Failures after
    /// the value is stored are logged and only returned (as
    /// [`AttributeError::WriteFailed`]) when configured to surface.
    pub async fn write(
        &mut self,
        attribute: AttributeId,
        offset: usize,
        value: &[u8],
    ) -> Result<WriteOutcome, AttributeError> {
        let outcome = match attribute {
            AttributeId::Url => self.write_url(offset, value)?,
            AttributeId::DeviceName => self.write_device_name(offset, value).await?,
            AttributeId::VisitCount => {
                return Err(AttributeError::NotPermitted {
                    attribute,
                    operation: Operation::Write,
                })
            }
        };

        match (&outcome.degraded, self.surface_write_failures) {
            (Some(err), true) => Err(AttributeError::WriteFailed(err.clone())),
            _ => Ok(outcome),
        }
    }

    /// Stores a new URL, resets the visit counter and re-serves the URL
    /// over NFC.
    ///
    /// Every write is served as soon as it lands, including each chunk of a
    /// long write. BlueZ gives no signal when a prepared write is executed,
    /// so a reader tapping between chunks gets the partial URL and the
    /// counter is reset once per chunk.
    fn write_url(&mut self, offset: usize, value: &[u8]) -> Result<WriteOutcome, AttributeError> {
        let current = self.store.url().as_bytes();
        if offset > current.len() {
            return Err(AttributeError::InvalidOffset {
                offset,
                len: current.len(),
            });
        }

        let mut joined = Vec::with_capacity(offset + value.len());
        joined.extend_from_slice(&current[..offset]);
        joined.extend_from_slice(value);
        let url = UrlPayload::from_bytes(&joined).ok_or(AttributeError::InvalidLength {
            len: joined.len(),
            capacity: URL_CAPACITY,
        })?;

        info!(url = %String::from_utf8_lossy(url.as_bytes()), "Received URL");
        self.store.set_url(url);
        self.store.reset_visits();

        let degraded = self.serve_current_url().err();
        Ok(WriteOutcome {
            stored_len: self.store.url().len(),
            oversized: None,
            degraded,
        })
    }

    /// Encodes the stored URL and swaps it into the emulator.
    ///
    /// On an encode failure the emulator is not touched and keeps serving
    /// the previous message.
    fn serve_current_url(&mut self) -> Result<(), TagError> {
        let payload = encode_uri_message(self.store.url().as_bytes()).map_err(|err| {
            error!(%err, "NFC encoding failed");
            TagError::from(err)
        })?;
        self.emulator.swap_payload(payload).map_err(|err| {
            error!(%err, "NFC payload swap failed");
            TagError::from(err)
        })
    }

    /// Stores a new device name and re-advertises under it.
    ///
    /// Names over 64 bytes are cut to 64 bytes, never rejected.
    async fn write_device_name(
        &mut self,
        offset: usize,
        value: &[u8],
    ) -> Result<WriteOutcome, AttributeError> {
        if offset != 0 {
            return Err(AttributeError::InvalidOffset { offset, len: 0 });
        }

        let (name, truncated) = DeviceName::truncating(value);
        let oversized = truncated.then(|| {
            let oversized = OversizedInput {
                len: value.len(),
                max: NAME_CAPACITY,
            };
            warn!(%oversized, "Name too long; truncated");
            oversized
        });

        self.store.set_device_name(name);
        let data = self.advertisement();
        info!(name = %data.local_name, "Received name");

        let degraded = self.readvertise(&data).await.err().map(TagError::from);
        Ok(WriteOutcome {
            stored_len: self.store.device_name().as_bytes().len(),
            oversized,
            degraded,
        })
    }

    /// Stop, rename, start. A failed stop is logged and the restart is
    /// still attempted.
    async fn readvertise(&mut self, data: &AdvertisementData) -> Result<(), AdvertisingError> {
        let mut first_error = None;

        if let Err(err) = self.advertiser.stop().await {
            error!(%err, "Advertisement stop failed");
            first_error.get_or_insert(err);
        }
        if let Err(err) = self.advertiser.set_name(&data.local_name).await {
            error!(%err, "Name change failed");
            first_error.get_or_insert(err);
        }
        match self.advertiser.start(data).await {
            Ok(()) => info!(name = %data.local_name, "Advertising restarted with new name"),
            Err(err) => {
                error!(%err, "Advertising failed to restart");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertising::{AdvertiserCall, MockAdvertiser};
    use crate::ndef::parse_uri_message;
    use crate::nfc::{FaultPoint, SimulatedField, SimulatedTag};

    type Parts = (ExhibitTag<SimulatedTag, MockAdvertiser>, SimulatedField, MockAdvertiser);

    fn tag_with(settings: TagSettings) -> Parts {
        let driver = SimulatedTag::new();
        let field = driver.field();
        let advertiser = MockAdvertiser::new();
        let mut tag = ExhibitTag::new(settings, driver, advertiser.clone());
        tag.setup_nfc(Box::new(|_| {})).unwrap();
        (tag, field, advertiser)
    }

    fn tag() -> Parts {
        tag_with(TagSettings::default())
    }

    #[tokio::test]
    async fn test_url_write_then_read() {
        let (mut tag, field, _) = tag();
        let outcome = tag.write(AttributeId::Url, 0, b"http://example.com").await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(outcome.stored_len, 18);
        assert_eq!(
            tag.read(AttributeId::Url, ReadWindow::FULL).unwrap(),
            b"http://example.com"
        );
        let served = field.tap().unwrap();
        assert_eq!(parse_uri_message(&served).unwrap(), "http://example.com");
    }

    #[tokio::test]
    async fn test_url_write_resets_visits() {
        let (mut tag, _, _) = tag();
        tag.on_scan_event(0);
        tag.on_scan_event(5000);
        assert_eq!(tag.store().visits(), 2);
        tag.write(AttributeId::Url, 0, b"http://b.example").await.unwrap();
        assert_eq!(tag.store().visits(), 0);
    }

    #[tokio::test]
    async fn test_url_long_write_continuation() {
        let (mut tag, _, _) = tag();
        tag.write(AttributeId::Url, 0, b"http://exam").await.unwrap();
        tag.write(AttributeId::Url, 11, b"ple.com").await.unwrap();
        assert_eq!(tag.store().url().as_bytes(), b"http://example.com");

        let err = tag.write(AttributeId::Url, 40, b"x").await.unwrap_err();
        assert_eq!(err, AttributeError::InvalidOffset { offset: 40, len: 18 });
    }

    #[tokio::test]
    async fn test_url_chunks_are_served_as_they_land() {
        let (mut tag, field, _) = tag();
        let served = |field: &SimulatedField| parse_uri_message(&field.tap().unwrap()).unwrap();

        tag.write(AttributeId::Url, 0, b"http://old.example").await.unwrap();
        tag.on_scan_event(0);

        tag.write(AttributeId::Url, 0, b"http://new.exa").await.unwrap();
        assert_eq!(served(&field), "http://new.exa");
        assert_eq!(tag.store().visits(), 0);

        tag.write(AttributeId::Url, 14, b"mple").await.unwrap();
        assert_eq!(served(&field), "http://new.example");
    }

    #[tokio::test]
    async fn test_url_over_capacity_is_refused_untouched() {
        let (mut tag, _, _) = tag();
        tag.write(AttributeId::Url, 0, b"http://a.example").await.unwrap();
        tag.on_scan_event(0);

        let err = tag
            .write(AttributeId::Url, 0, &[b'a'; URL_CAPACITY + 1])
            .await
            .unwrap_err();
        assert!(matches!(err, AttributeError::InvalidLength { .. }));
        assert_eq!(tag.store().url().as_bytes(), b"http://a.example");
        assert_eq!(tag.store().visits(), 1);
    }

    #[tokio::test]
    async fn test_encode_failure_is_acknowledged_by_default() {
        let (mut tag, field, _) = tag();
        tag.write(AttributeId::Url, 0, b"http://a.example").await.unwrap();

        let outcome = tag.write(AttributeId::Url, 0, &[b'a'; 252]).await.unwrap();
        assert!(matches!(outcome.degraded, Some(TagError::Encode(_))));
        assert_eq!(tag.store().url().len(), 252);
        let served = field.tap().unwrap();
        assert_eq!(parse_uri_message(&served).unwrap(), "http://a.example");
    }

    #[tokio::test]
    async fn test_swap_failure_surfaces_when_configured() {
        let settings = TagSettings {
            surface_write_failures: true,
            ..TagSettings::default()
        };
        let (mut tag, field, _) = tag_with(settings);
        field.inject_fault(FaultPoint::Start);

        let err = tag.write(AttributeId::Url, 0, b"http://a.example").await.unwrap_err();
        assert!(matches!(
            err,
            AttributeError::WriteFailed(TagError::Swap(crate::emulator::SwapError::StartFailed(_)))
        ));
        // Stored regardless; only the acknowledgement changes.
        assert_eq!(tag.store().url().as_bytes(), b"http://a.example");
        assert!(!tag.is_emulating());
    }

    #[tokio::test]
    async fn test_visit_count_read_is_big_endian() {
        let (mut tag, _, _) = tag();
        tag.on_scan_event(0);
        assert_eq!(
            tag.read(AttributeId::VisitCount, ReadWindow::FULL).unwrap(),
            [0x00, 0x00, 0x00, 0x01]
        );
        assert_eq!(
            tag.read(AttributeId::VisitCount, ReadWindow::new(2, 1)).unwrap(),
            [0x00]
        );
    }

    #[tokio::test]
    async fn test_access_matrix_enforced() {
        let (mut tag, _, _) = tag();
        assert!(matches!(
            tag.read(AttributeId::DeviceName, ReadWindow::FULL),
            Err(AttributeError::NotPermitted { .. })
        ));
        assert!(matches!(
            tag.write(AttributeId::VisitCount, 0, &[0, 0, 0, 9]).await,
            Err(AttributeError::NotPermitted { .. })
        ));
    }

    #[tokio::test]
    async fn test_name_write_restarts_advertising_in_order() {
        let (mut tag, _, advertiser) = tag();
        tag.start_advertising().await.unwrap();
        let outcome = tag.write(AttributeId::DeviceName, 0, b"Gallery 3").await.unwrap();
        assert!(outcome.is_clean());
        assert_eq!(advertiser.advertised_name().as_deref(), Some("Gallery 3"));

        let calls = advertiser.calls();
        let tail: Vec<_> = calls.iter().skip(2).collect();
        assert!(matches!(tail[0], AdvertiserCall::Stop));
        assert!(matches!(tail[1], AdvertiserCall::SetName(name) if name == "Gallery 3"));
        assert!(matches!(tail[2], AdvertiserCall::Start(_)));
    }

    #[tokio::test]
    async fn test_name_restart_failure_is_degraded_not_rejected() {
        let (mut tag, _, advertiser) = tag();
        tag.start_advertising().await.unwrap();
        advertiser.fail_next_start();

        let outcome = tag.write(AttributeId::DeviceName, 0, b"Gallery 4").await.unwrap();
        assert!(matches!(outcome.degraded, Some(TagError::Advertising(_))));
        assert!(advertiser.advertised_name().is_none());
    }
}
