//! BlueZ adapters.
//!
//! Publishes the exhibit attributes as a GATT application and drives LE
//! advertising through `bluer`. Every characteristic request is forwarded to
//! the [`TagHandle`], so BlueZ's D-Bus callbacks never touch tag state
//! directly.

use std::collections::BTreeSet;

use async_trait::async_trait;
use bluer::adv::{Advertisement, AdvertisementHandle, Type as AdvertisementType};
use bluer::gatt::local::{
    Application, ApplicationHandle, Characteristic, CharacteristicRead, CharacteristicWrite,
    CharacteristicWriteMethod, ReqError, Service,
};
use bluer::{Adapter, Session};
use futures::FutureExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actor::TagHandle;
use crate::advertising::{AdvertisementData, Advertiser, AdvertisingError};
use crate::attributes::{AttributeError, AttributeId, ReadWindow};
use crate::error::Result;

/// Opens the default adapter and powers it on.
///
/// # Errors
///
/// Returns an error if BlueZ is unreachable or has no adapter.
pub async fn open_adapter() -> Result<(Session, Adapter)> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    let address = adapter.address().await?;
    info!(adapter = %adapter.name(), %address, "Bluetooth adapter ready");
    Ok((session, adapter))
}

/// [`Advertiser`] backed by a BlueZ LE advertisement.
pub struct BluezAdvertiser {
    adapter: Adapter,
    handle: Option<AdvertisementHandle>,
}

impl BluezAdvertiser {
    /// Creates an idle advertiser on `adapter`.
    #[must_use]
    pub const fn new(adapter: Adapter) -> Self {
        Self {
            adapter,
            handle: None,
        }
    }
}

#[async_trait]
impl Advertiser for BluezAdvertiser {
    async fn set_name(&mut self, name: &str) -> std::result::Result<(), AdvertisingError> {
        self.adapter
            .set_alias(name.to_string())
            .await
            .map_err(|err| AdvertisingError::SetName(err.to_string()))
    }

    async fn start(
        &mut self,
        data: &AdvertisementData,
    ) -> std::result::Result<(), AdvertisingError> {
        if self.handle.is_some() {
            return Err(AdvertisingError::Start(
                "advertisement already registered".to_string(),
            ));
        }
        let advertisement = Advertisement {
            advertisement_type: AdvertisementType::Peripheral,
            service_uuids: BTreeSet::from([data.service_uuid]),
            local_name: Some(data.local_name.clone()),
            discoverable: Some(true),
            ..Default::default()
        };
        let handle = self
            .adapter
            .advertise(advertisement)
            .await
            .map_err(|err| AdvertisingError::Start(err.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> std::result::Result<(), AdvertisingError> {
        // Dropping the handle unregisters the advertisement.
        drop(self.handle.take());
        Ok(())
    }
}

/// Registers the exhibit service with BlueZ.
///
/// The returned handle keeps the application registered; drop it to
/// unregister.
///
/// # Errors
///
/// Returns an error if BlueZ rejects the application.
pub async fn serve_attributes(
    adapter: &Adapter,
    tag: TagHandle,
    service_uuid: Uuid,
) -> Result<ApplicationHandle> {
    let characteristics = AttributeId::ALL
        .into_iter()
        .map(|attribute| characteristic(attribute, &tag))
        .collect();

    let application = Application {
        services: vec![Service {
            uuid: service_uuid,
            primary: true,
            characteristics,
            ..Default::default()
        }],
        ..Default::default()
    };

    let handle = adapter.serve_gatt_application(application).await?;
    info!(%service_uuid, "GATT service registered");
    Ok(handle)
}

fn characteristic(attribute: AttributeId, tag: &TagHandle) -> Characteristic {
    let read = attribute.is_readable().then(|| {
        let tag = tag.clone();
        CharacteristicRead {
            read: true,
            fun: Box::new(move |req| {
                let tag = tag.clone();
                async move {
                    let window = ReadWindow::from_offset(usize::from(req.offset));
                    tag.read(attribute, window).await.map_err(|err| {
                        debug!(%attribute, %err, device = %req.device_address, "Read refused");
                        req_error(&err)
                    })
                }
                .boxed()
            }),
            ..Default::default()
        }
    });

    let write = attribute.is_writable().then(|| {
        let tag = tag.clone();
        CharacteristicWrite {
            write: true,
            write_without_response: true,
            method: CharacteristicWriteMethod::Fun(Box::new(move |value, req| {
                let tag = tag.clone();
                async move {
                    match tag.write(attribute, usize::from(req.offset), value).await {
                        Ok(outcome) => {
                            debug!(
                                %attribute,
                                stored = outcome.stored_len,
                                device = %req.device_address,
                                "Write applied"
                            );
                            Ok(())
                        }
                        Err(err) => {
                            warn!(%attribute, %err, device = %req.device_address, "Write refused");
                            Err(req_error(&err))
                        }
                    }
                }
                .boxed()
            })),
            ..Default::default()
        }
    });

    Characteristic {
        uuid: attribute.uuid(),
        read,
        write,
        ..Default::default()
    }
}

const fn req_error(err: &AttributeError) -> ReqError {
    match err {
        AttributeError::NotPermitted { .. } => ReqError::NotPermitted,
        AttributeError::InvalidOffset { .. } => ReqError::InvalidOffset,
        AttributeError::InvalidLength { .. } => ReqError::InvalidValueLength,
        AttributeError::WriteFailed(_) | AttributeError::Unavailable => ReqError::Failed,
    }
}
