//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementSource, AdvertisementStream, ScanError};
use crate::advertisement::{Advertisement, RUUVI_MANUFACTURER_ID};
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Address, Session};
use futures::StreamExt;
use log::{debug, info};
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
const MANUFACTURER_DATA_TYPE: u8 = 0xff;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Live source backed by the default BlueZ adapter.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluerSource;

impl AdvertisementSource for BluerSource {
    fn advertisements(&self) -> AdvertisementStream<'_> {
        Box::pin(start_scan())
    }
}

/// Power up the default adapter and register a passive advertisement monitor
/// matching Ruuvi manufacturer data. Events flow until the receiver is dropped.
async fn start_scan() -> Result<mpsc::Receiver<Advertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    info!("Scanning on adapter {}", adapter.name());

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    // Company ids are little-endian on the air.
    let pattern = Pattern {
        data_type: MANUFACTURER_DATA_TYPE,
        start_position: 0,
        content: RUUVI_MANUFACTURER_ID.to_le_bytes().to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    tokio::spawn(async move {
        // Keep the D-Bus session and monitor registration alive with the task
        let _session = session;
        let _monitor_manager = monitor_manager;

        while let Some(event) = monitor_handle.next().await {
            let MonitorEvent::DeviceFound(device_id) = event else {
                continue;
            };
            match read_advertisement(&adapter, device_id.device).await {
                Ok(Some(advertisement)) => {
                    if tx.send(advertisement).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => debug!("{}: {}", device_id.device, err),
            }
        }
        debug!("Advertisement monitor closed");
    });

    Ok(rx)
}

/// Snapshot the advertisement properties BlueZ holds for a device.
async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<Advertisement>, ScanError> {
    let device = adapter.device(address)?;

    let Some(manufacturer_data) = device.manufacturer_data().await? else {
        return Ok(None);
    };

    Ok(Some(Advertisement {
        device_id: address.into(),
        rssi: device.rssi().await?,
        name: device.name().await?,
        manufacturer_data,
        captured_at: OffsetDateTime::now_utc(),
    }))
}
