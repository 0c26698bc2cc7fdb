use crate::advertisement::{Advertisement, RUUVI_MANUFACTURER_ID};
use crate::fleet::store::StoredReading;
use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use time::macros::datetime;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Fixed "now" used by time-sensitive tests.
pub const NOW: OffsetDateTime = datetime!(2026-02-03 17:10:00 UTC);

/// 24-byte RAWv2 payload; decodes to 24.30 °C, 12.53 %, 1000.38 hPa,
/// 1699 mV, sensor `CB:B8:33:4C:88:4F`.
pub const SAMPLE_PAYLOAD: [u8; 24] = [
    0x05, 0x12, 0xFC, 0x13, 0x94, 0xC3, 0x76, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x64, 0x00, 0x04,
    0x00, 0xFC, 0xE6, 0xCB, 0xB8, 0x33, 0x4C, 0x88, 0x4F,
];

/// Ruuvi's published RAWv2 reference vector.
pub const RAWV2_REFERENCE: [u8; 24] = [
    0x05, // Format 5
    0x12, 0xFC, // Temperature: 24.30°C
    0x53, 0x94, // Humidity: 53.49%
    0xC3, 0x7C, // Pressure: 100044 Pa
    0x00, 0x04, 0xFF, 0xFC, 0x04, 0x0C, // Acceleration X/Y/Z
    0xAC, 0x36, // Power info
    0x42, // Movement counter
    0x00, 0xCD, // Sequence
    0xCB, 0xB8, 0x33, 0x4C, 0x88, 0x4F, // MAC address
];

/// Build an advertisement carrying `blobs` with fixed metadata.
pub fn advertisement(blobs: &[(u16, &[u8])]) -> Advertisement {
    Advertisement {
        device_id: TEST_MAC,
        rssi: Some(-67),
        name: Some("Ruuvi EEFF".to_string()),
        manufacturer_data: blobs
            .iter()
            .map(|(id, data)| (*id, data.to_vec()))
            .collect::<HashMap<_, _>>(),
        captured_at: NOW,
    }
}

/// Advertisement from `device_id` carrying [`SAMPLE_PAYLOAD`].
pub fn ruuvi_advertisement(device_id: MacAddress, name: Option<&str>) -> Advertisement {
    Advertisement {
        device_id,
        name: name.map(str::to_string),
        ..advertisement(&[(RUUVI_MANUFACTURER_ID, &SAMPLE_PAYLOAD)])
    }
}

/// A stored reading with only the timestamp set.
pub fn reading_at(timestamp: OffsetDateTime) -> StoredReading {
    StoredReading {
        timestamp,
        temperature: None,
        humidity: None,
        battery: None,
    }
}

/// Sensor id whose last octet is `n`.
pub fn sensor(n: u8) -> MacAddress {
    MacAddress([0xC0, 0xFF, 0xEE, 0x00, 0x00, n])
}

/// Per-process path under the system temp directory.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "ruuvi-fleet-monitor-{}-{}",
        std::process::id(),
        name
    ))
}
