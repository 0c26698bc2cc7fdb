//! Decoded RuuviTag measurement with advertisement metadata.

use crate::decoder::Payload;
use crate::mac_address::MacAddress;
use serde::Serialize;
use time::OffsetDateTime;

/// A measurement from a RuuviTag sensor.
///
/// The physical values come from the payload body; `device_id`, `rssi`,
/// `captured_at` and `device_name` describe the advertisement that carried it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Address of the advertising device
    pub device_id: MacAddress,
    /// Received signal strength in dBm
    pub rssi: Option<i16>,
    /// When the advertisement was captured
    #[serde(with = "time::serde::rfc3339")]
    pub captured_at: OffsetDateTime,
    /// Local name announced by the device
    pub device_name: Option<String>,
    /// Decoded payload body
    #[serde(flatten)]
    pub payload: Payload,
}
