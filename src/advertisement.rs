//! Advertisement events and the classifier that turns them into measurements.

use crate::decoder::{self, DecodeError};
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// Ruuvi Innovations manufacturer ID.
///
/// See: https://github.com/ruuvi/ruuvi-sensor-protocols
pub const RUUVI_MANUFACTURER_ID: u16 = 0x0499;

/// A single advertisement event as delivered by an
/// [`AdvertisementSource`](crate::scanner::AdvertisementSource).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Advertisement {
    /// Address of the advertising device
    #[serde(rename = "address")]
    pub device_id: MacAddress,
    /// Received signal strength in dBm
    #[serde(default)]
    pub rssi: Option<i16>,
    /// Local name, if the device announced one
    #[serde(default)]
    pub name: Option<String>,
    /// Manufacturer-specific data keyed by company id (prefix stripped)
    #[serde(default)]
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    /// Capture instant
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub captured_at: OffsetDateTime,
}

/// Outcome of classifying one advertisement.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A RuuviTag RAWv2 measurement.
    Reading(Measurement),
    /// No Ruuvi manufacturer data; some other device.
    Foreign,
    /// Ruuvi manufacturer data that failed to decode.
    Malformed(DecodeError),
}

impl Classification {
    /// The measurement, if this event was a usable reading.
    pub fn into_measurement(self) -> Option<Measurement> {
        match self {
            Classification::Reading(measurement) => Some(measurement),
            Classification::Foreign | Classification::Malformed(_) => None,
        }
    }

    /// The discarded decode error for malformed Ruuvi payloads.
    pub fn decode_error(&self) -> Option<DecodeError> {
        match self {
            Classification::Malformed(err) => Some(*err),
            _ => None,
        }
    }
}

/// Classify an advertisement.
///
/// Only the blob tagged with [`RUUVI_MANUFACTURER_ID`] is considered; every
/// other company id is ignored.
pub fn classify(advertisement: &Advertisement) -> Classification {
    let Some(data) = advertisement.manufacturer_data.get(&RUUVI_MANUFACTURER_ID) else {
        return Classification::Foreign;
    };

    match decoder::decode(data) {
        Ok(payload) => Classification::Reading(Measurement {
            device_id: advertisement.device_id,
            rssi: advertisement.rssi,
            captured_at: advertisement.captured_at,
            device_name: advertisement.name.clone(),
            payload,
        }),
        Err(err) => Classification::Malformed(err),
    }
}
