//! RuuviTag RAWv2 (data format 5) payload decoder.
//!
//! The decoder is a pure function over the manufacturer-specific bytes of an
//! advertisement (without the company id prefix). It checks the length and
//! the format tag and then applies fixed-point transforms to a handful of
//! big-endian fields:
//!
//! | Field       | Bytes | Raw type | Transform        |
//! |-------------|-------|----------|------------------|
//! | temperature | 1-2   | `i16`    | `× 0.005` °C     |
//! | humidity    | 3-4   | `u16`    | `× 0.0025` %     |
//! | pressure    | 5-6   | `u16`    | `(v + 50000) / 100` hPa |
//! | battery     | 11-12 | `u16`    | `(v >> 5) + 1600` mV |
//! | sensor id   | 18-23 | 6 bytes  | colon hex        |
//!
//! No range checks are made: "not measured" sentinels such as `0x8000` for
//! temperature come through as plain numbers.

use crate::mac_address::MacAddress;
use serde::Serialize;
use thiserror::Error;

/// Format tag of the only supported payload version.
pub const RAWV2_FORMAT: u8 = 0x05;

/// Minimum payload length covering every decoded field.
pub const RAWV2_MIN_LEN: usize = 24;

const TEMPERATURE_SCALE: f64 = 0.005;
const HUMIDITY_SCALE: f64 = 0.0025;
const PRESSURE_OFFSET: f64 = 50_000.0;
const BATTERY_OFFSET_MV: u16 = 1600;

/// Why a payload could not be decoded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload shorter than [`RAWV2_MIN_LEN`].
    #[error("Truncated payload: {len} bytes, need at least {RAWV2_MIN_LEN}")]
    Truncated { len: usize },
    /// Format tag other than [`RAWV2_FORMAT`].
    #[error("Unsupported format: 0x{0:02X} (only RAWv2 0x05 is supported)")]
    UnsupportedFormat(u8),
}

/// Physical values carried by a RAWv2 payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Payload {
    /// Hardware address embedded in the payload body.
    pub sensor_id: MacAddress,
    /// Temperature in Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Atmospheric pressure in hectopascals.
    pub pressure: f64,
    /// Battery voltage in millivolts.
    pub battery: u16,
}

impl Payload {
    /// Atmospheric pressure in Pascals.
    pub fn pressure_pa(&self) -> f64 {
        self.pressure * 100.0
    }
}

/// Decode a RAWv2 payload.
///
/// Length is checked before the format tag, so an empty or short buffer is
/// always [`DecodeError::Truncated`]. Bytes past offset 23 are ignored.
///
/// # Example
/// ```
/// use ruuvi_fleet_monitor::decoder::{decode, DecodeError};
///
/// assert_eq!(decode(&[0x05, 0x00]), Err(DecodeError::Truncated { len: 2 }));
/// ```
pub fn decode(data: &[u8]) -> Result<Payload, DecodeError> {
    if data.len() < RAWV2_MIN_LEN {
        return Err(DecodeError::Truncated { len: data.len() });
    }
    if data[0] != RAWV2_FORMAT {
        return Err(DecodeError::UnsupportedFormat(data[0]));
    }

    let temperature = f64::from(i16::from_be_bytes([data[1], data[2]])) * TEMPERATURE_SCALE;
    let humidity = f64::from(u16::from_be_bytes([data[3], data[4]])) * HUMIDITY_SCALE;
    let pressure = (f64::from(u16::from_be_bytes([data[5], data[6]])) + PRESSURE_OFFSET) / 100.0;
    let battery = (u16::from_be_bytes([data[11], data[12]]) >> 5) + BATTERY_OFFSET_MV;
    let sensor_id = MacAddress([data[18], data[19], data[20], data[21], data[22], data[23]]);

    Ok(Payload {
        sensor_id,
        temperature,
        humidity,
        pressure,
        battery,
    })
}
