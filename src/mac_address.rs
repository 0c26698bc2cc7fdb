//! Six-byte hardware address used as the sensor identifier.
//!
//! The canonical text form is uppercase, colon-separated hex
//! (`AA:BB:CC:DD:EE:FF`). Ordering follows the raw bytes, which is the same
//! as lexicographic ordering of the canonical form; fleet verdicts rely on
//! that for deterministic tie-breaks.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth hardware address stored as a compact 6-byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", addr), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_display_with_zeros() {
        let addr = MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(format!("{}", addr), "00:01:02:03:04:05");
    }

    #[test]
    fn test_from_str_accepts_lowercase_and_dashes() {
        let upper: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let lower: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        let dashed: MacAddress = "AA-BB-CC-DD-EE-FF".parse().unwrap();
        assert_eq!(upper.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(upper, lower);
        assert_eq!(upper, dashed);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "invalid".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(1))
        ));
        assert!(matches!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::InvalidHex(_))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:F".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPartLength(5))
        ));
    }

    #[test]
    fn test_ordering_matches_canonical_string() {
        let mut addrs: Vec<MacAddress> = ["FF:00:00:00:00:00", "0A:00:00:00:00:01", "0A:00:00:00:00:00"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        addrs.sort();
        let strings: Vec<String> = addrs.iter().map(ToString::to_string).collect();
        let mut sorted = strings.clone();
        sorted.sort();
        assert_eq!(strings, sorted);
    }

    #[test]
    fn test_serde_uses_canonical_string() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");
        let back: MacAddress = serde_json::from_str("\"aa:bb:cc:dd:ee:ff\"").unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<MacAddress>("\"nope\"").is_err());
    }
}
