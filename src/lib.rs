//! `ruuvi-fleet-monitor` library.
//!
//! Three pieces do the real work:
//!
//! - [`decoder`] turns a RuuviTag RAWv2 payload into physical values
//! - [`advertisement`] sorts BLE advertisement events into readings, foreign
//!   traffic and malformed Ruuvi payloads
//! - [`fleet`] tracks whether every authorized sensor keeps reporting
//!
//! The binary (`src/main.rs`) is responsible for logging setup and process
//! exit codes. Everything else lives in [`crate::app`] where it can be tested
//! deterministically with injected sources, stores and output streams.

pub mod advertisement;
pub mod app;
pub mod decoder;
pub mod fleet;
pub mod mac_address;
pub mod measurement;
pub mod output;
pub mod scanner;
pub mod throttle;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{Advertisement, Classification, classify};
pub use decoder::{DecodeError, Payload, decode};
pub use fleet::aggregator::{FleetStatus, FleetStatusAggregator, FleetVerdict, SensorState};
pub use fleet::store::{FetchError, FetchOutcome, ReadingStore, StoredReading};
pub use mac_address::MacAddress;
pub use measurement::Measurement;
pub use output::OutputFormatter;
pub use scanner::{AdvertisementSource, ScanError};
pub use throttle::{Throttle, parse_duration};
