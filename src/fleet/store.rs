//! Remote reading store interface.
//!
//! The aggregator never talks to the network itself. A [`ReadingStore`]
//! answers "what is the latest reading for this sensor" and reports failures
//! as a typed [`FetchError`].

use crate::mac_address::MacAddress;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Why the latest reading for a sensor could not be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("Connection error: {0}")]
    ConnectionFailure(String),
    #[error("No readings found")]
    NotFound,
    #[error("API error {0}")]
    ServerError(u16),
    #[error("No timestamp in response")]
    MissingTimestamp,
    #[error("Timestamp parse error: {0}")]
    TimestampParseFailure(String),
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// The latest reading the store holds for a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub timestamp: OffsetDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub battery: Option<u16>,
}

/// What one fetch attempt produced, as fed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success {
        reading: StoredReading,
        /// When the reading was received; ages are measured against this.
        observed_at: OffsetDateTime,
    },
    Failure(FetchError),
}

/// Future returned by [`ReadingStore::latest`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StoredReading, FetchError>> + Send + 'a>>;

/// Source of the latest stored reading per sensor.
pub trait ReadingStore: Send + Sync {
    fn latest(&self, sensor: MacAddress) -> FetchFuture<'_>;
}

/// JSON body of a "latest reading" response.
///
/// The timestamp is kept as text so that a missing value and a malformed one
/// can be told apart.
#[derive(Debug, Default, Deserialize)]
pub struct LatestReadingBody {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub battery: Option<u16>,
}

impl LatestReadingBody {
    pub fn into_reading(self) -> Result<StoredReading, FetchError> {
        let raw = self
            .timestamp
            .filter(|ts| !ts.trim().is_empty())
            .ok_or(FetchError::MissingTimestamp)?;

        Ok(StoredReading {
            timestamp: parse_timestamp(&raw)?,
            temperature: self.temperature,
            humidity: self.humidity,
            battery: self.battery,
        })
    }
}

/// Parse an RFC 3339 timestamp such as `2026-02-03T17:07:21.963143179Z`.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, FetchError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339)
        .map_err(|err| FetchError::TimestampParseFailure(err.to_string()))
}
