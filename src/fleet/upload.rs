//! Uploading the latest reading of each authorized sensor.
//!
//! Readings heard over the radio are buffered per sensor, newest wins, and
//! pushed to a [`ReadingSink`] on a schedule. A sensor that was not heard
//! since the previous round is not uploaded again.

use crate::decoder::Payload;
use crate::mac_address::MacAddress;
use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

use crate::fleet::presence::PresenceSummary;

/// Default interval between upload rounds.
pub const DEFAULT_UPLOAD_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Default delay before the first round, so a scan has time to hear the fleet.
pub const DEFAULT_FIRST_UPLOAD_DELAY: Duration = Duration::from_secs(10);

/// Default per-upload timeout.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("request timed out")]
    Timeout,
    #[error("Connection error: {0}")]
    ConnectionFailure(String),
    #[error("HTTP {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Body of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingUpload {
    pub temperature: f64,
    pub humidity: f64,
    pub battery: u16,
}

impl From<&Payload> for ReadingUpload {
    fn from(payload: &Payload) -> Self {
        Self {
            temperature: payload.temperature,
            humidity: payload.humidity,
            battery: payload.battery,
        }
    }
}

/// Future returned by [`ReadingSink::upload`].
pub type UploadFuture<'a> = Pin<Box<dyn Future<Output = Result<(), UploadError>> + Send + 'a>>;

/// Destination for sensor readings.
pub trait ReadingSink: Send + Sync {
    fn upload(&self, sensor: MacAddress, reading: ReadingUpload) -> UploadFuture<'_>;
}

/// Newest unsent reading per sensor.
#[derive(Debug, Default)]
pub struct PendingReadings {
    readings: BTreeMap<MacAddress, ReadingUpload>,
}

impl PendingReadings {
    pub fn record(&mut self, sensor: MacAddress, payload: &Payload) {
        self.readings.insert(sensor, payload.into());
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Take everything buffered, in sensor id order.
    pub fn drain(&mut self) -> Vec<(MacAddress, ReadingUpload)> {
        std::mem::take(&mut self.readings).into_iter().collect()
    }
}

/// Outcome of one upload round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReport {
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub attempted: usize,
    pub failed: usize,
    pub presence: PresenceSummary,
}

impl UploadReport {
    pub fn sent(&self) -> usize {
        self.attempted - self.failed
    }
}

/// Upload `batch` concurrently, each upload bounded by `timeout`.
///
/// Returns the number of failed uploads; failures are logged.
pub async fn upload_batch<K: ReadingSink + ?Sized>(
    sink: &K,
    batch: Vec<(MacAddress, ReadingUpload)>,
    timeout: Duration,
) -> usize {
    if batch.is_empty() {
        warn!("No readings to upload");
        return 0;
    }

    let uploads = batch.into_iter().map(|(sensor, reading)| async move {
        let result = match tokio::time::timeout(timeout, sink.upload(sensor, reading)).await {
            Ok(result) => result,
            Err(_) => Err(UploadError::Timeout),
        };
        match &result {
            Ok(()) => debug!(
                "{}: uploaded {:.2} °C, {:.2} %, {} mV",
                sensor, reading.temperature, reading.humidity, reading.battery
            ),
            Err(err) => warn!("{}: upload failed: {}", sensor, err),
        }
        result
    });

    join_all(uploads)
        .await
        .iter()
        .filter(|result| result.is_err())
        .count()
}
