//! Advertisement sources.
//!
//! This module provides a trait-based abstraction over the places raw BLE
//! advertisements come from: a live BlueZ adapter or a recorded replay file.
//! Sources do no decoding; they hand every event to the caller, which runs it
//! through [`classify`](crate::advertisement::classify).

#[cfg(feature = "bluer")]
pub mod bluer;

pub mod replay;

use crate::advertisement::Advertisement;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel buffer size for advertisement events.
pub const ADVERTISEMENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Replay file could not be read
    #[error("Cannot read replay file {path}: {source}")]
    Replay {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Future returned by [`AdvertisementSource::advertisements`].
pub type AdvertisementStream<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Advertisement>, ScanError>> + Send + 'a>>;

/// Anything that yields raw advertisement events.
///
/// The returned channel closes when the source is exhausted (replay) or the
/// backend stops.
pub trait AdvertisementSource: Send + Sync {
    fn advertisements(&self) -> AdvertisementStream<'_>;
}

/// Pick the source for a run: a replay file when given, otherwise the
/// compiled-in Bluetooth backend.
pub fn select_source(
    replay: Option<PathBuf>,
) -> Result<Box<dyn AdvertisementSource>, ScanError> {
    match replay {
        Some(path) => Ok(Box::new(replay::ReplaySource::new(path))),
        None => live_source(),
    }
}

#[cfg(feature = "bluer")]
fn live_source() -> Result<Box<dyn AdvertisementSource>, ScanError> {
    Ok(Box::new(bluer::BluerSource))
}

#[cfg(not(feature = "bluer"))]
fn live_source() -> Result<Box<dyn AdvertisementSource>, ScanError> {
    Err(ScanError::BackendNotAvailable("bluer".to_string()))
}
