//! Replay backend: advertisements recorded as JSON lines.
//!
//! Each non-empty line is one [`Advertisement`]:
//!
//! ```text
//! {"address":"C4:D8:7A:11:22:33","rssi":-71,"name":"Ruuvi 2233","captured_at":"2026-02-03T17:07:21Z","manufacturer_data":{"1177":[5,18,252,...]}}
//! ```
//!
//! Lines that do not parse are logged and skipped. Lines starting with `#`
//! are comments.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, AdvertisementSource, AdvertisementStream, ScanError};
use crate::advertisement::Advertisement;
use log::warn;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Source that replays a recorded JSON-lines file.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AdvertisementSource for ReplaySource {
    fn advertisements(&self) -> AdvertisementStream<'_> {
        Box::pin(async move {
            let contents =
                std::fs::read_to_string(&self.path).map_err(|source| ScanError::Replay {
                    path: self.path.clone(),
                    source,
                })?;
            let events = parse_lines(&contents);

            let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        })
    }
}

/// Parse a JSON-lines recording, skipping blank lines, comments and lines
/// that fail to parse.
pub fn parse_lines(contents: &str) -> Vec<Advertisement> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(advertisement) => Some(advertisement),
            Err(err) => {
                warn!("replay line {}: {}", index + 1, err);
                None
            }
        })
        .collect()
}
