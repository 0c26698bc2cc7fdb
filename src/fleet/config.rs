//! Fleet configuration and credentials on disk.
//!
//! The fleet file lists the sensors the monitor is allowed to care about:
//!
//! ```json
//! {
//!   "authorized_sensors": [
//!     {"mac": "C4:D8:7A:11:22:33", "name": "Kitchen", "registered_at": "2026-02-01T09:00:00Z"}
//!   ]
//! }
//! ```

use crate::mac_address::MacAddress;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;

/// Default fleet file name, relative to the working directory.
pub const DEFAULT_FLEET_FILE: &str = "authorized_sensors.json";

/// Default API key file name, relative to the home directory.
pub const DEFAULT_API_KEY_FILE: &str = ".ruuvi-fleet-monitor";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Cannot serialize fleet configuration: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("API key file {0} is empty")]
    EmptyApiKey(PathBuf),
    #[error("Cannot locate home directory for the API key file")]
    NoHomeDirectory,
}

/// One sensor the fleet is authorized to track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizedSensor {
    pub mac: MacAddress,
    pub name: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub registered_at: Option<OffsetDateTime>,
}

/// The ordered list of authorized sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(rename = "authorized_sensors", default)]
    pub sensors: Vec<AuthorizedSensor>,
}

impl FleetConfig {
    /// Read a fleet file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a fleet file, treating a missing file as an empty fleet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Write the fleet file as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved {} sensor(s) to {}", self.sensors.len(), path.display());
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.sensors.iter().any(|s| &s.mac == mac)
    }

    /// Display name configured for `mac`.
    pub fn name_of(&self, mac: &MacAddress) -> Option<&str> {
        self.sensors
            .iter()
            .find(|s| &s.mac == mac)
            .map(|s| s.name.as_str())
    }
}

/// Path of the API key file: `explicit` if given, else `$HOME/.ruuvi-fleet-monitor`.
pub fn api_key_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(DEFAULT_API_KEY_FILE))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Read a bearer token from `path`, trimming surrounding whitespace.
pub fn load_api_key(path: &Path) -> Result<String, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let key = contents.trim();
    if key.is_empty() {
        return Err(ConfigError::EmptyApiKey(path.to_path_buf()));
    }
    Ok(key.to_string())
}
