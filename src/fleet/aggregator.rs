//! Fleet liveness state machine.
//!
//! [`FleetStatusAggregator`] keeps one [`LivenessRecord`] per authorized
//! sensor and folds one [`FetchOutcome`] per sensor per poll cycle into it.
//! After a cycle, [`compute_verdict`](FleetStatusAggregator::compute_verdict)
//! reduces the records to a single [`FleetVerdict`].
//!
//! A cycle is:
//!
//! 1. [`begin_cycle`](FleetStatusAggregator::begin_cycle)
//! 2. [`apply_outcome`](FleetStatusAggregator::apply_outcome) for each sensor,
//!    in any order
//! 3. [`compute_verdict`](FleetStatusAggregator::compute_verdict)
//!
//! The verdict only depends on the set of outcomes, not on the order they
//! were applied in: records live in a map ordered by sensor id and every
//! tie-break walks that order.

use crate::fleet::config::AuthorizedSensor;
use crate::fleet::store::{FetchError, FetchOutcome};
use crate::mac_address::MacAddress;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Default maximum age of a reading that still counts as fresh.
pub const DEFAULT_STALE_AFTER: std::time::Duration = std::time::Duration::from_secs(6 * 60);

/// Liveness of a single sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    /// Never fetched successfully.
    Unknown,
    /// Latest reading is within the staleness threshold.
    Fresh,
    /// Latest reading is older than the threshold.
    Stale,
    /// Latest fetch failed after at least one success.
    Error,
}

/// Per-sensor bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessRecord {
    name: String,
    state: SensorState,
    last_good_reading_at: Option<OffsetDateTime>,
    last_observed_at: Option<OffsetDateTime>,
    current_cycle_error: Option<FetchError>,
}

impl LivenessRecord {
    fn new(name: String) -> Self {
        Self {
            name,
            state: SensorState::Unknown,
            last_good_reading_at: None,
            last_observed_at: None,
            current_cycle_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SensorState {
        self.state
    }

    /// Newest reading timestamp ever fetched; never moves backwards.
    pub fn last_good_reading_at(&self) -> Option<OffsetDateTime> {
        self.last_good_reading_at
    }

    /// Time between the newest reading ever fetched and the most recent
    /// successful fetch.
    pub fn since_last_good_reading(&self) -> Option<Duration> {
        Some(self.last_observed_at? - self.last_good_reading_at?)
    }

    pub fn current_cycle_error(&self) -> Option<&FetchError> {
        self.current_cycle_error.as_ref()
    }
}

/// Fleet-wide health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatus {
    Ok,
    NotOk,
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetStatus::Ok => write!(f, "OK"),
            FleetStatus::NotOk => write!(f, "NOT OK"),
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetVerdict {
    pub status: FleetStatus,
    /// Human-readable cause; present iff `status` is [`FleetStatus::NotOk`].
    pub reason: Option<String>,
    /// Oldest `last_good_reading_at` among sensors that ever reported.
    #[serde(with = "time::serde::rfc3339::option")]
    pub oldest_reading_at: Option<OffsetDateTime>,
}

impl FleetVerdict {
    pub fn is_ok(&self) -> bool {
        self.status == FleetStatus::Ok
    }
}

/// Owner of all [`LivenessRecord`]s.
#[derive(Debug, Clone)]
pub struct FleetStatusAggregator {
    stale_after: Duration,
    records: BTreeMap<MacAddress, LivenessRecord>,
}

impl FleetStatusAggregator {
    /// Create records for `sensors`, all starting in [`SensorState::Unknown`].
    ///
    /// A sensor listed twice keeps its first name.
    pub fn new<I>(sensors: I, stale_after: std::time::Duration) -> Self
    where
        I: IntoIterator<Item = AuthorizedSensor>,
    {
        let mut records = BTreeMap::new();
        for sensor in sensors {
            if records.contains_key(&sensor.mac) {
                warn!("{} listed more than once, keeping first entry", sensor.mac);
                continue;
            }
            records.insert(sensor.mac, LivenessRecord::new(sensor.name));
        }

        Self {
            stale_after: Duration::try_from(stale_after).unwrap_or(Duration::MAX),
            records,
        }
    }

    /// Authorized sensor ids in ascending order.
    pub fn sensor_ids(&self) -> Vec<MacAddress> {
        self.records.keys().copied().collect()
    }

    pub fn record(&self, sensor: &MacAddress) -> Option<&LivenessRecord> {
        self.records.get(sensor)
    }

    pub fn records(&self) -> impl Iterator<Item = (&MacAddress, &LivenessRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clear every sensor's error from the previous cycle.
    pub fn begin_cycle(&mut self) {
        for record in self.records.values_mut() {
            record.current_cycle_error = None;
        }
    }

    /// Fold one fetch outcome into a sensor's record.
    ///
    /// Returns the sensor's new state, or `None` when `sensor` is not part of
    /// the fleet (the outcome is dropped).
    pub fn apply_outcome(
        &mut self,
        sensor: MacAddress,
        outcome: FetchOutcome,
    ) -> Option<SensorState> {
        let stale_after = self.stale_after;
        let Some(record) = self.records.get_mut(&sensor) else {
            warn!("Ignoring fetch outcome for unauthorized sensor {}", sensor);
            return None;
        };

        match outcome {
            FetchOutcome::Success {
                reading,
                observed_at,
            } => {
                let age = observed_at - reading.timestamp;
                record.state = if age <= stale_after {
                    SensorState::Fresh
                } else {
                    SensorState::Stale
                };
                if record
                    .last_observed_at
                    .is_none_or(|previous| observed_at > previous)
                {
                    record.last_observed_at = Some(observed_at);
                }
                if record
                    .last_good_reading_at
                    .is_none_or(|previous| reading.timestamp > previous)
                {
                    record.last_good_reading_at = Some(reading.timestamp);
                }
                debug!(
                    "{} ({}): {:?}, reading age {}s",
                    record.name,
                    sensor,
                    record.state,
                    age.whole_seconds()
                );
            }
            FetchOutcome::Failure(err) => {
                if record.state != SensorState::Unknown {
                    record.state = SensorState::Error;
                }
                debug!("{} ({}): fetch failed: {}", record.name, sensor, err);
                record.current_cycle_error = Some(err);
            }
        }

        Some(record.state)
    }

    /// Reduce all records to one verdict.
    ///
    /// The fleet is OK exactly when no record yields a reason: every sensor
    /// is fresh and none failed this cycle.
    pub fn compute_verdict(&self) -> FleetVerdict {
        let oldest_reading_at = self
            .records
            .values()
            .filter_map(|r| r.last_good_reading_at)
            .min();

        match self.representative_reason() {
            None => FleetVerdict {
                status: FleetStatus::Ok,
                reason: None,
                oldest_reading_at,
            },
            Some(reason) => FleetVerdict {
                status: FleetStatus::NotOk,
                reason: Some(reason),
                oldest_reading_at,
            },
        }
    }

    /// Errors beat staleness, staleness beats everything else; within each,
    /// the lowest sensor id wins.
    fn representative_reason(&self) -> Option<String> {
        let records = || self.records.values();

        records()
            .find_map(|r| {
                let err = r.current_cycle_error.as_ref()?;
                Some(format!("{}: {}", r.name, err))
            })
            .or_else(|| {
                records()
                    .find(|r| r.state == SensorState::Stale)
                    .map(|r| {
                        let minutes = r.since_last_good_reading().map_or(0, |d| d.whole_minutes());
                        format!("{}: Last reading {} min ago", r.name, minutes)
                    })
            })
            .or_else(|| {
                records().find_map(|r| match r.state {
                    SensorState::Fresh | SensorState::Stale => None,
                    SensorState::Unknown => Some(format!("{}: No reading received yet", r.name)),
                    SensorState::Error => Some(format!("{}: Last fetch failed", r.name)),
                })
            })
    }
}
