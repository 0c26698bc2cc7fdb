//! Which authorized sensors have been heard from recently.
//!
//! A sensor is online while its last advertisement is younger than the
//! online window (default 2 minutes). This is a local radio view and is
//! independent of the reading store.

use crate::mac_address::MacAddress;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default time a sensor stays online after its last advertisement.
pub const DEFAULT_ONLINE_WINDOW: Duration = Duration::from_secs(2 * 60);

/// Online count over the authorized fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresenceSummary {
    pub online: usize,
    pub total: usize,
}

impl PresenceSummary {
    pub fn offline(&self) -> usize {
        self.total - self.online
    }
}

impl fmt::Display for PresenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} online", self.online, self.total)?;
        if self.offline() > 0 {
            write!(f, ", {} offline", self.offline())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct PresenceTracker {
    window: Duration,
    last_seen: BTreeMap<MacAddress, Option<Instant>>,
    last_reported: Option<PresenceSummary>,
}

impl PresenceTracker {
    /// Track `sensors`, all offline until first seen.
    pub fn new(sensors: impl IntoIterator<Item = MacAddress>, window: Duration) -> Self {
        Self {
            window,
            last_seen: sensors.into_iter().map(|mac| (mac, None)).collect(),
            last_reported: None,
        }
    }

    /// Record an advertisement from `sensor` at `now`. Unknown sensors are
    /// ignored.
    pub fn mark_seen_at(&mut self, sensor: MacAddress, now: Instant) {
        if let Some(seen) = self.last_seen.get_mut(&sensor) {
            *seen = Some(now);
        }
    }

    pub fn summary_at(&self, now: Instant) -> PresenceSummary {
        let online = self
            .last_seen
            .values()
            .flatten()
            .filter(|seen| now.saturating_duration_since(**seen) < self.window)
            .count();
        PresenceSummary {
            online,
            total: self.last_seen.len(),
        }
    }

    /// Summary at `now` if it differs from the one last returned here.
    pub fn changed_at(&mut self, now: Instant) -> Option<PresenceSummary> {
        let summary = self.summary_at(now);
        if self.last_reported == Some(summary) {
            return None;
        }
        self.last_reported = Some(summary);
        Some(summary)
    }
}
