//! Poll-cycle driver for the fleet aggregator.
//!
//! [`FleetMonitor`] owns the aggregator and a [`ReadingStore`]. Each cycle
//! fetches every authorized sensor concurrently, waits for all fetches to
//! settle, and only then touches the liveness records. Dropping a cycle
//! midway therefore leaves no trace in the records.

use crate::fleet::aggregator::{FleetStatusAggregator, FleetVerdict};
use crate::fleet::store::{FetchError, FetchOutcome, ReadingStore};
use crate::mac_address::MacAddress;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Default interval between poll cycles.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(30);

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of "now" for reading ages.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// A completed poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    #[serde(flatten)]
    pub verdict: FleetVerdict,
}

pub struct FleetMonitor<S> {
    store: S,
    aggregator: FleetStatusAggregator,
    fetch_timeout: Duration,
    clock: Clock,
    reports: watch::Sender<Option<CycleReport>>,
}

impl<S: ReadingStore> FleetMonitor<S> {
    pub fn new(store: S, aggregator: FleetStatusAggregator, fetch_timeout: Duration) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            store,
            aggregator,
            fetch_timeout,
            clock: Arc::new(OffsetDateTime::now_utc),
            reports,
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Receiver of completed cycle reports. Holds `None` until the first
    /// cycle finishes.
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleReport>> {
        self.reports.subscribe()
    }

    pub fn aggregator(&self) -> &FleetStatusAggregator {
        &self.aggregator
    }

    /// Run one poll cycle and publish its report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let outcomes = self.fetch_all().await;

        self.aggregator.begin_cycle();
        for (sensor, outcome) in outcomes {
            self.aggregator.apply_outcome(sensor, outcome);
        }
        let report = CycleReport {
            checked_at: (self.clock)(),
            verdict: self.aggregator.compute_verdict(),
        };

        match &report.verdict.reason {
            None => info!("Fleet OK ({} sensors)", self.aggregator.len()),
            Some(reason) => warn!("Fleet NOT OK: {}", reason),
        }
        self.reports.send_replace(Some(report.clone()));
        report
    }

    async fn fetch_all(&self) -> Vec<(MacAddress, FetchOutcome)> {
        let store = &self.store;
        let clock = &self.clock;
        let fetch_timeout = self.fetch_timeout;

        let fetches = self.aggregator.sensor_ids().into_iter().map(move |sensor| async move {
            let outcome = match tokio::time::timeout(fetch_timeout, store.latest(sensor)).await {
                Ok(Ok(reading)) => FetchOutcome::Success {
                    reading,
                    observed_at: clock(),
                },
                Ok(Err(err)) => FetchOutcome::Failure(err),
                Err(_) => {
                    debug!("{}: fetch exceeded {:?}", sensor, fetch_timeout);
                    FetchOutcome::Failure(FetchError::Timeout)
                }
            };
            (sensor, outcome)
        });

        join_all(fetches).await
    }

    /// Run cycles every `period` until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. Ticks that come due while a cycle
    /// is still running are skipped. When `shutdown` fires mid-cycle the
    /// in-flight fetches are dropped and their results discarded.
    pub async fn run<F>(mut self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, abandoning in-flight poll cycle");
                    break;
                }
                _ = self.run_cycle() => {}
            }
        }
        debug!("Fleet monitor stopped");
    }
}
