//! Core application runner (business logic) for `ruuvi-fleet-monitor`.
//!
//! This module is intentionally decoupled from process setup and exit codes
//! so it can be tested deterministically with injected advertisement sources,
//! reading stores, clocks and output streams.

use crate::advertisement::{Advertisement, Classification, classify};
use crate::fleet::aggregator::FleetStatusAggregator;
use crate::fleet::config::{AuthorizedSensor, ConfigError, DEFAULT_FLEET_FILE, FleetConfig};
use crate::fleet::monitor::{Clock, FleetMonitor};
use crate::fleet::presence::{DEFAULT_ONLINE_WINDOW, PresenceSummary, PresenceTracker};
use crate::fleet::store::ReadingStore;
use crate::fleet::upload::{PendingReadings, ReadingSink, UploadReport, upload_batch};
use crate::mac_address::MacAddress;
use crate::measurement::Measurement;
use crate::output::{Format, OutputFormatter};
use crate::scanner::{AdvertisementSource, ScanError};
use crate::throttle::{Throttle, parse_duration};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use std::future::Future;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, about, version)]
pub struct Cli {
    /// Verbose output: log at debug level unless RUST_LOG says otherwise
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print every decoded RuuviTag measurement
    Scan(ScanOptions),
    /// Discover nearby RuuviTags and write them to the fleet file
    Register(RegisterOptions),
    /// Poll the reading store and report fleet liveness
    Monitor(MonitorOptions),
    /// Scan authorized sensors and upload their latest readings
    Upload(UploadOptions),
}

/// Where advertisements come from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceOptions {
    /// Replay advertisements from a JSON-lines file instead of scanning
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ScanOptions {
    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// Throttle events per tag to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = parse_duration)]
    pub throttle: Option<Duration>,

    /// Fleet file used for display names and `--authorized-only`
    #[arg(long, value_name = "FILE", default_value = DEFAULT_FLEET_FILE)]
    pub config: PathBuf,

    /// Only print measurements from sensors listed in the fleet file
    #[arg(long)]
    pub authorized_only: bool,

    #[command(flatten)]
    pub source: SourceOptions,
}

#[derive(Args, Debug, Clone)]
pub struct RegisterOptions {
    /// How long to listen for sensors
    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub duration: Duration,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_FLEET_FILE)]
    pub config: PathBuf,

    /// Overwrite a fleet file that already lists sensors
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub source: SourceOptions,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorOptions {
    /// Base URL of the reading store API
    #[arg(long, value_name = "URL")]
    pub api_url: String,

    /// File holding the bearer token [default: ~/.ruuvi-fleet-monitor]
    #[arg(long, value_name = "FILE")]
    pub api_key_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_FLEET_FILE)]
    pub config: PathBuf,

    #[arg(long, value_parser = parse_duration, default_value = "30s")]
    pub poll_period: Duration,

    /// Per-sensor fetch timeout
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub fetch_timeout: Duration,

    /// Maximum reading age that still counts as fresh
    #[arg(long, value_parser = parse_duration, default_value = "6m")]
    pub stale_after: Duration,

    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    /// Run a single poll cycle and exit with the verdict
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug, Clone)]
pub struct UploadOptions {
    /// Base URL of the reading store API
    #[arg(long, value_name = "URL")]
    pub api_url: String,

    /// File holding the bearer token [default: ~/.ruuvi-fleet-monitor]
    #[arg(long, value_name = "FILE")]
    pub api_key_file: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_FLEET_FILE)]
    pub config: PathBuf,

    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    pub upload_period: Duration,

    /// Delay before the first upload round
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub first_upload_after: Duration,

    /// Per-sensor upload timeout
    #[arg(long, value_parser = parse_duration, default_value = "10s")]
    pub upload_timeout: Duration,

    /// How long a sensor counts as online after its last advertisement
    #[arg(long, value_parser = parse_duration, default_value = "2m")]
    pub online_window: Duration,

    #[arg(long, default_value_t, value_enum)]
    pub format: Format,

    #[command(flatten)]
    pub source: SourceOptions,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("No authorized sensors in {0}")]
    EmptyFleet(PathBuf),
    #[error("No RuuviTags found within {0:?}")]
    NoSensorsFound(Duration),
    #[error("{path} already lists {count} sensor(s), use --force to overwrite")]
    AlreadyRegistered { path: PathBuf, count: usize },
    #[error("HTTP support not compiled in")]
    HttpUnavailable,
    #[error("Cannot create HTTP client: {0}")]
    HttpClient(String),
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// `monitor --once` finished a cycle whose verdict was NOT OK.
    FleetNotOk,
}

/// Run `command` against the real backends, writing data lines to `out`.
///
/// `shutdown` stops a continuous `monitor` or `upload`.
pub async fn run<F>(command: Command, shutdown: F, out: &mut dyn Write) -> Result<RunOutcome, RunError>
where
    F: Future<Output = ()>,
{
    match command {
        Command::Scan(options) => {
            let source = crate::scanner::select_source(options.source.replay.clone())?;
            run_scan_with_io(&options, source.as_ref(), out).await?;
        }
        Command::Register(options) => {
            let source = crate::scanner::select_source(options.source.replay.clone())?;
            run_register_with_io(&options, source.as_ref(), OffsetDateTime::now_utc(), out).await?;
        }
        Command::Monitor(options) => return run_monitor(options, shutdown, out).await,
        Command::Upload(options) => run_upload(options, shutdown, out).await?,
    }
    Ok(RunOutcome::Completed)
}

#[cfg(feature = "http")]
fn http_store(
    api_url: &str,
    api_key_file: Option<&std::path::Path>,
) -> Result<crate::fleet::http::HttpReadingStore, RunError> {
    use crate::fleet::config::{api_key_path, load_api_key};

    let api_key = load_api_key(&api_key_path(api_key_file)?)?;
    crate::fleet::http::HttpReadingStore::new(api_url, api_key)
        .map_err(|err| RunError::HttpClient(err.to_string()))
}

#[cfg(feature = "http")]
async fn run_monitor<F>(
    options: MonitorOptions,
    shutdown: F,
    out: &mut dyn Write,
) -> Result<RunOutcome, RunError>
where
    F: Future<Output = ()>,
{
    let store = http_store(&options.api_url, options.api_key_file.as_deref())?;
    let clock: Clock = std::sync::Arc::new(OffsetDateTime::now_utc);
    run_monitor_with_io(&options, store, clock, shutdown, out).await
}

#[cfg(feature = "http")]
async fn run_upload<F>(options: UploadOptions, shutdown: F, out: &mut dyn Write) -> Result<(), RunError>
where
    F: Future<Output = ()>,
{
    let sink = http_store(&options.api_url, options.api_key_file.as_deref())?;
    let source = crate::scanner::select_source(options.source.replay.clone())?;
    let clock: Clock = std::sync::Arc::new(OffsetDateTime::now_utc);
    run_upload_with_io(&options, source.as_ref(), &sink, clock, shutdown, out).await
}

#[cfg(not(feature = "http"))]
async fn run_monitor<F>(
    _options: MonitorOptions,
    _shutdown: F,
    _out: &mut dyn Write,
) -> Result<RunOutcome, RunError>
where
    F: Future<Output = ()>,
{
    Err(RunError::HttpUnavailable)
}

#[cfg(not(feature = "http"))]
async fn run_upload<F>(_options: UploadOptions, _shutdown: F, _out: &mut dyn Write) -> Result<(), RunError>
where
    F: Future<Output = ()>,
{
    Err(RunError::HttpUnavailable)
}

/// Display name: fleet file entry, then advertised name, then device id.
fn display_name(config: &FleetConfig, measurement: &Measurement) -> String {
    config
        .name_of(&measurement.device_id)
        .or(measurement.device_name.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| measurement.device_id.to_string())
}

/// The measurement carried by `advertisement`. Foreign advertisements are
/// dropped silently, malformed Ruuvi payloads are logged at debug level.
fn measurement_of(advertisement: &Advertisement) -> Option<Measurement> {
    let classification = classify(advertisement);
    if let Some(err) = classification.decode_error() {
        debug!("{}: {}", advertisement.device_id, err);
    }
    classification.into_measurement()
}

fn write_measurement(
    formatter: &dyn OutputFormatter,
    measurement: &Measurement,
    name: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    let line = formatter.format_measurement(measurement, name);
    writeln!(out, "{line}")
}

fn presence_tracker(config: &FleetConfig, window: Duration) -> PresenceTracker {
    PresenceTracker::new(config.sensors.iter().map(|sensor| sensor.mac), window)
}

/// Mark `sensor` as seen now and log the online count when it changes.
fn track_presence(presence: &mut PresenceTracker, sensor: MacAddress) {
    let now = Instant::now();
    presence.mark_seen_at(sensor, now);
    if let Some(summary) = presence.changed_at(now) {
        info!("Sensors: {}", summary);
    }
}

/// Print every measurement `source` yields until it closes.
///
/// - With `--authorized-only`, devices missing from the fleet file are
///   dropped, and the number of sensors heard within the last two minutes is
///   logged whenever it changes. The final count is returned.
/// - The throttle, if any, is applied last.
pub async fn run_scan_with_io(
    options: &ScanOptions,
    source: &dyn AdvertisementSource,
    out: &mut dyn Write,
) -> Result<Option<PresenceSummary>, RunError> {
    let config = FleetConfig::load_or_default(&options.config)?;
    if options.authorized_only && config.is_empty() {
        return Err(RunError::EmptyFleet(options.config.clone()));
    }
    let formatter = options.format.formatter();
    let mut throttle = options.throttle.map(Throttle::new);
    let mut presence = options
        .authorized_only
        .then(|| presence_tracker(&config, DEFAULT_ONLINE_WINDOW));

    let mut advertisements = source.advertisements().await?;

    while let Some(advertisement) = advertisements.recv().await {
        let Some(measurement) = measurement_of(&advertisement) else {
            continue;
        };

        if let Some(presence) = presence.as_mut() {
            if !config.contains(&measurement.device_id) {
                continue;
            }
            track_presence(presence, measurement.device_id);
        }

        let should_emit = throttle
            .as_mut()
            .is_none_or(|t: &mut Throttle| t.should_emit(measurement.device_id));

        if should_emit {
            let name = display_name(&config, &measurement);
            write_measurement(formatter.as_ref(), &measurement, &name, out)?;
        }
    }

    Ok(presence.map(|presence| presence.summary_at(Instant::now())))
}

/// Listen for `options.duration`, then write every distinct RuuviTag seen to
/// the fleet file, in discovery order.
pub async fn run_register_with_io(
    options: &RegisterOptions,
    source: &dyn AdvertisementSource,
    now: OffsetDateTime,
    out: &mut dyn Write,
) -> Result<FleetConfig, RunError> {
    let existing = FleetConfig::load_or_default(&options.config)?;
    if !existing.is_empty() && !options.force {
        return Err(RunError::AlreadyRegistered {
            path: options.config.clone(),
            count: existing.sensors.len(),
        });
    }

    info!("Listening for RuuviTags for {:?}", options.duration);
    let mut advertisements = source.advertisements().await?;
    let deadline = tokio::time::sleep(options.duration);
    tokio::pin!(deadline);

    let mut config = FleetConfig::default();
    loop {
        let advertisement = tokio::select! {
            _ = &mut deadline => break,
            event = advertisements.recv() => match event {
                Some(advertisement) => advertisement,
                None => break,
            },
        };

        let Classification::Reading(measurement) = classify(&advertisement) else {
            continue;
        };
        if config.contains(&measurement.device_id) {
            continue;
        }

        let name = measurement
            .device_name
            .clone()
            .unwrap_or_else(|| measurement.device_id.to_string());
        info!("Found {} ({})", measurement.device_id, name);
        config.sensors.push(AuthorizedSensor {
            mac: measurement.device_id,
            name,
            registered_at: Some(now),
        });
    }

    if config.is_empty() {
        return Err(RunError::NoSensorsFound(options.duration));
    }

    config.save(&options.config)?;
    for sensor in &config.sensors {
        writeln!(out, "{}  {}", sensor.mac, sensor.name)?;
    }
    Ok(config)
}

/// Poll the fleet and write one report per completed cycle.
///
/// With `--once` a single cycle runs and its verdict decides the outcome.
/// Otherwise cycles repeat every `poll_period` until `shutdown` resolves.
pub async fn run_monitor_with_io<S, F>(
    options: &MonitorOptions,
    store: S,
    clock: Clock,
    shutdown: F,
    out: &mut dyn Write,
) -> Result<RunOutcome, RunError>
where
    S: ReadingStore,
    F: Future<Output = ()>,
{
    let config = FleetConfig::load(&options.config)?;
    if config.is_empty() {
        return Err(RunError::EmptyFleet(options.config.clone()));
    }
    info!(
        "Monitoring {} sensor(s), stale after {:?}",
        config.sensors.len(),
        options.stale_after
    );

    let aggregator = FleetStatusAggregator::new(config.sensors, options.stale_after);
    let mut monitor =
        FleetMonitor::new(store, aggregator, options.fetch_timeout).with_clock(clock);
    let formatter = options.format.formatter();

    if options.once {
        let report = monitor.run_cycle().await;
        writeln!(out, "{}", formatter.format_report(&report))?;
        return Ok(if report.verdict.is_ok() {
            RunOutcome::Completed
        } else {
            RunOutcome::FleetNotOk
        });
    }

    let mut reports = monitor.subscribe();
    let running = monitor.run(options.poll_period, shutdown);
    tokio::pin!(running);

    loop {
        tokio::select! {
            biased;
            changed = reports.changed() => {
                if changed.is_err() {
                    break;
                }
                let report = reports.borrow_and_update().clone();
                if let Some(report) = report {
                    writeln!(out, "{}", formatter.format_report(&report))?;
                }
            }
            _ = &mut running => break,
        }
    }

    Ok(RunOutcome::Completed)
}

async fn upload_round<K>(
    sink: &K,
    pending: &mut PendingReadings,
    presence: &PresenceTracker,
    clock: &Clock,
    timeout: Duration,
) -> UploadReport
where
    K: ReadingSink + ?Sized,
{
    let batch = pending.drain();
    let attempted = batch.len();
    let failed = upload_batch(sink, batch, timeout).await;
    UploadReport {
        uploaded_at: clock(),
        attempted,
        failed,
        presence: presence.summary_at(Instant::now()),
    }
}

/// Print readings from authorized sensors and upload the newest one per
/// sensor every `upload_period`, starting `first_upload_after` from now.
///
/// Each round uploads only sensors heard since the previous round and writes
/// one summary line. When the source closes, pending readings are flushed
/// before returning; `shutdown` returns without flushing.
pub async fn run_upload_with_io<K, F>(
    options: &UploadOptions,
    source: &dyn AdvertisementSource,
    sink: &K,
    clock: Clock,
    shutdown: F,
    out: &mut dyn Write,
) -> Result<(), RunError>
where
    K: ReadingSink + ?Sized,
    F: Future<Output = ()>,
{
    let config = FleetConfig::load(&options.config)?;
    if config.is_empty() {
        return Err(RunError::EmptyFleet(options.config.clone()));
    }
    info!(
        "Uploading readings of {} sensor(s) every {:?}",
        config.sensors.len(),
        options.upload_period
    );

    let formatter = options.format.formatter();
    let mut presence = presence_tracker(&config, options.online_window);
    let mut pending = PendingReadings::default();
    let mut advertisements = source.advertisements().await?;

    let mut ticker =
        tokio::time::interval_at(Instant::now() + options.first_upload_after, options.upload_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let report =
                    upload_round(sink, &mut pending, &presence, &clock, options.upload_timeout).await;
                writeln!(out, "{}", formatter.format_upload(&report))?;
            }
            event = advertisements.recv() => {
                let Some(advertisement) = event else {
                    if !pending.is_empty() {
                        let report =
                            upload_round(sink, &mut pending, &presence, &clock, options.upload_timeout).await;
                        writeln!(out, "{}", formatter.format_upload(&report))?;
                    }
                    break;
                };
                let Some(measurement) = measurement_of(&advertisement) else {
                    continue;
                };
                if !config.contains(&measurement.device_id) {
                    continue;
                }
                track_presence(&mut presence, measurement.device_id);
                pending.record(measurement.device_id, &measurement.payload);
                let name = display_name(&config, &measurement);
                write_measurement(formatter.as_ref(), &measurement, &name, out)?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::RUUVI_MANUFACTURER_ID;
    use crate::fleet::store::{FetchError, FetchFuture, StoredReading};
    use crate::fleet::upload::{ReadingUpload, UploadError, UploadFuture};
    use crate::scanner::AdvertisementStream;
    use crate::test_utils::{
        NOW, SAMPLE_PAYLOAD, TEST_MAC, advertisement, reading_at, ruuvi_advertisement, sensor,
        temp_path,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Debug)]
    struct FakeSource {
        events: Vec<Advertisement>,
        /// Keep the channel open after the last event, like a live adapter.
        hold_open: bool,
    }

    impl FakeSource {
        fn new(events: Vec<Advertisement>) -> Self {
            Self {
                events,
                hold_open: false,
            }
        }

        fn live(events: Vec<Advertisement>) -> Self {
            Self {
                events,
                hold_open: true,
            }
        }
    }

    impl AdvertisementSource for FakeSource {
        fn advertisements(&self) -> AdvertisementStream<'_> {
            let events = self.events.clone();
            let hold_open = self.hold_open;
            Box::pin(async move {
                let (tx, rx) = mpsc::channel::<Advertisement>(events.len().max(1));
                tokio::spawn(async move {
                    for event in events {
                        let _ = tx.send(event).await;
                    }
                    if hold_open {
                        tx.closed().await;
                    }
                });
                Ok(rx)
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        responses: HashMap<MacAddress, Result<StoredReading, FetchError>>,
    }

    impl ReadingStore for FakeStore {
        fn latest(&self, sensor: MacAddress) -> FetchFuture<'_> {
            let result = self
                .responses
                .get(&sensor)
                .cloned()
                .unwrap_or(Err(FetchError::NotFound));
            Box::pin(async move { result })
        }
    }

    #[derive(Default)]
    struct FakeSink {
        uploads: Mutex<Vec<(MacAddress, ReadingUpload)>>,
        reject: Option<MacAddress>,
    }

    impl FakeSink {
        fn uploaded(&self) -> Vec<MacAddress> {
            self.uploads.lock().unwrap().iter().map(|(mac, _)| *mac).collect()
        }
    }

    impl ReadingSink for FakeSink {
        fn upload(&self, sensor: MacAddress, reading: ReadingUpload) -> UploadFuture<'_> {
            Box::pin(async move {
                if self.reject == Some(sensor) {
                    return Err(UploadError::Rejected {
                        status: 400,
                        message: "Unknown sensor".into(),
                    });
                }
                self.uploads.lock().unwrap().push((sensor, reading));
                Ok(())
            })
        }
    }

    fn write_fleet(name: &str, sensors: &[(MacAddress, &str)]) -> PathBuf {
        let path = temp_path(name);
        let config = FleetConfig {
            sensors: sensors
                .iter()
                .map(|(mac, name)| AuthorizedSensor {
                    mac: *mac,
                    name: name.to_string(),
                    registered_at: None,
                })
                .collect(),
        };
        config.save(&path).unwrap();
        path
    }

    fn scan_options(config: PathBuf) -> ScanOptions {
        ScanOptions {
            format: Format::Text,
            throttle: None,
            config,
            authorized_only: false,
            source: SourceOptions::default(),
        }
    }

    fn monitor_options(config: PathBuf) -> MonitorOptions {
        MonitorOptions {
            api_url: "http://localhost".to_string(),
            api_key_file: None,
            config,
            poll_period: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(6 * 60),
            format: Format::Text,
            once: true,
        }
    }

    fn upload_options(config: PathBuf) -> UploadOptions {
        UploadOptions {
            api_url: "http://localhost".to_string(),
            api_key_file: None,
            config,
            upload_period: Duration::from_secs(5 * 60),
            first_upload_after: Duration::from_secs(10),
            upload_timeout: Duration::from_secs(10),
            online_window: DEFAULT_ONLINE_WINDOW,
            format: Format::Text,
            source: SourceOptions::default(),
        }
    }

    fn fixed_clock() -> Clock {
        Arc::new(|| NOW)
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["ruuvi-fleet-monitor", "-v", "scan", "--throttle", "3s"]);
        assert!(cli.verbose);
        let Command::Scan(scan) = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(scan.throttle, Some(Duration::from_secs(3)));
        assert_eq!(scan.config, PathBuf::from(DEFAULT_FLEET_FILE));

        let cli = Cli::parse_from([
            "ruuvi-fleet-monitor",
            "monitor",
            "--api-url",
            "https://api.example.com",
            "--stale-after",
            "10m",
            "--format",
            "json",
        ]);
        let Command::Monitor(monitor) = cli.command else {
            panic!("expected monitor");
        };
        assert_eq!(monitor.stale_after, Duration::from_secs(600));
        assert_eq!(monitor.poll_period, Duration::from_secs(30));
        assert_eq!(monitor.fetch_timeout, Duration::from_secs(10));
        assert_eq!(monitor.format, Format::Json);
        assert!(!monitor.once);
    }

    #[test]
    fn cli_parses_upload() {
        let cli = Cli::parse_from([
            "ruuvi-fleet-monitor",
            "upload",
            "--api-url",
            "https://api.example.com",
            "--replay",
            "ads.jsonl",
        ]);
        let Command::Upload(upload) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(upload.upload_period, Duration::from_secs(300));
        assert_eq!(upload.first_upload_after, Duration::from_secs(10));
        assert_eq!(upload.online_window, Duration::from_secs(120));
        assert_eq!(upload.source.replay, Some(PathBuf::from("ads.jsonl")));
    }

    #[test]
    fn cli_requires_api_url_for_monitor() {
        assert!(Cli::try_parse_from(["ruuvi-fleet-monitor", "monitor"]).is_err());
    }

    #[tokio::test]
    async fn scan_writes_measurements_to_out() {
        let source = FakeSource::new(vec![
            ruuvi_advertisement(TEST_MAC, Some("Ruuvi EEFF")),
            advertisement(&[(0x004C, &[0x02, 0x15])]),
            advertisement(&[(RUUVI_MANUFACTURER_ID, &[0x03, 0x00])]),
        ]);
        let options = scan_options(temp_path("scan-no-fleet.json"));

        let mut out = Vec::<u8>::new();
        run_scan_with_io(&options, &source, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("Ruuvi EEFF (AA:BB:CC:DD:EE:FF)"));
        assert!(out.contains("24.30 °C"));
        assert!(out.ends_with('\n'));
    }

    #[tokio::test]
    async fn scan_applies_throttle() {
        let source = FakeSource::new(vec![
            ruuvi_advertisement(TEST_MAC, None),
            ruuvi_advertisement(TEST_MAC, None),
            ruuvi_advertisement(sensor(1), None),
        ]);
        let mut options = scan_options(temp_path("scan-throttle.json"));
        options.throttle = Some(Duration::from_secs(3600));

        let mut out = Vec::<u8>::new();
        run_scan_with_io(&options, &source, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        // second event from TEST_MAC falls inside the interval
        assert_eq!(out.lines().count(), 2);
    }

    #[tokio::test]
    async fn scan_authorized_only_uses_fleet_names() {
        let path = write_fleet("scan-authorized.json", &[(sensor(1), "Sauna")]);
        let source = FakeSource::new(vec![
            ruuvi_advertisement(TEST_MAC, Some("Ruuvi EEFF")),
            ruuvi_advertisement(sensor(1), Some("Ruuvi 0001")),
        ]);
        let mut options = scan_options(path.clone());
        options.authorized_only = true;
        options.format = Format::Json;

        let mut out = Vec::<u8>::new();
        let result = run_scan_with_io(&options, &source, &mut out).await;
        std::fs::remove_file(&path).unwrap();
        assert_eq!(result.unwrap(), Some(PresenceSummary { online: 1, total: 1 }));

        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 1);
        let json: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(json["name"], "Sauna");
        assert_eq!(json["device_id"], "C0:FF:EE:00:00:01");
    }

    #[tokio::test]
    async fn scan_authorized_only_counts_sensors_online() {
        let path = write_fleet(
            "scan-presence.json",
            &[(sensor(1), "Sauna"), (sensor(2), "Porch"), (sensor(3), "Attic")],
        );
        let source = FakeSource::new(vec![
            ruuvi_advertisement(sensor(1), None),
            ruuvi_advertisement(TEST_MAC, None),
            ruuvi_advertisement(sensor(3), None),
            ruuvi_advertisement(sensor(1), None),
        ]);
        let mut options = scan_options(path.clone());
        options.authorized_only = true;

        let mut out = Vec::<u8>::new();
        let result = run_scan_with_io(&options, &source, &mut out).await;
        std::fs::remove_file(&path).unwrap();

        let summary = result.unwrap().unwrap();
        assert_eq!(summary.to_string(), "2/3 online, 1 offline");
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn scan_without_authorized_only_skips_presence() {
        let source = FakeSource::new(vec![ruuvi_advertisement(TEST_MAC, None)]);
        let options = scan_options(temp_path("scan-no-presence.json"));

        let mut out = Vec::<u8>::new();
        assert_eq!(run_scan_with_io(&options, &source, &mut out).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_authorized_only_requires_fleet() {
        let source = FakeSource::new(vec![]);
        let mut options = scan_options(temp_path("scan-missing-fleet.json"));
        options.authorized_only = true;

        let mut out = Vec::<u8>::new();
        let err = run_scan_with_io(&options, &source, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::EmptyFleet(_)));
    }

    #[test]
    fn display_name_falls_back_to_device_id() {
        let measurement = classify(&ruuvi_advertisement(TEST_MAC, None))
            .into_measurement()
            .unwrap();
        assert_eq!(
            display_name(&FleetConfig::default(), &measurement),
            "AA:BB:CC:DD:EE:FF"
        );
    }

    fn register_options(config: PathBuf) -> RegisterOptions {
        RegisterOptions {
            duration: Duration::from_secs(30),
            config,
            force: false,
            source: SourceOptions::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn register_collects_distinct_sensors_until_deadline() {
        let path = temp_path("register.json");
        let source = FakeSource::live(vec![
            ruuvi_advertisement(sensor(2), Some("Ruuvi 0002")),
            ruuvi_advertisement(sensor(1), None),
            ruuvi_advertisement(sensor(2), Some("Renamed")),
            advertisement(&[(0x004C, &[0x02, 0x15])]),
        ]);

        let mut out = Vec::<u8>::new();
        let result = run_register_with_io(&register_options(path.clone()), &source, NOW, &mut out).await;
        let saved = FleetConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        let config = result.unwrap();
        assert_eq!(saved.unwrap(), config);
        let names: Vec<_> = config.sensors.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Ruuvi 0002", "C0:FF:EE:00:00:01"]);
        assert!(config.sensors.iter().all(|s| s.registered_at == Some(NOW)));
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn register_without_sensors_fails() {
        let path = temp_path("register-empty.json");
        let source = FakeSource::new(vec![advertisement(&[(0x004C, &[0x02, 0x15])])]);

        let mut out = Vec::<u8>::new();
        let err = run_register_with_io(&register_options(path.clone()), &source, NOW, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NoSensorsFound(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn register_refuses_to_overwrite_without_force() {
        let path = write_fleet("register-existing.json", &[(sensor(1), "Sauna")]);
        let source = FakeSource::new(vec![advertisement(&[(RUUVI_MANUFACTURER_ID, &SAMPLE_PAYLOAD)])]);

        let mut out = Vec::<u8>::new();
        let mut options = register_options(path.clone());
        let refused = run_register_with_io(&options, &source, NOW, &mut out).await;

        options.force = true;
        let forced = run_register_with_io(&options, &source, NOW, &mut out).await;
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            refused,
            Err(RunError::AlreadyRegistered { count: 1, .. })
        ));
        let config = forced.unwrap();
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensors[0].mac, TEST_MAC);
        assert_eq!(config.sensors[0].name, "Ruuvi EEFF");
    }

    #[tokio::test]
    async fn monitor_once_exits_by_verdict() {
        let path = write_fleet("monitor-once.json", &[(sensor(1), "Sauna"), (sensor(2), "Porch")]);
        let options = monitor_options(path.clone());

        let mut healthy = FakeStore::default();
        healthy.responses.insert(sensor(1), Ok(reading_at(NOW)));
        healthy.responses.insert(sensor(2), Ok(reading_at(NOW - time::Duration::minutes(2))));
        let mut out = Vec::<u8>::new();
        let ok = run_monitor_with_io(&options, healthy, fixed_clock(), std::future::pending(), &mut out).await;

        let mut failing = FakeStore::default();
        failing.responses.insert(sensor(1), Ok(reading_at(NOW)));
        let mut failing_out = Vec::<u8>::new();
        let not_ok = run_monitor_with_io(
            &options,
            failing,
            fixed_clock(),
            std::future::pending(),
            &mut failing_out,
        )
        .await;
        std::fs::remove_file(&path).unwrap();

        assert_eq!(ok.unwrap(), RunOutcome::Completed);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[2026-02-03 17:10:00] OK (oldest reading 2026-02-03 17:08:00)\n"
        );
        assert_eq!(not_ok.unwrap(), RunOutcome::FleetNotOk);
        assert_eq!(
            String::from_utf8(failing_out).unwrap(),
            "[2026-02-03 17:10:00] NOT OK: Porch: No readings found (oldest reading 2026-02-03 17:10:00)\n"
        );
    }

    #[tokio::test]
    async fn monitor_requires_fleet() {
        let path = write_fleet("monitor-empty.json", &[]);
        let mut out = Vec::<u8>::new();
        let result = run_monitor_with_io(
            &monitor_options(path.clone()),
            FakeStore::default(),
            fixed_clock(),
            std::future::pending(),
            &mut out,
        )
        .await;
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(RunError::EmptyFleet(_))));
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_reports_every_cycle_until_shutdown() {
        let path = write_fleet("monitor-loop.json", &[(sensor(1), "Sauna")]);
        let mut options = monitor_options(path.clone());
        options.once = false;

        let mut store = FakeStore::default();
        store.responses.insert(sensor(1), Ok(reading_at(NOW)));

        let mut out = Vec::<u8>::new();
        let shutdown = tokio::time::sleep(Duration::from_secs(65));
        let result = run_monitor_with_io(&options, store, fixed_clock(), shutdown, &mut out).await;
        std::fs::remove_file(&path).unwrap();

        assert_eq!(result.unwrap(), RunOutcome::Completed);
        // cycles at t=0, 30 and 60
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(out.lines().all(|line| line.contains("] OK")));
    }

    #[tokio::test(start_paused = true)]
    async fn upload_sends_newest_reading_per_authorized_sensor() {
        let path = write_fleet("upload-round.json", &[(sensor(1), "Sauna"), (sensor(2), "Porch")]);
        let source = FakeSource::live(vec![
            ruuvi_advertisement(sensor(2), None),
            ruuvi_advertisement(TEST_MAC, None),
            ruuvi_advertisement(sensor(1), None),
            ruuvi_advertisement(sensor(2), None),
        ]);
        let sink = FakeSink::default();

        let mut out = Vec::<u8>::new();
        let shutdown = tokio::time::sleep(Duration::from_secs(15));
        let options = upload_options(path.clone());
        let result =
            run_upload_with_io(&options, &source, &sink, fixed_clock(), shutdown, &mut out).await;
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        assert_eq!(sink.uploaded(), [sensor(1), sensor(2)]);
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("Porch (C0:FF:EE:00:00:02)"));
        assert_eq!(
            lines[3],
            "[2026-02-03 17:10:00] Uploaded 2/2 reading(s), 2/2 online"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn upload_does_not_resend_and_reports_sensors_going_offline() {
        let path = write_fleet("upload-offline.json", &[(sensor(1), "Sauna"), (sensor(2), "Porch")]);
        let source = FakeSource::live(vec![ruuvi_advertisement(sensor(1), None)]);
        let sink = FakeSink::default();

        let mut out = Vec::<u8>::new();
        // rounds at t=10s and t=310s
        let shutdown = tokio::time::sleep(Duration::from_secs(320));
        let options = upload_options(path.clone());
        let result =
            run_upload_with_io(&options, &source, &sink, fixed_clock(), shutdown, &mut out).await;
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        assert_eq!(sink.uploaded(), [sensor(1)]);
        let out = String::from_utf8(out).unwrap();
        let rounds: Vec<_> = out.lines().filter(|line| line.contains("Uploaded")).collect();
        assert_eq!(
            rounds,
            [
                "[2026-02-03 17:10:00] Uploaded 1/1 reading(s), 1/2 online, 1 offline",
                "[2026-02-03 17:10:00] Uploaded 0/0 reading(s), 0/2 online, 2 offline",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn upload_flushes_when_source_closes() {
        let path = write_fleet("upload-flush.json", &[(sensor(1), "Sauna"), (sensor(2), "Porch")]);
        let source = FakeSource::new(vec![
            ruuvi_advertisement(sensor(1), None),
            ruuvi_advertisement(sensor(2), None),
        ]);
        let sink = FakeSink {
            reject: Some(sensor(2)),
            ..Default::default()
        };

        let mut options = upload_options(path.clone());
        options.format = Format::Json;
        let mut out = Vec::<u8>::new();
        let result = run_upload_with_io(
            &options,
            &source,
            &sink,
            fixed_clock(),
            std::future::pending(),
            &mut out,
        )
        .await;
        std::fs::remove_file(&path).unwrap();

        result.unwrap();
        assert_eq!(sink.uploaded(), [sensor(1)]);
        let out = String::from_utf8(out).unwrap();
        let last: serde_json::Value = serde_json::from_str(out.lines().last().unwrap()).unwrap();
        assert_eq!(last["attempted"], 2);
        assert_eq!(last["failed"], 1);
        assert_eq!(last["presence"]["online"], 2);
    }

    #[tokio::test]
    async fn upload_requires_fleet() {
        let path = write_fleet("upload-empty.json", &[]);
        let mut out = Vec::<u8>::new();
        let result = run_upload_with_io(
            &upload_options(path.clone()),
            &FakeSource::new(vec![]),
            &FakeSink::default(),
            fixed_clock(),
            std::future::pending(),
            &mut out,
        )
        .await;
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(RunError::EmptyFleet(_))));
    }
}
