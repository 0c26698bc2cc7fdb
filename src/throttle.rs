//! Per-sensor throttling and duration parsing for the CLI.
//!
//! Tags broadcast roughly once a second; [`Throttle`] limits how often a
//! single device makes it to the output.

use crate::mac_address::MacAddress;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// At most one event per device per `interval`.
///
/// The first event for a device always passes. Blocked events do not reset
/// the device's timer.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emitted: HashMap<MacAddress, Instant>,
}

impl Throttle {
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use ruuvi_fleet_monitor::throttle::Throttle;
    ///
    /// let throttle = Throttle::new(Duration::from_secs(3));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    /// Check whether an event from `device` may be emitted now.
    pub fn should_emit(&mut self, device: MacAddress) -> bool {
        self.should_emit_at(device, Instant::now())
    }

    /// Same as [`should_emit`](Self::should_emit) with an explicit clock
    /// reading.
    pub fn should_emit_at(&mut self, device: MacAddress, now: Instant) -> bool {
        match self.last_emitted.get(&device) {
            Some(last) if now.saturating_duration_since(*last) < self.interval => false,
            _ => {
                self.last_emitted.insert(device, now);
                true
            }
        }
    }
}

/// Parse a duration such as `500ms`, `30s`, `6m`, `1h`, or bare seconds.
///
/// # Examples
/// ```
/// use ruuvi_fleet_monitor::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("6m").unwrap(), Duration::from_secs(360));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s".
    let units: [(&str, u64, fn(u64) -> Duration); 4] = [
        ("ms", 1, Duration::from_millis),
        ("h", 3600, Duration::from_secs),
        ("m", 60, Duration::from_secs),
        ("s", 1, Duration::from_secs),
    ];

    for (suffix, factor, build) in units {
        if let Some(num) = src.strip_suffix(suffix) {
            let value: u64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid duration: {}", src))?;
            let scaled = value
                .checked_mul(factor)
                .ok_or_else(|| format!("duration too large: {}", src))?;
            return Ok(build(scaled));
        }
    }

    src.parse()
        .map(Duration::from_secs)
        .map_err(|_| format!("invalid duration: {}", src))
}
