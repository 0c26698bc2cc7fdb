//! Human-readable output.

use crate::fleet::monitor::CycleReport;
use crate::fleet::upload::UploadReport;
use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn fmt_timestamp(at: OffsetDateTime) -> String {
    at.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// One line per measurement or report, prefixed with a UTC timestamp.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl OutputFormatter for TextFormatter {
    fn format_measurement(&self, m: &Measurement, name: &str) -> String {
        let mut line = format!(
            "[{}] {} ({}): {:.2} °C, {:.2} %, {:.2} hPa, {} mV",
            fmt_timestamp(m.captured_at),
            name,
            m.device_id,
            m.payload.temperature,
            m.payload.humidity,
            m.payload.pressure,
            m.payload.battery,
        );
        if let Some(rssi) = m.rssi {
            line.push_str(&format!(", {rssi} dBm"));
        }
        line
    }

    fn format_report(&self, report: &CycleReport) -> String {
        let verdict = &report.verdict;
        let mut line = format!("[{}] {}", fmt_timestamp(report.checked_at), verdict.status);
        if let Some(reason) = &verdict.reason {
            line.push_str(&format!(": {reason}"));
        }
        if let Some(oldest) = verdict.oldest_reading_at {
            line.push_str(&format!(" (oldest reading {})", fmt_timestamp(oldest)));
        }
        line
    }

    fn format_upload(&self, report: &UploadReport) -> String {
        format!(
            "[{}] Uploaded {}/{} reading(s), {}",
            fmt_timestamp(report.uploaded_at),
            report.sent(),
            report.attempted,
            report.presence,
        )
    }
}
