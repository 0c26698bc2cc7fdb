//! JSON lines output.

use crate::fleet::monitor::CycleReport;
use crate::fleet::upload::UploadReport;
use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use log::error;
use serde::Serialize;

/// One JSON object per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

#[derive(Serialize)]
struct NamedMeasurement<'a> {
    name: &'a str,
    #[serde(flatten)]
    measurement: &'a Measurement,
}

fn to_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|err| {
        error!("Cannot serialize output: {}", err);
        String::from("{}")
    })
}

impl OutputFormatter for JsonFormatter {
    fn format_measurement(&self, measurement: &Measurement, name: &str) -> String {
        to_line(&NamedMeasurement { name, measurement })
    }

    fn format_report(&self, report: &CycleReport) -> String {
        to_line(report)
    }

    fn format_upload(&self, report: &UploadReport) -> String {
        to_line(report)
    }
}
