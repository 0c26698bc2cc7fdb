//! Output formatters for measurements and fleet reports.
//!
//! This module provides a trait for formatting what the CLI prints (readings,
//! poll cycle verdicts and upload rounds) and
//! implementations for human-readable text and JSON lines.

pub mod json;
pub mod text;

use crate::fleet::monitor::CycleReport;
use crate::fleet::upload::UploadReport;
use crate::measurement::Measurement;
use clap::ValueEnum;

/// Trait for formatting measurements and cycle reports into output lines.
pub trait OutputFormatter: Send + Sync {
    /// Format a measurement.
    ///
    /// # Arguments
    /// * `measurement` - The measurement data to format
    /// * `name` - Human-readable name for the device
    fn format_measurement(&self, measurement: &Measurement, name: &str) -> String;

    /// Format the report of one completed poll cycle.
    fn format_report(&self, report: &CycleReport) -> String;

    /// Format the summary of one upload round.
    fn format_upload(&self, report: &UploadReport) -> String;
}

/// Output format selectable on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Text,
    Json,
}

impl Format {
    pub fn formatter(self) -> Box<dyn OutputFormatter> {
        match self {
            Format::Text => Box::new(text::TextFormatter),
            Format::Json => Box::new(json::JsonFormatter),
        }
    }
}
