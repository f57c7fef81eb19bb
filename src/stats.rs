/*!
 * Run summary
 */

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::core::strategy::TransferStrategy;
use crate::core::transfer::CopyOutcome;

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    /// Objects copied
    pub copied: u64,

    /// Source success markers skipped during the bulk pass
    pub skipped_markers: u64,

    /// Objects left out by the manifest filter
    pub filtered_out: u64,

    pub bytes_copied: u64,

    /// Objects that went through a multipart session
    pub multipart_objects: u64,

    /// A destination success marker was written
    pub marker_written: bool,

    /// The source carried a success marker
    pub source_had_marker: bool,

    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl CopyReport {
    /// Account for one copied object
    pub fn record(&mut self, outcome: &CopyOutcome) {
        self.copied += 1;
        self.bytes_copied += outcome.bytes;
        if outcome.strategy == TransferStrategy::Multipart {
            self.multipart_objects += 1;
        }
    }

    /// Average throughput in bytes per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Copied:            {}", self.copied)?;
        writeln!(f, "  multipart:       {}", self.multipart_objects)?;
        writeln!(f, "Skipped markers:   {}", self.skipped_markers)?;
        writeln!(f, "Filtered out:      {}", self.filtered_out)?;
        writeln!(f, "Data transferred:  {}", format_bytes(self.bytes_copied))?;
        writeln!(
            f,
            "Success marker:    {}",
            if self.marker_written { "written" } else { "not written" }
        )?;
        writeln!(
            f,
            "Duration:          {}",
            format_duration(self.elapsed.as_millis() as u64)
        )?;
        write!(
            f,
            "Average speed:     {}/s",
            format_bytes(self.throughput() as u64)
        )
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Format bytes into human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let base = 1024.0_f64;
    let exp = (bytes_f.ln() / base.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f / base.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.2} {}", value, UNITS[exp])
    }
}

/// Format duration into human-readable format
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }

    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}.{}s", seconds, (ms % 1000) / 100)
    }
}
