/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogLevel;
use crate::error::{CopyError, CopyResult};

/// Where and how verbosely to log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,

    /// JSON log file; compact stdout logging when unset
    pub file: Option<PathBuf>,

    /// Force debug level
    pub verbose: bool,
}

impl LogSettings {
    pub fn effective_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            self.level.to_tracing_level()
        }
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        format!("stratus={}", self.effective_level())
    }
}

/// Initialize structured logging
pub fn init_logging(settings: &LogSettings) -> CopyResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(settings.default_directive()))
        .map_err(|e| CopyError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = settings.file {
        init_file_logging(log_path, env_filter)
    } else {
        init_stdout_logging(env_filter)
    }
}

fn init_stdout_logging(env_filter: EnvFilter) -> CopyResult<()> {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| CopyError::Config(format!("Failed to install logger: {}", e)))
}

fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> CopyResult<()> {
    let file = File::create(log_path)
        .map_err(|e| CopyError::Config(format!("Failed to create log file: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| CopyError::Config(format!("Failed to install logger: {}", e)))
}
