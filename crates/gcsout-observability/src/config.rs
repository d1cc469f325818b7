// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Configuration for structured logging.
//!
//! Output format, filter and layout switches for the subscriber installed
//! by [`crate::init_tracing_with_config`].

use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Crates whose logs are held at `warn` unless a filter names them
///
/// The GCS client stack logs every request and token refresh at `debug`,
/// which drowns per-chunk upload events.
pub const QUIET_TARGETS: &[&str] = &[
    "google_cloud_storage",
    "google_cloud_auth",
    "google_cloud_token",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
];

/// Environment variable read before `RUST_LOG`
pub const LOG_ENV_VAR: &str = "GCSOUT_LOG";

/// Errors that can occur during logging configuration
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("A global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,

    /// One line per event
    Compact,

    /// One JSON object per event, with the enclosing task span
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(format!(
                "Unknown format: {}. Expected one of: pretty, compact, json",
                s
            ))),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Write to standard error
    #[default]
    Stderr,

    /// Write to standard output
    Stdout,
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,

    /// Level (`"debug"`) or full filter (`"gcsout_core=trace,warn"`).
    /// When unset, `GCSOUT_LOG` and then `RUST_LOG` are consulted.
    pub level: Option<String>,

    /// Colored output (ignored for Json)
    pub use_color: bool,

    /// Include timestamps
    pub use_timestamps: bool,

    /// Include target module names
    pub include_targets: bool,

    /// Log span close events with their duration (one per finished task)
    pub span_timings: bool,

    /// Output destination
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Pretty,
            level: None,
            use_color: true,
            use_timestamps: true,
            include_targets: true,
            span_timings: false,
            output: LogOutput::Stderr,
        }
    }
}

impl LogConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the `[observability]` level and format
    /// strings of a job configuration file
    pub fn from_settings(level: &str, format: &str) -> Result<Self, LogError> {
        let format: LogFormat = format.parse()?;
        Ok(LogConfig::new()
            .with_format(format)
            .with_level(level)
            .with_span_timings(format == LogFormat::Json))
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    pub fn with_targets(mut self, include_targets: bool) -> Self {
        self.include_targets = include_targets;
        self
    }

    pub fn with_span_timings(mut self, span_timings: bool) -> Self {
        self.span_timings = span_timings;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Filter directives the subscriber is built with
    ///
    /// A bare level such as `"debug"` is applied to everything except
    /// [`QUIET_TARGETS`], which stay at `warn`. A value containing `=` or
    /// `,` is a full filter and is used verbatim.
    pub fn effective_filter(&self) -> String {
        let configured = self
            .level
            .clone()
            .or_else(|| std::env::var(LOG_ENV_VAR).ok())
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        if configured.contains('=') || configured.contains(',') {
            return configured;
        }

        let mut filter = configured;
        for target in QUIET_TARGETS {
            filter.push_str(&format!(",{}=warn", target));
        }
        filter
    }
}
