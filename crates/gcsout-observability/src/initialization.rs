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

//! Logging initialization and setup.

use crate::config::{LogConfig, LogError, LogFormat, LogOutput};
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize tracing with the specified format and optional level.
///
/// # Example
///
/// ```ignore
/// use gcsout_observability::{init_tracing, LogFormat};
///
/// #[tokio::main]
/// async fn main() {
///     init_tracing(LogFormat::Compact, Some("gcsout_core=debug,info")).unwrap();
///     tracing::info!("Upload job starting");
/// }
/// ```
pub fn init_tracing(format: LogFormat, level: Option<&str>) -> Result<(), LogError> {
    let mut config = LogConfig::new().with_format(format);
    if let Some(level) = level {
        config = config.with_level(level);
    }
    init_tracing_with_config(&config)
}

/// Install the global subscriber described by `config`.
///
/// Libraries in this workspace never call this; the host binary does, once.
/// A second call returns [`LogError::AlreadyInitialized`].
pub fn init_tracing_with_config(config: &LogConfig) -> Result<(), LogError> {
    let filter = build_env_filter(config)?;

    Registry::default()
        .with(fmt_layer(config))
        .with(filter)
        .try_init()
        .map_err(|e| LogError::AlreadyInitialized(e.to_string()))
}

fn fmt_layer(config: &LogConfig) -> BoxedLayer {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(writer(config.output))
        .with_target(config.include_targets)
        .with_span_events(span_events);

    match (config.format, config.use_timestamps) {
        (LogFormat::Pretty, true) => base.pretty().with_ansi(config.use_color).boxed(),
        (LogFormat::Pretty, false) => base.pretty().with_ansi(config.use_color).without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().with_ansi(config.use_color).boxed(),
        (LogFormat::Compact, false) => base.compact().with_ansi(config.use_color).without_time().boxed(),
        (LogFormat::Json, true) => base.json().with_current_span(true).boxed(),
        (LogFormat::Json, false) => base.json().with_current_span(true).without_time().boxed(),
    }
}

fn writer(output: LogOutput) -> fn() -> Box<dyn io::Write + Send> {
    match output {
        LogOutput::Stderr => || Box::new(io::stderr()),
        LogOutput::Stdout => || Box::new(io::stdout()),
    }
}

fn build_env_filter(config: &LogConfig) -> Result<EnvFilter, LogError> {
    let filter = config.effective_filter();

    EnvFilter::try_new(&filter).map_err(|e| LogError::InvalidFilter {
        reason: e.to_string(),
        filter,
    })
}
