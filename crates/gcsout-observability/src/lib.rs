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

//! gcsout Observability Module
//!
//! Structured logging for upload jobs built on `tracing`.
//!
//! # Features
//!
//! - **Multiple Output Formats**: Pretty, JSON, and compact output formats
//! - **Environment-based Filtering**: level from the job config, `GCSOUT_LOG` or `RUST_LOG`,
//!   with the GCS client crates held at `warn`
//! - **Async Context Propagation**: task spans follow their futures across tokio workers
//!
//! # Example
//!
//! ```ignore
//! use gcsout_observability::{init_tracing, LogFormat};
//!
//! #[tokio::main]
//! async fn main() {
//!     init_tracing(LogFormat::Json, None)?;
//!     tracing::info!(bucket = "my-bucket", "Upload job starting");
//! }
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput, LOG_ENV_VAR, QUIET_TARGETS};
pub use initialization::{init_tracing, init_tracing_with_config};
