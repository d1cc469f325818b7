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
//! Configuration management for gcsout
//!
//! This crate defines the configuration of an upload job and checks it before
//! anything else happens. A configuration that fails validation never reaches
//! the point where a task is scheduled or a key file is read.
//!
//! # Features
//!
//! - Multi-format configuration support (TOML, YAML, JSON)
//! - Environment variable overrides with `GCSOUT_` prefix
//! - Fail-fast credential checks (`auth_method` versus supplied key material)
//! - Object naming through printf-style `sequence_format` strings
//!
//! # Example
//!
//! ```no_run
//! use gcsout_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader.load_with_overrides("gcsout.toml").await?;
//!
//!     println!("Uploading to bucket: {}", config.output.bucket);
//!     println!("Auth method: {}", config.output.auth_method);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod sequence;
pub mod validation;

// Re-export commonly used items
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::{validate_auth, Validator};
