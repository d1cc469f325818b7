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

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default upload chunk size (16 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Non-final chunks of a resumable upload must be a multiple of this size
pub const CHUNK_QUANTUM: usize = 256 * 1024;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Destination bucket, object naming and credentials
    pub output: OutputConfig,

    /// Chunk retry and backoff settings
    pub retry: RetryConfig,

    /// Performance tuning
    pub performance: PerformanceConfig,

    /// Job-level outcome policy
    pub job: JobConfig,

    /// Observability settings
    pub observability: ObservabilityConfig,
}

/// Authentication mode used to build the storage client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// PKCS12 key blob plus service account email
    #[default]
    PrivateKey,

    /// Service account JSON key
    JsonKey,

    /// Application default credentials (metadata server, gcloud, env)
    #[serde(alias = "compute_engine")]
    Ambient,
}

impl AuthMethod {
    /// Configuration spelling of this method
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::PrivateKey => "private_key",
            AuthMethod::JsonKey => "json_key",
            AuthMethod::Ambient => "ambient",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private_key" => Ok(AuthMethod::PrivateKey),
            "json_key" => Ok(AuthMethod::JsonKey),
            "ambient" | "compute_engine" => Ok(AuthMethod::Ambient),
            other => Err(ConfigError::invalid_value(
                "output.auth_method",
                format!(
                    "unknown auth method '{}', expected one of: private_key, json_key, ambient",
                    other
                ),
            )),
        }
    }
}

/// Key material given either as a path or inline
///
/// In TOML a plain string is a path, a table with `content` is inline:
///
/// ```toml
/// json_keyfile = "/etc/keys/sa.json"
/// p12_keyfile = { content = "MIIJ..." }
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum KeyFile {
    /// Read from this local path
    Path(PathBuf),

    /// Inline content. JSON keys are raw JSON text, PKCS12 keys are base64.
    Inline {
        /// Key payload
        content: String,
    },
}

impl KeyFile {
    /// Shorthand for [`KeyFile::Inline`]
    pub fn inline(content: impl Into<String>) -> Self {
        KeyFile::Inline {
            content: content.into(),
        }
    }
}

impl fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFile::Path(path) => f.debug_tuple("Path").field(path).finish(),
            KeyFile::Inline { .. } => f.debug_struct("Inline").field("content", &"<redacted>").finish(),
        }
    }
}

/// Destination and credential settings for the upload job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Target bucket name
    #[serde(default)]
    pub bucket: String,

    /// Prefix prepended to every object key
    #[serde(default)]
    pub path_prefix: String,

    /// Suffix appended to every object key (e.g. ".csv.gz")
    #[serde(default)]
    pub file_ext: String,

    /// printf-style format rendered with (task index, file index)
    #[serde(default = "default_sequence_format")]
    pub sequence_format: String,

    /// Content type stored on uploaded objects
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Authentication mode
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Service account JSON key (path or inline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_keyfile: Option<KeyFile>,

    /// Path to a PKCS12 key file. Mutually exclusive with `p12_keyfile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p12_keyfile_path: Option<PathBuf>,

    /// PKCS12 key (path or inline base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p12_keyfile: Option<KeyFile>,

    /// Service account email, required with `private_key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_email: Option<String>,

    /// Upload chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Delete existing objects under `path_prefix` before any task runs
    #[serde(default)]
    pub delete_in_advance: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            bucket: String::new(),
            path_prefix: String::new(),
            file_ext: String::new(),
            sequence_format: default_sequence_format(),
            content_type: default_content_type(),
            auth_method: AuthMethod::default(),
            json_keyfile: None,
            p12_keyfile_path: None,
            p12_keyfile: None,
            service_account_email: None,
            chunk_size: default_chunk_size(),
            delete_in_advance: false,
        }
    }
}

/// Retry and backoff settings for chunk writes and session calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt before a chunk write fails the task
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(default = "default_initial_retry_interval_ms")]
    pub initial_retry_interval_ms: u64,

    /// Upper bound for the doubling backoff
    #[serde(default = "default_max_retry_interval_ms")]
    pub max_retry_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: default_max_retries(),
            initial_retry_interval_ms: default_initial_retry_interval_ms(),
            max_retry_interval_ms: default_max_retry_interval_ms(),
        }
    }
}

/// Performance tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerformanceConfig {
    /// Maximum number of tasks uploading at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Job-level outcome policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JobConfig {
    /// Succeed the job once at least this many tasks committed.
    /// When unset every task must commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_succeeded: Option<usize>,
}

/// Observability settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_sequence_format() -> String {
    ".%03d.%02d".to_string()
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_retry_interval_ms() -> u64 {
    500
}

fn default_max_retry_interval_ms() -> u64 {
    30_000
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_output_defaults() {
        let output = OutputConfig::default();
        assert_eq!(output.sequence_format, ".%03d.%02d");
        assert_eq!(output.content_type, "application/octet-stream");
        assert_eq!(output.auth_method, AuthMethod::PrivateKey);
        assert_eq!(output.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(output.chunk_size % CHUNK_QUANTUM, 0);
    }

    #[test]
    fn test_auth_method_from_str() {
        assert_eq!("json_key".parse::<AuthMethod>().unwrap(), AuthMethod::JsonKey);
        assert_eq!(
            "compute_engine".parse::<AuthMethod>().unwrap(),
            AuthMethod::Ambient
        );
        assert!("oauth".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn test_key_file_untagged() {
        let path: KeyFile = serde_json::from_str(r#""/etc/key.json""#).unwrap();
        assert_eq!(path, KeyFile::Path(PathBuf::from("/etc/key.json")));

        let inline: KeyFile = serde_json::from_str(r#"{"content": "{}"}"#).unwrap();
        assert_eq!(inline, KeyFile::inline("{}"));
    }

    #[test]
    fn test_inline_key_is_redacted_in_debug() {
        let key = KeyFile::inline("super-secret");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_compute_engine_alias() {
        let output: OutputConfig =
            serde_json::from_str(r#"{"bucket": "b", "auth_method": "compute_engine"}"#).unwrap();
        assert_eq!(output.auth_method, AuthMethod::Ambient);
    }
}
