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
use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;
use crate::sequence;

/// Validator for configuration settings
pub trait Validator {
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.output.validate()?;
        self.retry.validate()?;
        self.performance.validate()?;
        self.job.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for OutputConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_auth(self)?;

        if self.bucket.is_empty() {
            return Err(ConfigError::MissingRequired("output.bucket".to_string()));
        }

        // GCS bucket names must be 3-63 characters long
        if self.bucket.len() < 3 || self.bucket.len() > 63 {
            return Err(ConfigError::invalid_value(
                "output.bucket",
                "bucket name must be 3-63 characters long",
            ));
        }

        if !self.bucket.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' || c == '.'
        }) {
            return Err(ConfigError::invalid_value(
                "output.bucket",
                "bucket name must contain only lowercase letters, digits, hyphens, underscores, and dots",
            ));
        }

        if self.chunk_size == 0 || self.chunk_size % CHUNK_QUANTUM != 0 {
            return Err(ConfigError::invalid_value(
                "output.chunk_size",
                format!(
                    "must be a positive multiple of {} bytes, got {}",
                    CHUNK_QUANTUM, self.chunk_size
                ),
            ));
        }

        if self.content_type.is_empty() {
            return Err(ConfigError::MissingRequired(
                "output.content_type".to_string(),
            ));
        }

        sequence::render(&self.sequence_format, &[0, 0])?;

        Ok(())
    }
}

/// Check that exactly one credential variant is fully specified
///
/// Runs before any key file is read.
pub fn validate_auth(output: &OutputConfig) -> ConfigResult<()> {
    if output.p12_keyfile_path.is_some() && output.p12_keyfile.is_some() {
        return Err(ConfigError::ConflictingValues(
            "Setting both p12_keyfile_path and p12_keyfile is invalid".to_string(),
        ));
    }

    let has_p12 = output.p12_keyfile_path.is_some() || output.p12_keyfile.is_some();
    if output.json_keyfile.is_some() && has_p12 {
        return Err(ConfigError::ConflictingValues(
            "Setting both json_keyfile and p12_keyfile is invalid".to_string(),
        ));
    }

    match output.auth_method {
        AuthMethod::JsonKey => {
            if output.json_keyfile.is_none() {
                return Err(ConfigError::invalid_auth(
                    "If auth_method is json_key, you have to set json_keyfile",
                ));
            }
        }
        AuthMethod::PrivateKey => {
            let has_email = output
                .service_account_email
                .as_deref()
                .is_some_and(|email| !email.is_empty());
            if !has_p12 || !has_email {
                return Err(ConfigError::invalid_auth(
                    "If auth_method is private_key, you have to set both service_account_email and p12_keyfile",
                ));
            }
        }
        AuthMethod::Ambient => {}
    }

    Ok(())
}

impl Validator for RetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.initial_retry_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "retry.initial_retry_interval_ms",
                "must be greater than 0",
            ));
        }

        if self.max_retry_interval_ms < self.initial_retry_interval_ms {
            return Err(ConfigError::invalid_value(
                "retry.max_retry_interval_ms",
                format!(
                    "must be at least initial_retry_interval_ms ({}), got {}",
                    self.initial_retry_interval_ms, self.max_retry_interval_ms
                ),
            ));
        }

        Ok(())
    }
}

impl Validator for PerformanceConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid_value(
                "performance.max_concurrency",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Validator for JobConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.min_succeeded == Some(0) {
            return Err(ConfigError::invalid_value(
                "job.min_succeeded",
                "must be greater than 0 when set",
            ));
        }

        Ok(())
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn json_key_output() -> OutputConfig {
        OutputConfig {
            bucket: "my-bucket".to_string(),
            auth_method: AuthMethod::JsonKey,
            json_keyfile: Some(KeyFile::Path(PathBuf::from("/keys/sa.json"))),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_json_key_output() {
        assert!(json_key_output().validate().is_ok());
    }

    #[test]
    fn test_json_key_without_keyfile() {
        let mut output = json_key_output();
        output.json_keyfile = None;
        let err = output.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAuth(_)));
        assert!(err
            .to_string()
            .contains("If auth_method is json_key, you have to set json_keyfile"));
    }

    #[test]
    fn test_both_p12_sources_conflict() {
        let output = OutputConfig {
            bucket: "my-bucket".to_string(),
            auth_method: AuthMethod::PrivateKey,
            p12_keyfile_path: Some(PathBuf::from("/keys/sa.p12")),
            p12_keyfile: Some(KeyFile::inline("AAAA")),
            service_account_email: Some("sa@project.iam.gserviceaccount.com".to_string()),
            ..Default::default()
        };
        let err = output.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("Setting both p12_keyfile_path and p12_keyfile is invalid"));
    }

    #[test]
    fn test_json_and_p12_conflict_for_every_method() {
        for method in [AuthMethod::JsonKey, AuthMethod::PrivateKey, AuthMethod::Ambient] {
            let output = OutputConfig {
                bucket: "my-bucket".to_string(),
                auth_method: method,
                json_keyfile: Some(KeyFile::inline("{}")),
                p12_keyfile: Some(KeyFile::inline("AAAA")),
                service_account_email: Some("sa@project.iam.gserviceaccount.com".to_string()),
                ..Default::default()
            };
            assert!(matches!(
                output.validate(),
                Err(ConfigError::ConflictingValues(_))
            ));
        }
    }

    #[test]
    fn test_private_key_requires_email() {
        let output = OutputConfig {
            bucket: "my-bucket".to_string(),
            auth_method: AuthMethod::PrivateKey,
            p12_keyfile_path: Some(PathBuf::from("/keys/sa.p12")),
            service_account_email: None,
            ..Default::default()
        };
        let err = output.validate().unwrap_err();
        assert!(err.to_string().contains(
            "If auth_method is private_key, you have to set both service_account_email and p12_keyfile"
        ));

        let empty_email = OutputConfig {
            service_account_email: Some(String::new()),
            ..output
        };
        assert!(empty_email.validate().is_err());
    }

    #[test]
    fn test_private_key_requires_p12() {
        let output = OutputConfig {
            bucket: "my-bucket".to_string(),
            auth_method: AuthMethod::PrivateKey,
            service_account_email: Some("sa@project.iam.gserviceaccount.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(output.validate(), Err(ConfigError::InvalidAuth(_))));
    }

    #[test]
    fn test_ambient_needs_no_material() {
        let output = OutputConfig {
            bucket: "my-bucket".to_string(),
            auth_method: AuthMethod::Ambient,
            ..Default::default()
        };
        assert!(output.validate().is_ok());
    }

    #[test]
    fn test_bucket_rules() {
        let mut output = json_key_output();
        output.bucket = String::new();
        assert!(matches!(output.validate(), Err(ConfigError::MissingRequired(_))));

        output.bucket = "ab".to_string();
        assert!(output.validate().is_err());

        output.bucket = "My-Bucket".to_string();
        assert!(output.validate().is_err());

        output.bucket = "logs_2026.example-bucket".to_string();
        assert!(output.validate().is_ok());
    }

    #[test]
    fn test_chunk_size_must_be_quantum_multiple() {
        let mut output = json_key_output();
        output.chunk_size = 0;
        assert!(output.validate().is_err());

        output.chunk_size = CHUNK_QUANTUM + 1;
        assert!(output.validate().is_err());

        output.chunk_size = 4 * CHUNK_QUANTUM;
        assert!(output.validate().is_ok());
    }

    #[test]
    fn test_bad_sequence_format() {
        let mut output = json_key_output();
        output.sequence_format = ".%s".to_string();
        assert!(output.validate().is_err());

        output.sequence_format = ".%0100000000d".to_string();
        assert!(output.validate().is_err());
    }

    #[test]
    fn test_retry_interval_ordering() {
        let retry = RetryConfig {
            max_retries: 3,
            initial_retry_interval_ms: 1000,
            max_retry_interval_ms: 10,
        };
        assert!(retry.validate().is_err());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency() {
        let perf = PerformanceConfig { max_concurrency: 0 };
        assert!(perf.validate().is_err());
    }

    #[test]
    fn test_observability_values() {
        let mut obs = ObservabilityConfig::default();
        assert!(obs.validate().is_ok());
        obs.log_level = "loud".to_string();
        assert!(obs.validate().is_err());
        obs.log_level = "debug".to_string();
        obs.log_format = "xml".to_string();
        assert!(obs.validate().is_err());
    }
}
