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
use crate::schema::{AuthMethod, Config, KeyFile};
use crate::validation::Validator;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).await?;
        let format = ConfigFormat::from_path(path)?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config: Config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };

        debug!("Configuration loaded from {}", format.name());

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    /// Load configuration with environment variable overrides
    ///
    /// Overrides are applied before validation so that a value supplied
    /// only through the environment still goes through every check.
    pub async fn load_with_overrides<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let mut config = ConfigLoader::without_validation().load_file(path).await?;
        self.apply_env_overrides(&mut config)?;

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides using `lookup` in place of the process environment
    pub fn apply_overrides_from<F>(&self, config: &mut Config, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Output settings
        if let Some(value) = lookup("GCSOUT_BUCKET") {
            config.output.bucket = value;
        }
        if let Some(value) = lookup("GCSOUT_PATH_PREFIX") {
            config.output.path_prefix = value;
        }
        if let Some(value) = lookup("GCSOUT_AUTH_METHOD") {
            config.output.auth_method = value.parse::<AuthMethod>().map_err(|_| {
                ConfigError::env_var_parsing_error(
                    "GCSOUT_AUTH_METHOD",
                    &value,
                    "expected one of: private_key, json_key, ambient",
                )
            })?;
        }
        if let Some(value) = lookup("GCSOUT_JSON_KEYFILE") {
            config.output.json_keyfile = Some(KeyFile::Path(PathBuf::from(value)));
        }
        if let Some(value) = lookup("GCSOUT_P12_KEYFILE_PATH") {
            config.output.p12_keyfile_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("GCSOUT_SERVICE_ACCOUNT_EMAIL") {
            config.output.service_account_email = Some(value);
        }
        if let Some(value) = lookup("GCSOUT_CHUNK_SIZE") {
            config.output.chunk_size = parse_number("GCSOUT_CHUNK_SIZE", &value)?;
        }

        // Retry settings
        if let Some(value) = lookup("GCSOUT_MAX_RETRIES") {
            config.retry.max_retries = parse_number("GCSOUT_MAX_RETRIES", &value)?;
        }

        // Performance settings
        if let Some(value) = lookup("GCSOUT_MAX_CONCURRENCY") {
            config.performance.max_concurrency = parse_number("GCSOUT_MAX_CONCURRENCY", &value)?;
        }

        // Observability settings
        if let Some(value) = lookup("GCSOUT_LOG_LEVEL") {
            config.observability.log_level = value;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number<T: FromStr>(variable_name: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::env_var_parsing_error(variable_name, value, "expected valid non-negative integer")
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(ConfigFormat::from_path("config.xml").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let loader = ConfigLoader::new();
        let toml = r#"
        [output]
        bucket = "my-bucket"
        path_prefix = "logs/out"
        file_ext = ".csv"
        auth_method = "json_key"
        json_keyfile = { content = "{}" }
        "#;
        let config = loader.load_from_string(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.output.bucket, "my-bucket");
        assert_eq!(config.output.auth_method, AuthMethod::JsonKey);
        assert_eq!(config.output.json_keyfile, Some(KeyFile::inline("{}")));
    }

    #[test]
    fn test_parse_yaml() {
        let loader = ConfigLoader::new();
        let yaml = r#"output:
  bucket: my-bucket
  auth_method: ambient
retry:
  max_retries: 4"#;
        let config = loader.load_from_string(yaml, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.output.auth_method, AuthMethod::Ambient);
        assert_eq!(config.retry.max_retries, 4);
    }

    #[test]
    fn test_validation_rejects_missing_json_key() {
        let loader = ConfigLoader::new();
        let json = r#"{"output": {"bucket": "my-bucket", "auth_method": "json_key"}}"#;
        let err = loader.load_from_string(json, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAuth(_)));
    }

    #[test]
    fn test_loader_without_validation() {
        let loader = ConfigLoader::without_validation();
        let json = r#"{"output": {"auth_method": "json_key"}}"#;
        assert!(loader.load_from_string(json, ConfigFormat::Json).is_ok());
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("GCSOUT_BUCKET", "env-bucket"),
            ("GCSOUT_AUTH_METHOD", "private_key"),
            ("GCSOUT_P12_KEYFILE_PATH", "/keys/sa.p12"),
            ("GCSOUT_SERVICE_ACCOUNT_EMAIL", "sa@p.iam.gserviceaccount.com"),
            ("GCSOUT_CHUNK_SIZE", "524288"),
            ("GCSOUT_MAX_CONCURRENCY", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        ConfigLoader::new()
            .apply_overrides_from(&mut config, |name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.output.bucket, "env-bucket");
        assert_eq!(config.output.auth_method, AuthMethod::PrivateKey);
        assert_eq!(config.output.chunk_size, 524_288);
        assert_eq!(config.performance.max_concurrency, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_override_parse_error() {
        let mut config = Config::default();
        let err = ConfigLoader::new()
            .apply_overrides_from(&mut config, |name| {
                (name == "GCSOUT_MAX_RETRIES").then(|| "many".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarParsingError { .. }));
    }
}
