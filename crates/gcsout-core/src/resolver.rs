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

//! Credential resolution
//!
//! Turns the `[output]` authentication settings into a [`Credential`].
//! Key files are read here and nowhere else, once per job. Nothing in this
//! module talks to the network: a credential that parses but is rejected by
//! GCS surfaces later, when the coordinator connects.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gcsout_config::{validate_auth, AuthMethod, ConfigError, ConfigResult, KeyFile, OutputConfig};
use gcsout_storage::Credential;
use std::path::Path;
use tracing::debug;

/// Resolves configured authentication settings into a credential
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialResolver;

impl CredentialResolver {
    pub fn new() -> Self {
        CredentialResolver
    }

    /// Validate the credential settings of `output` and load the key material
    pub async fn resolve(&self, output: &OutputConfig) -> ConfigResult<Credential> {
        validate_auth(output)?;

        let credential = match output.auth_method {
            AuthMethod::JsonKey => {
                let key = output.json_keyfile.as_ref().ok_or_else(|| {
                    ConfigError::invalid_auth("If auth_method is json_key, you have to set json_keyfile")
                })?;
                let json = match key {
                    KeyFile::Path(path) => read_key_file(path).await?,
                    KeyFile::Inline { content } => content.clone().into_bytes(),
                };

                serde_json::from_slice::<serde_json::Value>(&json).map_err(|e| {
                    ConfigError::invalid_value(
                        "output.json_keyfile",
                        format!("key is not valid JSON: {}", e),
                    )
                })?;
                Credential::JsonKey(json)
            }
            AuthMethod::PrivateKey => {
                let pkcs12 = match (&output.p12_keyfile_path, &output.p12_keyfile) {
                    (Some(path), None) | (None, Some(KeyFile::Path(path))) => read_key_file(path).await?,
                    (None, Some(KeyFile::Inline { content })) => decode_inline_p12(content)?,
                    _ => {
                        return Err(ConfigError::invalid_auth(
                            "If auth_method is private_key, you have to set both service_account_email and p12_keyfile",
                        ))
                    }
                };
                let account_email = output.service_account_email.clone().unwrap_or_default();
                Credential::PrivateKey {
                    pkcs12,
                    account_email,
                }
            }
            AuthMethod::Ambient => Credential::Ambient,
        };

        debug!(
            auth_method = %output.auth_method,
            credential = ?credential,
            "Resolved credential"
        );
        Ok(credential)
    }
}

async fn read_key_file(path: &Path) -> ConfigResult<Vec<u8>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::key_file_unreadable(path, e.to_string()))?;

    if bytes.is_empty() {
        return Err(ConfigError::key_file_unreadable(path, "file is empty"));
    }
    Ok(bytes)
}

fn decode_inline_p12(content: &str) -> ConfigResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact.as_bytes()).map_err(|e| {
        ConfigError::invalid_value(
            "output.p12_keyfile",
            format!("inline PKCS12 content must be base64: {}", e),
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn output(method: AuthMethod) -> OutputConfig {
        OutputConfig {
            bucket: "bucket".to_string(),
            auth_method: method,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_inline_json_key() {
        let mut config = output(AuthMethod::JsonKey);
        config.json_keyfile = Some(KeyFile::inline(r#"{"type": "service_account"}"#));

        let credential = CredentialResolver::new().resolve(&config).await.unwrap();
        assert!(matches!(credential, Credential::JsonKey(ref json) if json.starts_with(b"{")));
    }

    #[tokio::test]
    async fn test_json_key_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"type": "service_account", "client_email": "a@b"}"#).unwrap();

        let mut config = output(AuthMethod::JsonKey);
        config.json_keyfile = Some(KeyFile::Path(file.path().to_path_buf()));

        let credential = CredentialResolver::new().resolve(&config).await.unwrap();
        assert_eq!(credential.kind(), "json_key");
    }

    #[tokio::test]
    async fn test_json_key_must_parse() {
        let mut config = output(AuthMethod::JsonKey);
        config.json_keyfile = Some(KeyFile::inline("not json"));

        let err = CredentialResolver::new().resolve(&config).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "output.json_keyfile"));
    }

    #[tokio::test]
    async fn test_missing_key_file_names_path() {
        let mut config = output(AuthMethod::JsonKey);
        config.json_keyfile = Some(KeyFile::Path("/nonexistent/gcsout/key.json".into()));

        let err = CredentialResolver::new().resolve(&config).await.unwrap_err();
        assert!(matches!(err, ConfigError::KeyFileUnreadable { .. }));
        assert!(err.to_string().contains("/nonexistent/gcsout/key.json"));
    }

    #[tokio::test]
    async fn test_private_key_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x30, 0x82, 0x01, 0x00]).unwrap();

        let mut config = output(AuthMethod::PrivateKey);
        config.p12_keyfile_path = Some(file.path().to_path_buf());
        config.service_account_email = Some("sa@project.iam.gserviceaccount.com".to_string());

        let credential = CredentialResolver::new().resolve(&config).await.unwrap();
        assert_eq!(
            credential,
            Credential::PrivateKey {
                pkcs12: vec![0x30, 0x82, 0x01, 0x00],
                account_email: "sa@project.iam.gserviceaccount.com".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_private_key_inline_base64() {
        let mut config = output(AuthMethod::PrivateKey);
        config.p12_keyfile = Some(KeyFile::inline("MIIB\nAA=="));
        config.service_account_email = Some("sa@example.com".to_string());

        let credential = CredentialResolver::new().resolve(&config).await.unwrap();
        let Credential::PrivateKey { pkcs12, .. } = credential else {
            panic!("expected private key credential");
        };
        assert_eq!(pkcs12, STANDARD.decode("MIIBAA==").unwrap());
    }

    #[tokio::test]
    async fn test_private_key_inline_not_base64() {
        let mut config = output(AuthMethod::PrivateKey);
        config.p12_keyfile = Some(KeyFile::inline("%%%"));
        config.service_account_email = Some("sa@example.com".to_string());

        let err = CredentialResolver::new().resolve(&config).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_private_key_requires_email() {
        let mut config = output(AuthMethod::PrivateKey);
        config.p12_keyfile = Some(KeyFile::inline("MIIBAA=="));

        let err = CredentialResolver::new().resolve(&config).await.unwrap_err();
        assert!(err.to_string().contains(
            "If auth_method is private_key, you have to set both service_account_email and p12_keyfile"
        ));
    }

    #[tokio::test]
    async fn test_conflicting_material_rejected_before_reading() {
        let mut config = output(AuthMethod::JsonKey);
        config.json_keyfile = Some(KeyFile::Path("/nonexistent/key.json".into()));
        config.p12_keyfile = Some(KeyFile::inline("MIIBAA=="));

        let err = CredentialResolver::new().resolve(&config).await.unwrap_err();
        assert!(err.to_string().contains("Setting both json_keyfile and p12_keyfile is invalid"));
    }

    #[tokio::test]
    async fn test_ambient() {
        let credential = CredentialResolver::new()
            .resolve(&output(AuthMethod::Ambient))
            .await
            .unwrap();
        assert_eq!(credential, Credential::Ambient);
    }
}
