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

//! Google Cloud Storage object store
//!
//! Implements [`ObjectStore`] on top of the GCS JSON API resumable upload
//! protocol:
//! - A session is created with `prepare_resumable_upload`; its URI is the
//!   session id
//! - Intermediate chunks are sent without a total size and must be a
//!   multiple of 256 KiB
//! - The final chunk carries the total size, which finalizes the object
//! - `status` reports how many bytes GCS has persisted, so a caller can
//!   resume after a lost response
//!
//! Session setup, queries, deletes and listing are retried on transient
//! failures with the configured [`RetryPolicy`]. Chunk writes are not: the
//! upload engine re-queries the persisted offset before resending.
//!
//! # Examples
//!
//! ```rust,no_run
//! use gcsout_storage::{Credential, GcsConnector, RetryPolicy, StoreConnector};
//!
//! #[tokio::main]
//! async fn main() -> gcsout_storage::StorageResult<()> {
//!     let key = std::fs::read("service-account.json")?;
//!     let store = GcsConnector::new(RetryPolicy::default())
//!         .connect(&Credential::JsonKey(key))
//!         .await?;
//!
//!     let names = store.list_objects("my-bucket", "exports/").await?;
//!     println!("{} objects", names.len());
//!     Ok(())
//! }
//! ```

use crate::credential::Credential;
use crate::error::{StorageError, StorageResult};
use crate::retry::RetryPolicy;
use crate::{ObjectStore, ObjectTarget, RemoteObject, StoreConnector, UploadProgress, UploadSessionId};
use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_auth::credentials::CredentialsFile;
use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::objects::Object;
use google_cloud_storage::http::resumable_upload_client::{
    ChunkSize, ResumableUploadClient, UploadStatus,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Creates [`GcsStore`] clients from resolved credentials
#[derive(Debug, Clone, Default)]
pub struct GcsConnector {
    retry: RetryPolicy,
}

impl GcsConnector {
    /// Connector whose stores retry with `retry`
    pub fn new(retry: RetryPolicy) -> Self {
        GcsConnector { retry }
    }
}

#[async_trait]
impl StoreConnector for GcsConnector {
    async fn connect(&self, credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>> {
        let store = GcsStore::connect(credential, self.retry).await?;
        Ok(Arc::new(store))
    }
}

/// GCS client plus the resumable sessions it has opened
#[derive(Clone)]
pub struct GcsStore {
    client: Arc<GcsClient>,
    sessions: Arc<Mutex<HashMap<String, ResumableUploadClient>>>,
    retry: RetryPolicy,
}

impl GcsStore {
    /// Build an authenticated client for `credential`
    ///
    /// JSON and PKCS12 keys are handed to the client as a service account
    /// key; [`Credential::Ambient`] uses application default credentials.
    pub async fn connect(credential: &Credential, retry: RetryPolicy) -> StorageResult<Self> {
        let client_config = match credential.service_account_json()? {
            Some(json) => {
                let cred: CredentialsFile = serde_json::from_slice(&json).map_err(|e| {
                    StorageError::invalid_credential(format!(
                        "failed to parse service account credentials: {}",
                        e
                    ))
                })?;

                ClientConfig::default().with_credentials(cred).await.map_err(|e| {
                    StorageError::unauthenticated(format!("failed to create client config: {}", e))
                })?
            }
            None => ClientConfig::default().with_auth().await.map_err(|e| {
                StorageError::unauthenticated(format!(
                    "failed to create GCS client with application default credentials: {}",
                    e
                ))
            })?,
        };

        debug!(credential = credential.kind(), "Initialized GCS client");

        Ok(GcsStore {
            client: Arc::new(GcsClient::new(client_config)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            retry,
        })
    }

    async fn session(&self, session: &UploadSessionId) -> StorageResult<ResumableUploadClient> {
        self.sessions
            .lock()
            .await
            .get(session.as_str())
            .cloned()
            .ok_or_else(|| StorageError::session_not_found(session.to_string()))
    }

    async fn forget(&self, session: &UploadSessionId) {
        self.sessions.lock().await.remove(session.as_str());
    }
}

impl fmt::Debug for GcsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsStore")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Map a GCS client error onto the storage taxonomy
///
/// The client surfaces HTTP status codes only through its error text, so
/// classification matches on the rendered message.
pub fn classify_error(context: &str, message: &str) -> StorageError {
    let msg = format!("{}: {}", context, message);
    let lower = message.to_ascii_lowercase();

    if lower.contains("401") || lower.contains("unauthorized") || lower.contains("invalid_grant") || lower.contains("token source") {
        StorageError::unauthenticated(msg)
    } else if lower.contains("403") || lower.contains("forbidden") {
        StorageError::permission_denied(msg)
    } else if lower.contains("404") || lower.contains("410") || lower.contains("not found") {
        StorageError::not_found(msg)
    } else if ["408", "429", "500", "502", "503", "504"].iter().any(|c| lower.contains(c))
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("reset by peer")
    {
        StorageError::transient(msg)
    } else if lower.contains("400") || lower.contains("bad request") {
        StorageError::invalid_request(msg)
    } else {
        StorageError::backend(msg)
    }
}

fn remote_object(object: Object) -> RemoteObject {
    RemoteObject {
        bucket: object.bucket,
        name: object.name,
        size: u64::try_from(object.size).unwrap_or_default(),
        generation: Some(object.generation),
        md5_hash: object.md5_hash,
        crc32c: object.crc32c,
    }
}

fn progress(status: UploadStatus) -> UploadProgress {
    match status {
        UploadStatus::Ok(object) => UploadProgress::Finalized(remote_object(object)),
        UploadStatus::NotStarted => UploadProgress::Partial { persisted: 0 },
        UploadStatus::ResumeIncomplete(range) => UploadProgress::Partial {
            persisted: range.last_byte + 1,
        },
    }
}

/// A session URI that GCS no longer recognises means the session is gone
fn session_error(session: &UploadSessionId, err: StorageError) -> StorageError {
    if err.is_not_found() {
        StorageError::session_not_found(format!("{}: {}", session, err))
    } else {
        err
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn start_upload(&self, target: &ObjectTarget) -> StorageResult<UploadSessionId> {
        if target.key.is_empty() {
            return Err(StorageError::invalid_request("object key cannot be empty"));
        }

        let uploader = self
            .retry
            .retry("start_upload", || {
                let client = Arc::clone(&self.client);
                let target = target.clone();

                async move {
                    let mut media = Media::new(target.key.clone());
                    media.content_type = target.content_type.clone().into();
                    let req = UploadObjectRequest {
                        bucket: target.bucket.clone(),
                        ..Default::default()
                    };

                    client
                        .prepare_resumable_upload(&req, &UploadType::Simple(media))
                        .await
                        .map_err(|e| classify_error("GCS session start error", &e.to_string()))
                }
            })
            .await?;

        let id = UploadSessionId::new(uploader.url());
        self.sessions
            .lock()
            .await
            .insert(id.as_str().to_string(), uploader);

        debug!(target = %target, session = %id, "Started resumable upload");
        Ok(id)
    }

    async fn write_chunk(
        &self,
        session: &UploadSessionId,
        offset: u64,
        data: Bytes,
        total_size: Option<u64>,
    ) -> StorageResult<UploadProgress> {
        let uploader = self.session(session).await?;
        let len = data.len() as u64;

        let status = if len == 0 {
            // Nothing left to send; declaring the size finalizes the object
            uploader
                .status(total_size)
                .await
                .map_err(|e| classify_error("GCS chunk upload error", &e.to_string()))
        } else {
            let size = ChunkSize::new(offset, offset + len - 1, total_size);
            uploader
                .upload_multiple_chunk(data.to_vec(), &size)
                .await
                .map_err(|e| classify_error("GCS chunk upload error", &e.to_string()))
        }
        .map_err(|e| session_error(session, e))?;

        let progress = progress(status);
        match &progress {
            UploadProgress::Finalized(object) => {
                debug!(
                    session = %session,
                    name = %object.name,
                    size = object.size,
                    "Finalized resumable upload"
                );
                self.forget(session).await;
            }
            UploadProgress::Partial { persisted } => {
                debug!(session = %session, uploaded = persisted, "Uploaded chunk to GCS");
                if total_size.is_some() {
                    return Err(StorageError::invalid_request(format!(
                        "final chunk accepted but upload is incomplete at {} bytes",
                        persisted
                    )));
                }
            }
        }

        Ok(progress)
    }

    async fn query_upload(&self, session: &UploadSessionId) -> StorageResult<UploadProgress> {
        let uploader = self.session(session).await?;

        let status = self
            .retry
            .retry("query_upload", || {
                let uploader = uploader.clone();
                async move {
                    uploader
                        .status(None)
                        .await
                        .map_err(|e| classify_error("GCS session status error", &e.to_string()))
                }
            })
            .await
            .map_err(|e| session_error(session, e))?;

        Ok(progress(status))
    }

    async fn abort_upload(&self, session: &UploadSessionId) -> StorageResult<()> {
        let uploader = match self.sessions.lock().await.remove(session.as_str()) {
            Some(uploader) => uploader,
            None => return Ok(()),
        };

        let result = self
            .retry
            .retry("abort_upload", || {
                let uploader = uploader.clone();
                async move {
                    uploader
                        .cancel()
                        .await
                        .map_err(|e| classify_error("GCS session cancel error", &e.to_string()))
                }
            })
            .await;

        match result {
            Ok(()) => {
                debug!(session = %session, "Cancelled resumable upload");
                Ok(())
            }
            // Already expired or cancelled
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                warn!(session = %session, error = %e, "Failed to cancel resumable upload");
                Err(e)
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::invalid_request("key cannot be empty"));
        }

        self.retry
            .retry("delete", || {
                let client = Arc::clone(&self.client);
                let req = DeleteObjectRequest {
                    bucket: bucket.to_string(),
                    object: key.to_string(),
                    ..Default::default()
                };

                async move {
                    match client.delete_object(&req).await {
                        Ok(_) => {
                            debug!(key = %req.object, "Successfully deleted object from GCS");
                            Ok(())
                        }
                        Err(e) => match classify_error("GCS delete error", &e.to_string()) {
                            err if err.is_not_found() => {
                                debug!(key = %req.object, "Object not found during delete (idempotent)");
                                Ok(())
                            }
                            err => Err(err),
                        },
                    }
                }
            })
            .await
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        debug!(bucket = %bucket, prefix = %prefix, "Listing objects from GCS");

        self.retry
            .retry("list_objects", || {
                let client = Arc::clone(&self.client);
                let bucket = bucket.to_string();
                let prefix = prefix.to_string();

                async move {
                    let mut results = Vec::new();
                    let mut page_token: Option<String> = None;

                    loop {
                        let req = ListObjectsRequest {
                            bucket: bucket.clone(),
                            prefix: if prefix.is_empty() { None } else { Some(prefix.clone()) },
                            page_token: page_token.clone(),
                            ..Default::default()
                        };

                        let response = client
                            .list_objects(&req)
                            .await
                            .map_err(|e| classify_error("GCS list error", &e.to_string()))?;

                        results.extend(response.items.unwrap_or_default().into_iter().map(|o| o.name));

                        page_token = response.next_page_token;
                        if page_token.is_none() {
                            break;
                        }
                    }

                    results.sort();
                    debug!(count = results.len(), "Listed objects from GCS");
                    Ok(results)
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_auth_errors() {
        assert!(classify_error("op", "http error: 401 Unauthorized").is_auth());
        assert!(classify_error("op", "token source error: invalid_grant").is_auth());
        assert!(matches!(
            classify_error("op", "response error: 403 Forbidden"),
            StorageError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_classify_transient_errors() {
        assert!(classify_error("op", "503 Service Unavailable").is_transient());
        assert!(classify_error("op", "429 Too Many Requests").is_transient());
        assert!(classify_error("op", "error sending request: connection closed").is_transient());
        assert!(classify_error("op", "operation timed out").is_transient());
    }

    #[test]
    fn test_classify_other_errors() {
        assert!(classify_error("op", "404 Not Found").is_not_found());
        assert!(matches!(
            classify_error("op", "400 Bad Request"),
            StorageError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_error("op", "unexpected payload"),
            StorageError::Backend(_)
        ));
    }

    #[test]
    fn test_session_error_mapping() {
        let id = UploadSessionId::new("https://example/upload?upload_id=abc");
        let err = session_error(&id, StorageError::not_found("gone"));
        assert!(matches!(err, StorageError::SessionNotFound(_)));

        let err = session_error(&id, StorageError::transient("503"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_gcs_store_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GcsStore>();
        assert_send_sync::<GcsConnector>();
    }
}
