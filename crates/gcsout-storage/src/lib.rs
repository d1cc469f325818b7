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

//! Resumable object storage for gcsout
//!
//! This crate provides the asynchronous storage interface the upload engine
//! writes through:
//! - Google Cloud Storage (feature `gcs`, on by default)
//! - An in-memory mock with fault injection for tests
//!
//! # Architecture
//!
//! The [`ObjectStore`] trait models a resumable upload session. A session is
//! started for one target object, receives strictly sequential chunks, and
//! becomes a visible object only when the final chunk (the one carrying the
//! total size) is accepted. Until then nothing is visible to readers; an
//! aborted session leaves no object behind.
//!
//! ## Core Concepts
//!
//! - **Target**: bucket, key and content type of the object being written
//! - **Session**: an opaque id for one in-progress upload
//! - **Persisted offset**: how many bytes the store holds for a session.
//!   After a failed write the caller asks for it with
//!   [`ObjectStore::query_upload`] and resumes from there.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use gcsout_storage::{mock::MockStore, ObjectStore, ObjectTarget, UploadProgress};
//!
//! #[tokio::main]
//! async fn main() -> gcsout_storage::StorageResult<()> {
//!     let store = MockStore::new();
//!     let target = ObjectTarget::new("my-bucket", "exports/part.000.00.csv");
//!
//!     let session = store.start_upload(&target).await?;
//!     store.write_chunk(&session, 0, Bytes::from_static(b"a,b\n"), None).await?;
//!     let done = store
//!         .write_chunk(&session, 4, Bytes::from_static(b"1,2\n"), Some(8))
//!         .await?;
//!
//!     assert!(matches!(done, UploadProgress::Finalized(_)));
//!     Ok(())
//! }
//! ```

pub mod credential;
pub mod error;
#[cfg(feature = "gcs")]
pub mod gcs;
pub mod mock;
pub mod retry;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::sync::Arc;

pub use credential::Credential;
pub use error::{StorageError, StorageResult};
#[cfg(feature = "gcs")]
pub use gcs::{GcsConnector, GcsStore};
pub use retry::RetryPolicy;

/// Content type used when none is configured
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// The object a session writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectTarget {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Content type stored with the object
    pub content_type: String,
}

impl ObjectTarget {
    /// Target with the default content type
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ObjectTarget {
            bucket: bucket.into(),
            key: key.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

impl fmt::Display for ObjectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.key)
    }
}

/// Opaque handle of an in-progress resumable upload
///
/// For GCS this is the session URI, which is itself a bearer capability;
/// it is never logged in full.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UploadSessionId(String);

impl UploadSessionId {
    /// Wrap a store-specific session id
    pub fn new(id: impl Into<String>) -> Self {
        UploadSessionId(id.into())
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for UploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadSessionId({})", self)
    }
}

impl fmt::Display for UploadSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self.0.chars().rev().take(8).collect::<Vec<_>>().into_iter().rev().collect();
        write!(f, "…{}", tail)
    }
}

/// Identity of a committed object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Object generation, when the store versions objects
    pub generation: Option<i64>,
    /// Base64 MD5 digest reported by the store
    pub md5_hash: Option<String>,
    /// Base64 CRC32C checksum reported by the store
    pub crc32c: Option<String>,
}

/// State of a session after a write or a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadProgress {
    /// The store holds the first `persisted` bytes
    Partial {
        /// Bytes persisted so far
        persisted: u64,
    },
    /// The upload completed and the object is visible
    Finalized(RemoteObject),
}

/// Resumable object storage
///
/// Implementations must be `Send + Sync` and usable through `Arc<dyn ObjectStore>`
/// from many tasks at once. Different sessions are independent; a single
/// session is only ever driven by one caller at a time.
///
/// # Session contract
///
/// - `write_chunk(offset, data, total)` writes `data` at `offset`. Bytes
///   before the persisted offset are ignored, so resending an acknowledged
///   range does not duplicate it. An offset beyond the persisted size is an
///   [`StorageError::OffsetMismatch`].
/// - A write with `total = Some(n)` finalizes the object; `offset + data.len()`
///   must equal `n`. `data` may be empty for this final call.
/// - Nothing becomes visible under the target key before finalization.
/// - `abort_upload` discards staged bytes. Aborting an unknown or already
///   aborted session succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Open a resumable upload session for `target`
    async fn start_upload(&self, target: &ObjectTarget) -> StorageResult<UploadSessionId>;

    /// Write one chunk at `offset`; `total_size` marks the final chunk
    async fn write_chunk(
        &self,
        session: &UploadSessionId,
        offset: u64,
        data: Bytes,
        total_size: Option<u64>,
    ) -> StorageResult<UploadProgress>;

    /// Ask how far the session has persisted
    async fn query_upload(&self, session: &UploadSessionId) -> StorageResult<UploadProgress>;

    /// Cancel the session and discard staged bytes
    async fn abort_upload(&self, session: &UploadSessionId) -> StorageResult<()>;

    /// Delete a visible object. Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Sorted keys of visible objects under `prefix`
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Builds an authenticated store client from a resolved credential
///
/// Connecting may defer network use to the first request. An error here is
/// an authentication failure for the whole job.
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// Create a client for `credential`
    async fn connect(&self, credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>>;
}
