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

//! In-memory mock object store for testing
//!
//! Provides a thread-safe, in-memory implementation of [`ObjectStore`](crate::ObjectStore)
//! with the same session semantics as GCS resumable uploads, plus fault
//! injection so upload engines can be tested against flaky networks.
//!
//! # Examples
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use gcsout_storage::mock::{Fault, FaultKind, MockOp, MockStore};
//! use gcsout_storage::{ObjectStore, ObjectTarget};
//!
//! #[tokio::main]
//! async fn main() -> gcsout_storage::StorageResult<()> {
//!     let store = MockStore::new();
//!
//!     // The first chunk write is persisted but its acknowledgement is lost
//!     store.inject_fault(Fault::new(MockOp::WriteChunk, FaultKind::LostAck).times(1)).await;
//!
//!     let target = ObjectTarget::new("bucket", "out.bin");
//!     let session = store.start_upload(&target).await?;
//!     assert!(store.write_chunk(&session, 0, Bytes::from_static(b"abc"), None).await.is_err());
//!
//!     // Resending the same range does not duplicate it
//!     store.write_chunk(&session, 0, Bytes::from_static(b"abc"), Some(3)).await?;
//!     assert_eq!(store.object("bucket", "out.bin").await.unwrap_or_default(), b"abc");
//!     Ok(())
//! }
//! ```

use crate::credential::Credential;
use crate::error::{StorageError, StorageResult};
use crate::{ObjectStore, ObjectTarget, RemoteObject, StoreConnector, UploadProgress, UploadSessionId};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Store operation a [`Fault`] applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    /// [`ObjectStore::start_upload`]
    StartUpload,
    /// [`ObjectStore::write_chunk`]
    WriteChunk,
    /// [`ObjectStore::query_upload`]
    QueryUpload,
    /// [`ObjectStore::abort_upload`]
    AbortUpload,
    /// [`ObjectStore::delete`]
    Delete,
    /// [`ObjectStore::list_objects`]
    ListObjects,
}

/// What an injected fault does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Fail with a transient error before anything is applied
    Transient,
    /// Apply the operation, then fail with a transient error
    LostAck,
    /// Fail as if the credential had been revoked
    Unauthenticated,
    /// Fail with a non-retryable backend error
    Permanent,
}

/// A scripted failure
#[derive(Debug, Clone)]
pub struct Fault {
    op: MockOp,
    kind: FaultKind,
    key: Option<String>,
    remaining: Option<usize>,
}

impl Fault {
    /// Fail every call of `op` with `kind`
    pub fn new(op: MockOp, kind: FaultKind) -> Self {
        Fault {
            op,
            kind,
            key: None,
            remaining: None,
        }
    }

    /// Only fail calls touching object `key`
    pub fn for_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Fire at most `n` times
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, op: MockOp, key: &str) -> bool {
        self.op == op
            && self.remaining != Some(0)
            && match &self.key {
                Some(k) => k == key,
                None => true,
            }
    }

    fn error(&self, op: MockOp, key: &str) -> StorageError {
        let msg = format!("injected {:?} fault on {:?} for {}", self.kind, op, key);
        match self.kind {
            FaultKind::Transient | FaultKind::LostAck => StorageError::transient(msg),
            FaultKind::Unauthenticated => StorageError::unauthenticated(msg),
            FaultKind::Permanent => StorageError::backend(msg),
        }
    }
}

#[derive(Debug, Clone)]
enum SessionState {
    Active,
    Finalized(RemoteObject),
    Aborted,
}

#[derive(Debug)]
struct Session {
    target: ObjectTarget,
    data: Vec<u8>,
    state: SessionState,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    meta: RemoteObject,
    content_type: String,
}

#[derive(Debug, Default)]
struct State {
    // (bucket, key) -> visible object
    objects: BTreeMap<(String, String), StoredObject>,
    sessions: HashMap<String, Session>,
    faults: Vec<Fault>,
    next_session: u64,
    next_generation: i64,
}

impl State {
    /// Consume the first fault matching `op` on `key`
    fn take_fault(&mut self, op: MockOp, key: &str) -> Option<Fault> {
        let fault = self.faults.iter_mut().find(|f| f.matches(op, key))?;
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        Some(fault.clone())
    }
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    write_calls: AtomicUsize,
    bytes_received: AtomicU64,
    aborted: AtomicUsize,
    reject_credentials: AtomicBool,
    write_delay_ms: AtomicU64,
}

/// In-memory mock object store
///
/// Cloning shares the underlying state, so a clone handed to the code under
/// test can be inspected from the test afterwards. The store also implements
/// [`StoreConnector`] and hands out clones of itself.
///
/// # Thread Safety
///
/// `Send + Sync`; state lives behind a `tokio::sync::RwLock`.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<RwLock<State>>,
    counters: Arc<Counters>,
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a failure
    pub async fn inject_fault(&self, fault: Fault) {
        self.state.write().await.faults.push(fault);
    }

    /// Remove all scripted failures
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Make [`StoreConnector::connect`] reject every credential
    pub fn reject_credentials(&self, reject: bool) {
        self.counters
            .reject_credentials
            .store(reject, Ordering::SeqCst);
    }

    /// Sleep this long inside every chunk write
    pub fn set_write_delay(&self, delay: Duration) {
        self.counters
            .write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Place a visible object directly, bypassing sessions
    pub async fn insert_object(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        let mut state = self.state.write().await;
        state.next_generation += 1;
        let data = data.into();
        let meta = RemoteObject {
            bucket: bucket.to_string(),
            name: key.to_string(),
            size: data.len() as u64,
            generation: Some(state.next_generation),
            md5_hash: None,
            crc32c: None,
        };
        state.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                meta,
                content_type: crate::DEFAULT_CONTENT_TYPE.to_string(),
            },
        );
    }

    /// Contents of a visible object
    pub async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.read().await;
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Content type a visible object was stored with
    pub async fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }

    /// Number of visible objects across all buckets
    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Sessions neither finalized nor aborted
    pub async fn open_sessions(&self) -> usize {
        let state = self.state.read().await;
        state
            .sessions
            .values()
            .filter(|s| matches!(s.state, SessionState::Active))
            .count()
    }

    /// Sessions ever started
    pub async fn started_sessions(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Calls to [`StoreConnector::connect`]
    pub fn connect_count(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    /// Calls to [`ObjectStore::write_chunk`], including failed ones
    pub fn write_calls(&self) -> usize {
        self.counters.write_calls.load(Ordering::SeqCst)
    }

    /// Payload bytes received by chunk writes, including resent bytes
    pub fn bytes_received(&self) -> u64 {
        self.counters.bytes_received.load(Ordering::SeqCst)
    }

    /// Sessions cancelled through [`ObjectStore::abort_upload`]
    pub fn aborted_sessions(&self) -> usize {
        self.counters.aborted.load(Ordering::SeqCst)
    }

    fn apply_write(
        state: &mut State,
        session: &UploadSessionId,
        offset: u64,
        data: &[u8],
        total_size: Option<u64>,
    ) -> StorageResult<UploadProgress> {
        let entry = state
            .sessions
            .get_mut(session.as_str())
            .ok_or_else(|| StorageError::session_not_found(session.to_string()))?;

        match &entry.state {
            SessionState::Aborted => return Err(StorageError::session_not_found(session.to_string())),
            SessionState::Finalized(meta) => return Ok(UploadProgress::Finalized(meta.clone())),
            SessionState::Active => {}
        }

        let persisted = entry.data.len() as u64;
        if offset > persisted {
            return Err(StorageError::OffsetMismatch { persisted, offset });
        }

        // Bytes below the persisted offset were already accepted
        let skip = (persisted - offset) as usize;
        if skip < data.len() {
            entry.data.extend_from_slice(&data[skip..]);
        }

        let Some(total) = total_size else {
            return Ok(UploadProgress::Partial {
                persisted: entry.data.len() as u64,
            });
        };

        if entry.data.len() as u64 != total {
            return Err(StorageError::invalid_request(format!(
                "declared total of {} bytes but {} were persisted",
                total,
                entry.data.len()
            )));
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let Some(entry) = state.sessions.get_mut(session.as_str()) else {
            return Err(StorageError::session_not_found(session.to_string()));
        };
        let meta = RemoteObject {
            bucket: entry.target.bucket.clone(),
            name: entry.target.key.clone(),
            size: total,
            generation: Some(generation),
            md5_hash: None,
            crc32c: None,
        };
        entry.state = SessionState::Finalized(meta.clone());
        let stored = StoredObject {
            data: std::mem::take(&mut entry.data),
            meta: meta.clone(),
            content_type: entry.target.content_type.clone(),
        };
        let key = (entry.target.bucket.clone(), entry.target.key.clone());
        state.objects.insert(key, stored);

        Ok(UploadProgress::Finalized(meta))
    }

    fn session_key(state: &State, session: &UploadSessionId) -> String {
        state
            .sessions
            .get(session.as_str())
            .map(|s| s.target.key.clone())
            .unwrap_or_default()
    }
}

impl fmt::Debug for MockStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockStore")
            .field("connects", &self.connect_count())
            .field("write_calls", &self.write_calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    async fn start_upload(&self, target: &ObjectTarget) -> StorageResult<UploadSessionId> {
        if target.key.is_empty() {
            return Err(StorageError::invalid_request("object key cannot be empty"));
        }

        let mut state = self.state.write().await;
        let fault = state.take_fault(MockOp::StartUpload, &target.key);
        if let Some(f) = fault.as_ref().filter(|f| f.kind != FaultKind::LostAck) {
            return Err(f.error(MockOp::StartUpload, &target.key));
        }

        state.next_session += 1;
        let id = format!("mock-session-{:08}", state.next_session);
        state.sessions.insert(
            id.clone(),
            Session {
                target: target.clone(),
                data: Vec::new(),
                state: SessionState::Active,
            },
        );

        match fault {
            Some(f) => Err(f.error(MockOp::StartUpload, &target.key)),
            None => Ok(UploadSessionId::new(id)),
        }
    }

    async fn write_chunk(
        &self,
        session: &UploadSessionId,
        offset: u64,
        data: Bytes,
        total_size: Option<u64>,
    ) -> StorageResult<UploadProgress> {
        self.counters.write_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.counters.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut state = self.state.write().await;
        let key = Self::session_key(&state, session);
        let fault = state.take_fault(MockOp::WriteChunk, &key);
        if let Some(f) = fault.as_ref().filter(|f| f.kind != FaultKind::LostAck) {
            return Err(f.error(MockOp::WriteChunk, &key));
        }

        self.counters
            .bytes_received
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        let progress = Self::apply_write(&mut state, session, offset, &data, total_size)?;

        match fault {
            Some(f) => Err(f.error(MockOp::WriteChunk, &key)),
            None => Ok(progress),
        }
    }

    async fn query_upload(&self, session: &UploadSessionId) -> StorageResult<UploadProgress> {
        let mut state = self.state.write().await;
        let key = Self::session_key(&state, session);
        if let Some(f) = state.take_fault(MockOp::QueryUpload, &key) {
            return Err(f.error(MockOp::QueryUpload, &key));
        }

        let entry = state
            .sessions
            .get(session.as_str())
            .ok_or_else(|| StorageError::session_not_found(session.to_string()))?;
        match &entry.state {
            SessionState::Active => Ok(UploadProgress::Partial {
                persisted: entry.data.len() as u64,
            }),
            SessionState::Finalized(meta) => Ok(UploadProgress::Finalized(meta.clone())),
            SessionState::Aborted => Err(StorageError::session_not_found(session.to_string())),
        }
    }

    async fn abort_upload(&self, session: &UploadSessionId) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let key = Self::session_key(&state, session);
        let fault = state.take_fault(MockOp::AbortUpload, &key);
        if let Some(f) = fault.as_ref().filter(|f| f.kind != FaultKind::LostAck) {
            return Err(f.error(MockOp::AbortUpload, &key));
        }

        if let Some(entry) = state.sessions.get_mut(session.as_str()) {
            if matches!(entry.state, SessionState::Active) {
                entry.state = SessionState::Aborted;
                entry.data.clear();
                self.counters.aborted.fetch_add(1, Ordering::SeqCst);
            }
        }

        match fault {
            Some(f) => Err(f.error(MockOp::AbortUpload, &key)),
            None => Ok(()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::invalid_request("object key cannot be empty"));
        }

        let mut state = self.state.write().await;
        let fault = state.take_fault(MockOp::Delete, key);
        if let Some(f) = fault.as_ref().filter(|f| f.kind != FaultKind::LostAck) {
            return Err(f.error(MockOp::Delete, key));
        }

        state.objects.remove(&(bucket.to_string(), key.to_string()));

        match fault {
            Some(f) => Err(f.error(MockOp::Delete, key)),
            None => Ok(()),
        }
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        let mut state = self.state.write().await;
        if let Some(f) = state.take_fault(MockOp::ListObjects, prefix) {
            return Err(f.error(MockOp::ListObjects, prefix));
        }

        // BTreeMap iteration is already sorted by (bucket, key)
        Ok(state
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|(_, o)| o.meta.name.clone())
            .collect())
    }
}

#[async_trait]
impl StoreConnector for MockStore {
    async fn connect(&self, credential: &Credential) -> StorageResult<Arc<dyn ObjectStore>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        if self.counters.reject_credentials.load(Ordering::SeqCst) {
            return Err(StorageError::unauthenticated(format!(
                "mock store rejected {} credential",
                credential.kind()
            )));
        }

        // Surface undecodable key material the way a real client would
        credential.service_account_json()?;

        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn target(key: &str) -> ObjectTarget {
        ObjectTarget::new("bucket", key)
    }

    #[tokio::test]
    async fn test_object_invisible_until_finalized() {
        let store = MockStore::new();
        let session = store.start_upload(&target("a.csv")).await.unwrap();

        let progress = store
            .write_chunk(&session, 0, Bytes::from_static(b"hello "), None)
            .await
            .unwrap();
        assert_eq!(progress, UploadProgress::Partial { persisted: 6 });
        assert!(store.object("bucket", "a.csv").await.is_none());

        let progress = store
            .write_chunk(&session, 6, Bytes::from_static(b"world"), Some(11))
            .await
            .unwrap();
        let UploadProgress::Finalized(meta) = progress else {
            panic!("expected finalized upload");
        };
        assert_eq!(meta.size, 11);
        assert_eq!(store.object("bucket", "a.csv").await.unwrap(), b"hello world");
        assert_eq!(store.open_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_write_is_deduplicated() {
        let store = MockStore::new();
        let session = store.start_upload(&target("a")).await.unwrap();

        store.write_chunk(&session, 0, Bytes::from_static(b"abcd"), None).await.unwrap();
        let progress = store
            .write_chunk(&session, 2, Bytes::from_static(b"cdef"), None)
            .await
            .unwrap();
        assert_eq!(progress, UploadProgress::Partial { persisted: 6 });
    }

    #[tokio::test]
    async fn test_gap_is_offset_mismatch() {
        let store = MockStore::new();
        let session = store.start_upload(&target("a")).await.unwrap();

        let err = store
            .write_chunk(&session, 4, Bytes::from_static(b"x"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::OffsetMismatch { persisted: 0, offset: 4 }));
    }

    #[tokio::test]
    async fn test_empty_final_write() {
        let store = MockStore::new();
        let session = store.start_upload(&target("empty")).await.unwrap();

        let progress = store.write_chunk(&session, 0, Bytes::new(), Some(0)).await.unwrap();
        assert!(matches!(progress, UploadProgress::Finalized(ref m) if m.size == 0));
        assert_eq!(store.object("bucket", "empty").await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_wrong_total_rejected() {
        let store = MockStore::new();
        let session = store.start_upload(&target("a")).await.unwrap();

        let err = store
            .write_chunk(&session, 0, Bytes::from_static(b"abc"), Some(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidRequest(_)));
        assert!(store.object("bucket", "a").await.is_none());
    }

    #[tokio::test]
    async fn test_abort_discards_and_is_idempotent() {
        let store = MockStore::new();
        let session = store.start_upload(&target("a")).await.unwrap();
        store.write_chunk(&session, 0, Bytes::from_static(b"abc"), None).await.unwrap();

        store.abort_upload(&session).await.unwrap();
        store.abort_upload(&session).await.unwrap();
        store.abort_upload(&UploadSessionId::new("unknown")).await.unwrap();

        assert_eq!(store.aborted_sessions(), 1);
        assert!(store.query_upload(&session).await.unwrap_err().to_string().contains("session"));
        assert_eq!(store.object_count().await, 0);
    }

    #[tokio::test]
    async fn test_lost_ack_persists_bytes() {
        let store = MockStore::new();
        store
            .inject_fault(Fault::new(MockOp::WriteChunk, FaultKind::LostAck).times(1))
            .await;
        let session = store.start_upload(&target("a")).await.unwrap();

        let err = store
            .write_chunk(&session, 0, Bytes::from_static(b"abc"), None)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(
            store.query_upload(&session).await.unwrap(),
            UploadProgress::Partial { persisted: 3 }
        );
    }

    #[tokio::test]
    async fn test_fault_scoped_to_key() {
        let store = MockStore::new();
        store
            .inject_fault(Fault::new(MockOp::StartUpload, FaultKind::Permanent).for_key("bad"))
            .await;

        assert!(store.start_upload(&target("good")).await.is_ok());
        assert!(store.start_upload(&target("bad")).await.is_err());
        assert!(store.start_upload(&target("bad")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = MockStore::new();
        store.insert_object("bucket", "out/b", b"2".to_vec()).await;
        store.insert_object("bucket", "out/a", b"1".to_vec()).await;
        store.insert_object("other", "out/c", b"3".to_vec()).await;

        assert_eq!(store.list_objects("bucket", "out/").await.unwrap(), vec!["out/a", "out/b"]);

        store.delete("bucket", "out/a").await.unwrap();
        store.delete("bucket", "missing").await.unwrap();
        assert_eq!(store.list_objects("bucket", "").await.unwrap(), vec!["out/b"]);
    }

    #[tokio::test]
    async fn test_connector_counts_and_rejects() {
        let store = MockStore::new();
        store.connect(&Credential::Ambient).await.unwrap();
        assert_eq!(store.connect_count(), 1);

        store.reject_credentials(true);
        let err = store.connect(&Credential::Ambient).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(store.connect_count(), 2);
    }
}
