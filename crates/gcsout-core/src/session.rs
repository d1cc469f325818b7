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

//! Transactional upload session for one task

use crate::engine::ChunkedTransfer;
use crate::error::{UploadError, UploadResult};
use bytes::{Bytes, BytesMut};
use gcsout_storage::{ObjectStore, ObjectTarget, RemoteObject, RetryPolicy, UploadProgress, UploadSessionId};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a [`TransferSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Remote session created, nothing written yet
    Open,
    /// At least one write accepted
    Writing,
    /// Object finalized and visible
    Committed,
    /// Remote session cancelled
    Aborted,
    /// A chunk write failed; only abort is allowed
    Failed,
}

impl SessionState {
    /// Whether the session is finished with its remote handle
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Aborted)
    }

    /// Lowercase name used in errors and logs
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Writing => "writing",
            SessionState::Committed => "committed",
            SessionState::Aborted => "aborted",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open remote write handle for exactly one task
///
/// Bytes passed to [`write`](Self::write) are staged and sent in chunks of
/// `chunk_size`. The last chunk is always kept back: only
/// [`commit`](Self::commit) sends it, together with the total size, so the
/// object cannot become visible before commit.
///
/// A failed chunk write moves the session to [`SessionState::Failed`]: the
/// staged bytes are gone, so the session can no longer be committed.
pub struct TransferSession {
    task_index: usize,
    target: ObjectTarget,
    id: UploadSessionId,
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    chunk_size: usize,
    state: SessionState,
    persisted: u64,
    staged: BytesMut,
    chunks: u64,
    retries: u32,
    final_sent: bool,
}

impl TransferSession {
    /// Start a resumable session for `target`
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        task_index: usize,
        target: ObjectTarget,
        chunk_size: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> UploadResult<Self> {
        if chunk_size == 0 {
            return Err(UploadError::from(gcsout_config::ConfigError::invalid_value(
                "output.chunk_size",
                "must be greater than 0",
            )));
        }

        let id = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            id = store.start_upload(&target) => id?,
        };

        debug!(task_index, target = %target, session = %id, "Opened upload session");

        Ok(TransferSession {
            task_index,
            target,
            id,
            store,
            retry,
            cancel,
            chunk_size,
            state: SessionState::Open,
            persisted: 0,
            staged: BytesMut::with_capacity(chunk_size),
            chunks: 0,
            retries: 0,
            final_sent: false,
        })
    }

    /// Index of the task this session writes for
    pub fn task_index(&self) -> usize {
        self.task_index
    }

    /// Object this session finalizes on commit
    pub fn target(&self) -> &ObjectTarget {
        &self.target
    }

    /// Store-assigned session identifier
    pub fn id(&self) -> &UploadSessionId {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes acknowledged by the store
    pub fn persisted(&self) -> u64 {
        self.persisted
    }

    /// Chunk write retries so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Stage `data`, sending every full chunk that is not the last one
    pub async fn write(&mut self, data: &[u8]) -> UploadResult<()> {
        self.ensure_active("write")?;
        self.state = SessionState::Writing;
        self.staged.extend_from_slice(data);

        while self.staged.len() > self.chunk_size {
            let chunk = self.staged.split_to(self.chunk_size).freeze();
            self.flush(chunk, None).await?;
        }
        Ok(())
    }

    /// Send the held-back chunk with the total size and finalize the object
    ///
    /// If the final write fails or is cancelled, the store is asked once,
    /// without cancellation, whether the object was finalized anyway. A
    /// finalized object is reported as committed.
    pub async fn commit(&mut self) -> UploadResult<RemoteObject> {
        self.ensure_active("commit")?;

        let total = self.persisted + self.staged.len() as u64;
        let chunk = self.staged.split().freeze();
        self.final_sent = true;
        match self.flush(chunk, Some(total)).await {
            Ok(UploadProgress::Finalized(object)) => Ok(self.mark_committed(object)),
            Ok(UploadProgress::Partial { persisted }) => {
                self.state = SessionState::Failed;
                Err(UploadError::Storage(
                    gcsout_storage::StorageError::invalid_request(format!(
                        "store did not finalize {} after {} of {} bytes",
                        self.target, persisted, total
                    )),
                ))
            }
            Err(e) => self.reconcile_final_write(e).await,
        }
    }

    async fn reconcile_final_write(&mut self, err: UploadError) -> UploadResult<RemoteObject> {
        match self.store.query_upload(&self.id).await {
            Ok(UploadProgress::Finalized(object)) => {
                debug!(
                    task_index = self.task_index,
                    target = %self.target,
                    error = %err,
                    "Final chunk was persisted before its acknowledgement was lost"
                );
                Ok(self.mark_committed(object))
            }
            Ok(UploadProgress::Partial { .. }) => Err(err),
            Err(query_err) => {
                warn!(
                    task_index = self.task_index,
                    session = %self.id,
                    error = %query_err,
                    "Could not confirm whether the final chunk was persisted"
                );
                Err(err)
            }
        }
    }

    fn mark_committed(&mut self, object: RemoteObject) -> RemoteObject {
        self.state = SessionState::Committed;
        self.persisted = object.size;
        debug!(
            task_index = self.task_index,
            target = %self.target,
            size = object.size,
            chunks = self.chunks,
            "Committed upload session"
        );
        object
    }

    /// Cancel the remote session and drop staged bytes
    ///
    /// Best effort: if the store cannot cancel the session its staged bytes
    /// stay orphaned until the store expires them. They never become a
    /// visible object. Aborting twice is a no-op.
    ///
    /// When a final write was attempted but not confirmed, the target object
    /// is deleted as well, since the store may have finalized it.
    pub async fn abort(&mut self) -> UploadResult<()> {
        match self.state {
            SessionState::Aborted => return Ok(()),
            SessionState::Committed => {
                return Err(UploadError::InvalidSessionState {
                    operation: "abort",
                    state: SessionState::Committed.as_str(),
                })
            }
            SessionState::Open | SessionState::Writing | SessionState::Failed => {}
        }

        self.state = SessionState::Aborted;
        self.staged.clear();

        match self.store.abort_upload(&self.id).await {
            Ok(()) => debug!(task_index = self.task_index, session = %self.id, "Aborted upload session"),
            Err(e) => warn!(
                task_index = self.task_index,
                target = %self.target,
                session = %self.id,
                persisted = self.persisted,
                error = %e,
                "Failed to cancel upload session; staged bytes are orphaned"
            ),
        }

        if self.final_sent {
            if let Err(e) = self.store.delete(&self.target.bucket, &self.target.key).await {
                warn!(
                    task_index = self.task_index,
                    target = %self.target,
                    error = %e,
                    "Failed to delete possibly finalized object"
                );
            }
        }
        Ok(())
    }

    fn ensure_active(&self, operation: &'static str) -> UploadResult<()> {
        if !matches!(self.state, SessionState::Open | SessionState::Writing) {
            return Err(UploadError::InvalidSessionState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    async fn flush(&mut self, chunk: Bytes, total_size: Option<u64>) -> UploadResult<UploadProgress> {
        let len = chunk.len();
        let put = ChunkedTransfer::new(self.store.as_ref(), self.retry, &self.cancel)
            .put(&self.id, self.persisted, chunk, total_size)
            .await;
        let write = match put {
            Ok(write) => write,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        self.retries += write.retries;
        self.chunks += 1;
        self.persisted = match &write.progress {
            UploadProgress::Partial { persisted } => *persisted,
            UploadProgress::Finalized(object) => object.size,
        };

        debug!(
            task_index = self.task_index,
            chunk = self.chunks,
            len,
            persisted = self.persisted,
            "Chunk acknowledged"
        );
        Ok(write.progress)
    }
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("task_index", &self.task_index)
            .field("target", &self.target)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("persisted", &self.persisted)
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                task_index = self.task_index,
                target = %self.target,
                session = %self.id,
                "Upload session dropped without commit or abort"
            );
        }
    }
}
