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

//! Chunked transfer engine
//!
//! Writes one chunk into a resumable session and keeps at it until the store
//! acknowledges the whole chunk, the retry budget runs out, or the job is
//! cancelled.
//!
//! After a failed write the engine asks the store how many bytes it has
//! persisted and resends only the remainder. A write whose response was lost
//! is therefore never applied twice.

use crate::error::{UploadError, UploadResult};
use crate::session::TransferSession;
use crate::task::UploadSource;
use bytes::Bytes;
use gcsout_storage::{ObjectStore, RetryPolicy, StorageError, UploadProgress, UploadSessionId};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Size of each read from an upload source
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Stream `source` into `session` until the source is exhausted
///
/// Does not commit; the caller decides between commit and abort.
pub async fn transfer(
    session: &mut TransferSession,
    source: UploadSource,
    cancel: &CancellationToken,
) -> UploadResult<()> {
    let mut reader = source.open().await?;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            biased;

            () = cancel.cancelled() => return Err(UploadError::Cancelled),
            n = reader.read(&mut buf) => n?,
        };
        if n == 0 {
            return Ok(());
        }
        session.write(&buf[..n]).await?;
    }
}

/// Result of a fully acknowledged chunk write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkWrite {
    /// Session state after the chunk
    pub progress: UploadProgress,
    /// Retries spent on this chunk
    pub retries: u32,
}

/// Drives chunk writes for one session
#[derive(Debug)]
pub struct ChunkedTransfer<'a> {
    store: &'a dyn ObjectStore,
    retry: RetryPolicy,
    cancel: &'a CancellationToken,
}

impl<'a> ChunkedTransfer<'a> {
    /// Transfer against `store`, retrying per `retry` until `cancel` fires
    pub fn new(store: &'a dyn ObjectStore, retry: RetryPolicy, cancel: &'a CancellationToken) -> Self {
        ChunkedTransfer {
            store,
            retry,
            cancel,
        }
    }

    /// Write `chunk` at `offset`, resuming from the persisted offset on failure
    ///
    /// `total_size` marks the final chunk; the call then only succeeds once
    /// the store reports the object finalized.
    pub async fn put(
        &self,
        session: &UploadSessionId,
        offset: u64,
        chunk: Bytes,
        total_size: Option<u64>,
    ) -> UploadResult<ChunkWrite> {
        let end = offset + chunk.len() as u64;
        let mut sent_from = offset;
        let mut retries = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let slice = chunk.slice((sent_from - offset) as usize..);
            let result = tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                result = self.store.write_chunk(session, sent_from, slice, total_size) => result,
            };

            let err = match result {
                Ok(UploadProgress::Finalized(object)) => {
                    return Ok(ChunkWrite {
                        progress: UploadProgress::Finalized(object),
                        retries,
                    });
                }
                Ok(UploadProgress::Partial { persisted }) if total_size.is_none() && persisted >= end => {
                    return Ok(ChunkWrite {
                        progress: UploadProgress::Partial { persisted },
                        retries,
                    });
                }
                Ok(UploadProgress::Partial { persisted }) if persisted > sent_from && persisted < end => {
                    // Short acknowledgement: the store took part of the slice
                    debug!(session = %session, persisted, end, "Store persisted a partial chunk");
                    sent_from = persisted;
                    continue;
                }
                Ok(UploadProgress::Partial { persisted }) => StorageError::transient(format!(
                    "store acknowledged {} bytes, expected {}",
                    persisted, end
                )),
                Err(e) => e,
            };

            if err.is_auth() || !(err.is_transient() || matches!(err, StorageError::OffsetMismatch { .. })) {
                return Err(UploadError::from(err));
            }

            retries += 1;
            if retries > self.retry.max_retries {
                return Err(UploadError::TransientTransfer {
                    attempts: retries,
                    source: err,
                });
            }

            let delay = self.retry.backoff(retries);
            warn!(
                session = %session,
                offset = sent_from,
                retry_count = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying chunk write"
            );

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            match self.resume_offset(session, offset, end, total_size).await? {
                Resume::From(persisted) => sent_from = persisted,
                Resume::Done(progress) => return Ok(ChunkWrite { progress, retries }),
                Resume::Unknown => {}
            }
        }
    }

    /// Where to continue after a failed write
    async fn resume_offset(
        &self,
        session: &UploadSessionId,
        offset: u64,
        end: u64,
        total_size: Option<u64>,
    ) -> UploadResult<Resume> {
        let progress = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return Err(UploadError::Cancelled),
            progress = self.store.query_upload(session) => progress,
        };

        match progress {
            Ok(UploadProgress::Finalized(object)) => Ok(Resume::Done(UploadProgress::Finalized(object))),
            Ok(UploadProgress::Partial { persisted }) if persisted < offset => {
                Err(UploadError::Storage(StorageError::OffsetMismatch { persisted, offset }))
            }
            Ok(UploadProgress::Partial { persisted }) if total_size.is_none() && persisted >= end => {
                debug!(session = %session, persisted, "Chunk was persisted before its acknowledgement was lost");
                Ok(Resume::Done(UploadProgress::Partial { persisted }))
            }
            Ok(UploadProgress::Partial { persisted }) => Ok(Resume::From(persisted.min(end))),
            Err(e) if e.is_auth() => Err(UploadError::from(e)),
            Err(e) if e.is_transient() => {
                // Resend from the last known offset; the store skips bytes it already holds
                warn!(session = %session, error = %e, "Could not query persisted offset");
                Ok(Resume::Unknown)
            }
            Err(e) => Err(UploadError::from(e)),
        }
    }
}

enum Resume {
    From(u64),
    Done(UploadProgress),
    Unknown,
}
