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

//! Job-level error taxonomy

use crate::report::FailureKind;
use gcsout_config::ConfigError;
use gcsout_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type alias for upload operations
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors surfaced by the upload coordinator and transfer engine
#[derive(Error, Debug)]
pub enum UploadError {
    /// Configuration rejected before the job started
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The store rejected the credential; the whole job is aborted
    #[error("authentication failed: {0}")]
    Authentication(#[source] StorageError),

    /// A chunk write kept failing transiently until retries ran out
    #[error("chunk write failed after {attempts} attempts: {source}")]
    TransientTransfer {
        /// Attempts made, including the first
        attempts: u32,
        /// Last error returned by the store
        #[source]
        source: StorageError,
    },

    /// One task could not complete and its session was aborted
    #[error("task {task_index} failed: {reason}")]
    TaskFailure {
        /// Index of the failed task
        task_index: usize,
        /// Human readable cause
        reason: String,
    },

    /// The job was cancelled
    #[error("upload cancelled")]
    Cancelled,

    /// Finalize was called on an outcome that did not succeed
    #[error("job failed: {succeeded} of {total} tasks committed, {failed} failed, {cancelled} cancelled")]
    JobFailed {
        /// Committed tasks
        succeeded: usize,
        /// Failed tasks
        failed: usize,
        /// Cancelled tasks
        cancelled: usize,
        /// Distinct tasks reported
        total: usize,
    },

    /// Non-retryable store error
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// Reading the task's local source failed
    #[error("failed to read upload source: {0}")]
    Source(#[from] io::Error),

    /// Operation not allowed in the session's current state
    #[error("cannot {operation} a session that is {state}")]
    InvalidSessionState {
        /// Attempted operation
        operation: &'static str,
        /// State the session was in
        state: &'static str,
    },
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        if err.is_auth() || matches!(err, StorageError::InvalidCredential(_)) {
            UploadError::Authentication(err)
        } else if err.is_transient() {
            UploadError::TransientTransfer {
                attempts: 1,
                source: err,
            }
        } else {
            UploadError::Storage(err)
        }
    }
}

impl UploadError {
    /// Category recorded in a failed task report
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            UploadError::Configuration(_) => FailureKind::Configuration,
            UploadError::Authentication(_) => FailureKind::Authentication,
            UploadError::TransientTransfer { .. } => FailureKind::TransientTransfer,
            UploadError::Storage(_) => FailureKind::Storage,
            UploadError::Source(_) => FailureKind::Source,
            UploadError::TaskFailure { .. }
            | UploadError::JobFailed { .. }
            | UploadError::InvalidSessionState { .. } => FailureKind::Internal,
            // Cancellation produces a cancelled report, not a failure
            UploadError::Cancelled => FailureKind::Internal,
        }
    }

    /// Whether this error aborts every task of the job
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(
            self,
            UploadError::Authentication(_) | UploadError::Configuration(_)
        )
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }
}
