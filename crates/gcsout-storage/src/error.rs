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

//! Storage error types and utilities

use std::io;
use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object not found in storage
    #[error("object not found: {0}")]
    NotFound(String),

    /// Upload session unknown to the store (expired, cancelled or finalized)
    #[error("upload session not found: {0}")]
    SessionNotFound(String),

    /// Credentials were rejected or could not be turned into a client
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    /// Permission denied for the requested operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Failure that is expected to clear up on retry (reset, throttling, 5xx)
    #[error("transient storage error: {0}")]
    Transient(String),

    /// A chunk did not start at the offset the store has persisted
    #[error("offset mismatch: store has persisted {persisted} bytes, chunk starts at {offset}")]
    OffsetMismatch { persisted: u64, offset: u64 },

    /// The request itself is malformed and will never succeed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credential material could not be decoded
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation timed out
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Storage backend not available or misconfigured
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Transparent error delegation for wrapped error types
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    /// Create a NotFound error with the given key
    pub fn not_found<S: Into<String>>(key: S) -> Self {
        StorageError::NotFound(key.into())
    }

    /// Create a SessionNotFound error with the given session id
    pub fn session_not_found<S: Into<String>>(session: S) -> Self {
        StorageError::SessionNotFound(session.into())
    }

    /// Create an Unauthenticated error with context
    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self {
        StorageError::Unauthenticated(msg.into())
    }

    /// Create a PermissionDenied error with context
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        StorageError::PermissionDenied(msg.into())
    }

    /// Create a Transient error with context
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        StorageError::Transient(msg.into())
    }

    /// Create an InvalidRequest error with context
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        StorageError::InvalidRequest(msg.into())
    }

    /// Create an InvalidCredential error with context
    pub fn invalid_credential<S: Into<String>>(msg: S) -> Self {
        StorageError::InvalidCredential(msg.into())
    }

    /// Create a Backend error with context
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        StorageError::Backend(msg.into())
    }

    /// Create a Timeout error with context
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        StorageError::Timeout(msg.into())
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Transient(_) | StorageError::Timeout(_) | StorageError::Io(_)
        )
    }

    /// Whether the store rejected the caller's identity
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            StorageError::Unauthenticated(_) | StorageError::PermissionDenied(_)
        )
    }

    /// Classify an HTTP status code returned by a store
    pub fn from_status(code: u16, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match code {
            401 => StorageError::Unauthenticated(msg),
            403 => StorageError::PermissionDenied(msg),
            404 | 410 => StorageError::NotFound(msg),
            408 | 429 | 500 | 502 | 503 | 504 => StorageError::Transient(msg),
            400..=499 => StorageError::InvalidRequest(msg),
            _ => StorageError::Backend(msg),
        }
    }
}
