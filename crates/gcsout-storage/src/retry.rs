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

//! Bounded retry with exponential backoff

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a failed store call is retried
///
/// Only errors for which [`crate::StorageError::is_transient`] holds are
/// retried. The delay before retry `n` (1-based) is
/// `min(initial_interval * 2^(n-1), max_interval)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Cap for the doubling delay
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 10,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy from millisecond intervals
    pub fn new(max_retries: u32, initial_interval_ms: u64, max_interval_ms: u64) -> Self {
        RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(initial_interval_ms),
            max_interval: Duration::from_millis(max_interval_ms),
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .initial_interval
            .saturating_mul(1u32 << exponent);
        delay.min(self.max_interval)
    }

    /// Run `f` until it succeeds, fails permanently, or retries run out
    pub async fn retry<F, Fut, T>(&self, operation: &str, mut f: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut retry_count = 0u32;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && retry_count < self.max_retries => {
                    retry_count += 1;
                    let delay = self.backoff(retry_count);

                    warn!(
                        operation,
                        retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying failed storage operation"
                    );

                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
