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

//! Read-only settings handed to every task

use crate::task::ObjectNamer;
use chrono::{DateTime, Utc};
use gcsout_config::{AuthMethod, Config};
use gcsout_storage::{ObjectTarget, RetryPolicy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable description of an upload job
///
/// Built once during [`crate::JobCoordinator::init`] and never changed
/// afterwards. It holds no key material, so it can be serialized and
/// shipped to a host that runs tasks elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Unique id of this job run
    pub job_id: Uuid,
    /// When init completed
    pub created_at: DateTime<Utc>,
    pub bucket: String,
    pub path_prefix: String,
    pub sequence_format: String,
    pub file_ext: String,
    pub content_type: String,
    /// Authentication mode the job resolved
    pub auth_method: AuthMethod,
    /// Bytes per intermediate chunk
    pub chunk_size: usize,
    /// Chunk write retry policy
    pub retry: RetryPolicy,
    pub max_concurrency: usize,
}

impl TaskDescriptor {
    pub(crate) fn from_config(config: &Config) -> Self {
        let output = &config.output;
        TaskDescriptor {
            job_id: Uuid::new_v4(),
            created_at: Utc::now(),
            bucket: output.bucket.clone(),
            path_prefix: output.path_prefix.clone(),
            sequence_format: output.sequence_format.clone(),
            file_ext: output.file_ext.clone(),
            content_type: output.content_type.clone(),
            auth_method: output.auth_method,
            chunk_size: output.chunk_size,
            retry: RetryPolicy::new(
                config.retry.max_retries,
                config.retry.initial_retry_interval_ms,
                config.retry.max_retry_interval_ms,
            ),
            max_concurrency: config.performance.max_concurrency,
        }
    }

    /// Namer producing this job's object keys
    pub fn namer(&self) -> ObjectNamer {
        ObjectNamer::new(&self.path_prefix, &self.sequence_format, &self.file_ext)
    }

    /// Upload target for `key` in this job's bucket
    pub fn target(&self, key: impl Into<String>) -> ObjectTarget {
        ObjectTarget::new(&self.bucket, key).with_content_type(&self.content_type)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_descriptor_from_config() {
        let mut config = Config::default();
        config.output.bucket = "bucket".to_string();
        config.output.path_prefix = "out/part".to_string();
        config.output.content_type = "text/csv".to_string();
        config.retry.max_retries = 3;

        let descriptor = TaskDescriptor::from_config(&config);
        assert_eq!(descriptor.retry.max_retries, 3);
        assert_eq!(descriptor.retry.initial_interval, Duration::from_millis(500));
        assert_eq!(descriptor.namer().name(4, 1).unwrap(), "out/part.004.01");

        let target = descriptor.target("out/part.004.01");
        assert_eq!(target.bucket, "bucket");
        assert_eq!(target.content_type, "text/csv");
    }

    #[test]
    fn test_descriptor_serializes_without_secrets() {
        let mut config = Config::default();
        config.output.bucket = "bucket".to_string();
        config.output.json_keyfile = Some(gcsout_config::KeyFile::inline("{\"private_key\": \"s3cr3t\"}"));

        let json = serde_json::to_string(&TaskDescriptor::from_config(&config)).unwrap();
        assert!(!json.contains("s3cr3t"));

        let back: TaskDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bucket, "bucket");
    }
}
