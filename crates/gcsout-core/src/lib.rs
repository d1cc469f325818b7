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

//! Transactional chunked upload of task output to Google Cloud Storage
//!
//! An upload job consists of N independent tasks. Each task streams one
//! local file, buffer or reader into its own resumable upload session, and
//! the object becomes visible only when the task commits. A task that fails
//! aborts its session; nothing partial is ever visible under the target key.
//!
//! # Components
//!
//! - [`CredentialResolver`]: `auth_method` plus key material to a [`Credential`]
//! - [`JobCoordinator`]: job lifecycle, scheduling, open/commit per task
//! - [`ChunkedTransfer`]: chunk writes with retry, backoff and resume
//! - [`aggregate`]: order-independent merge of [`TaskReport`]s into a [`JobOutcome`]
//!
//! # Example
//!
//! ```rust,no_run
//! use gcsout_config::ConfigLoader;
//! use gcsout_core::{JobCoordinator, NullSink, UploadTask};
//! use gcsout_storage::GcsConnector;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().load_with_overrides("gcsout.toml").await?;
//!     let connector = Arc::new(GcsConnector::default());
//!
//!     let job = JobCoordinator::init(&config, connector).await?;
//!     let tasks = vec![
//!         UploadTask::new(0, PathBuf::from("out/part-0.csv")),
//!         UploadTask::new(1, PathBuf::from("out/part-1.csv")),
//!     ];
//!
//!     let outcome = job.run(tasks, &NullSink).await;
//!     let summary = job.finalize(outcome)?;
//!     println!("committed {} objects", summary.objects.len());
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod report;
pub mod resolver;
pub mod session;
pub mod task;

pub use coordinator::{JobCoordinator, JobSummary, NullSink, ReportSink};
pub use descriptor::TaskDescriptor;
pub use engine::{ChunkWrite, ChunkedTransfer};
pub use error::{UploadError, UploadResult};
pub use report::{
    aggregate, aggregate_with_policy, FailureKind, FailurePolicy, JobOutcome, JobStatus, TaskOutcome,
    TaskReport,
};
pub use resolver::CredentialResolver;
pub use session::{SessionState, TransferSession};
pub use task::{ObjectNamer, UploadSource, UploadTask};

pub use gcsout_storage::{Credential, RemoteObject};
