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

//! Upload job coordinator
//!
//! A job runs through three explicit steps:
//!
//! 1. [`JobCoordinator::init`] validates the configuration, resolves the
//!    credential and builds the [`TaskDescriptor`]. Nothing is scheduled if
//!    this fails.
//! 2. [`JobCoordinator::run`] executes the tasks, at most
//!    `max_concurrency` at a time, and hands every report to a
//!    [`ReportSink`] as soon as its task ends.
//! 3. [`JobCoordinator::finalize`] turns the aggregated [`JobOutcome`] into
//!    the job result.
//!
//! Each task runs open, transfer, then commit on its own session. The store
//! client is built from the credential on first use and shared by all
//! tasks of the job.

use crate::descriptor::TaskDescriptor;
use crate::engine;
use crate::error::{UploadError, UploadResult};
use crate::report::{aggregate_with_policy, FailureKind, FailurePolicy, JobOutcome, JobStatus, TaskReport};
use crate::resolver::CredentialResolver;
use crate::session::{SessionState, TransferSession};
use crate::task::{ObjectNamer, UploadTask};
use chrono::{DateTime, Utc};
use gcsout_config::{Config, Validator};
use gcsout_storage::{Credential, ObjectStore, RemoteObject, StoreConnector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, OnceCell, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Receives each task report as soon as its task ends
///
/// Called once per task, from the coordinator's own task, in completion
/// order.
pub trait ReportSink: Send + Sync {
    /// Accept one report
    fn report(&self, report: &TaskReport);
}

/// Sink that drops every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn report(&self, _report: &TaskReport) {}
}

impl ReportSink for mpsc::UnboundedSender<TaskReport> {
    fn report(&self, report: &TaskReport) {
        if self.send(report.clone()).is_err() {
            debug!(task_index = report.task_index(), "Report receiver dropped");
        }
    }
}

/// Result of a successful job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    /// Committed objects in task order
    pub objects: Vec<RemoteObject>,
    pub bytes_committed: u64,
    /// Tasks that failed but were tolerated by the failure policy
    pub tolerated_failures: usize,
    pub finished_at: DateTime<Utc>,
}

struct Inner {
    descriptor: TaskDescriptor,
    namer: ObjectNamer,
    credential: Credential,
    connector: Arc<dyn StoreConnector>,
    store: OnceCell<Arc<dyn ObjectStore>>,
    policy: FailurePolicy,
    cancel: CancellationToken,
}

/// Runs the tasks of one upload job
///
/// Cheap to clone; clones share the job state, the store client and the
/// cancellation token.
#[derive(Clone)]
pub struct JobCoordinator {
    inner: Arc<Inner>,
}

impl JobCoordinator {
    /// Validate `config`, resolve the credential and prepare the job
    ///
    /// With `delete_in_advance` set, every object under `path_prefix` is
    /// deleted here, before any task can run.
    pub async fn init(config: &Config, connector: Arc<dyn StoreConnector>) -> UploadResult<Self> {
        config.validate()?;
        let credential = CredentialResolver::new().resolve(&config.output).await?;
        let descriptor = TaskDescriptor::from_config(config);

        info!(
            job_id = %descriptor.job_id,
            bucket = %descriptor.bucket,
            path_prefix = %descriptor.path_prefix,
            auth_method = %descriptor.auth_method,
            chunk_size = descriptor.chunk_size,
            max_concurrency = descriptor.max_concurrency,
            "Initialized upload job"
        );

        let coordinator = JobCoordinator {
            inner: Arc::new(Inner {
                namer: descriptor.namer(),
                descriptor,
                credential,
                connector,
                store: OnceCell::new(),
                policy: FailurePolicy::from_config(&config.job),
                cancel: CancellationToken::new(),
            }),
        };

        if config.output.delete_in_advance {
            coordinator.delete_in_advance().await?;
        }

        Ok(coordinator)
    }

    /// Settings shared by every task of this job
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.inner.descriptor
    }

    /// How many task failures the job tolerates
    pub fn policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    /// Token cancelling every task of this job
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Cancel the job: running tasks abort their sessions, pending ones never start
    pub fn cancel(&self) {
        info!(job_id = %self.inner.descriptor.job_id, "Cancelling upload job");
        self.inner.cancel.cancel();
    }

    /// Object key for a task
    pub fn task_key(&self, task: &UploadTask) -> UploadResult<String> {
        match &task.key {
            Some(key) => Ok(key.clone()),
            None => Ok(self.inner.namer.name(task.index, task.file_index)?),
        }
    }

    async fn store(&self) -> UploadResult<Arc<dyn ObjectStore>> {
        let store = self
            .inner
            .store
            .get_or_try_init(|| async {
                debug!(credential = self.inner.credential.kind(), "Connecting to object store");
                self.inner
                    .connector
                    .connect(&self.inner.credential)
                    .await
                    .map_err(UploadError::from)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    async fn delete_in_advance(&self) -> UploadResult<usize> {
        let store = self.store().await?;
        let bucket = &self.inner.descriptor.bucket;
        let prefix = &self.inner.descriptor.path_prefix;

        let keys = store.list_objects(bucket, prefix).await?;
        for key in &keys {
            store.delete(bucket, key).await?;
            debug!(bucket = %bucket, key = %key, "Deleted existing object");
        }

        info!(bucket = %bucket, prefix = %prefix, deleted = keys.len(), "Deleted objects in advance");
        Ok(keys.len())
    }

    /// Open an upload session for task `task_index` writing `key`
    pub async fn open(&self, task_index: usize, key: impl Into<String>) -> UploadResult<TransferSession> {
        let store = self.store().await?;
        let descriptor = &self.inner.descriptor;
        TransferSession::open(
            store,
            task_index,
            descriptor.target(key),
            descriptor.chunk_size,
            descriptor.retry,
            self.inner.cancel.clone(),
        )
        .await
    }

    /// Finish a session: commit it if `result` is `Ok`, abort it otherwise
    ///
    /// A session whose chunk write already failed is aborted even when
    /// `result` is `Ok`.
    pub async fn commit(&self, mut session: TransferSession, result: UploadResult<()>) -> TaskReport {
        let index = session.task_index();
        let committed = match result {
            Ok(()) if session.state() == SessionState::Failed => Err(UploadError::TaskFailure {
                task_index: index,
                reason: format!(
                    "commit requested after a failed chunk write ({} bytes persisted)",
                    session.persisted()
                ),
            }),
            Ok(()) => session.commit().await,
            Err(e) => Err(e),
        };

        match committed {
            Ok(object) => {
                info!(
                    task_index = index,
                    key = %object.name,
                    size = object.size,
                    retries = session.retries(),
                    "Committed task output"
                );
                TaskReport::committed(index, object, session.retries())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort().await {
                    warn!(task_index = index, error = %abort_err, "Could not abort upload session");
                }
                self.failure_report(index, &session.target().key, e, session.persisted(), session.retries())
            }
        }
    }

    /// Run one task end to end; never fails, the report carries the outcome
    pub async fn run_task(&self, task: UploadTask) -> TaskReport {
        let index = task.index;
        let key = match self.task_key(&task) {
            Ok(key) => key,
            Err(e) => return self.failure_report(index, "", e, 0, 0),
        };

        if self.inner.cancel.is_cancelled() {
            debug!(task_index = index, key = %key, "Task cancelled before start");
            return TaskReport::cancelled(index, key, 0);
        }

        let mut session = match self.open(index, key.clone()).await {
            Ok(session) => session,
            Err(e) => return self.failure_report(index, &key, e, 0, 0),
        };

        let result = engine::transfer(&mut session, task.source, &self.inner.cancel).await;
        self.commit(session, result).await
    }

    /// Run `tasks` and aggregate their reports
    pub async fn run(&self, tasks: Vec<UploadTask>, sink: &dyn ReportSink) -> JobOutcome {
        let descriptor = &self.inner.descriptor;
        let semaphore = Arc::new(Semaphore::new(descriptor.max_concurrency.max(1)));
        let mut set = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();

        info!(job_id = %descriptor.job_id, tasks = tasks.len(), "Starting upload tasks");

        for task in tasks {
            let label = (task.index, self.task_key(&task).unwrap_or_default());
            let span = info_span!("upload_task", job_id = %descriptor.job_id, task_index = label.0, key = %label.1);
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);

            let task_future = async move {
                // Hold permit until the task completes
                let _permit = tokio::select! {
                    biased;

                    () = this.inner.cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                this.run_task(task).await
            };
            let handle = set.spawn(task_future.instrument(span));
            spawned.insert(handle.id(), label);
        }

        let mut reports = Vec::with_capacity(spawned.len());
        while let Some(joined) = set.join_next_with_id().await {
            let report = match joined {
                Ok((id, report)) => {
                    spawned.remove(&id);
                    report
                }
                Err(e) => {
                    let (index, key) = spawned.remove(&e.id()).unwrap_or_default();
                    error!(task_index = index, key = %key, error = %e, "Upload task panicked");
                    TaskReport::failed(index, key, FailureKind::Internal, format!("task panicked: {}", e), 0, 0)
                }
            };
            sink.report(&report);
            reports.push(report);
        }

        aggregate_with_policy(reports, self.inner.policy)
    }

    /// Turn the job outcome into the job result
    pub fn finalize(&self, outcome: JobOutcome) -> UploadResult<JobSummary> {
        let job_id = self.inner.descriptor.job_id;

        match outcome.status {
            JobStatus::Succeeded => {
                info!(
                    job_id = %job_id,
                    committed = outcome.succeeded,
                    failed = outcome.failed,
                    bytes = outcome.bytes_committed,
                    "Upload job succeeded"
                );
                Ok(JobSummary {
                    job_id,
                    objects: outcome.committed_objects().cloned().collect(),
                    bytes_committed: outcome.bytes_committed,
                    tolerated_failures: outcome.failed,
                    finished_at: Utc::now(),
                })
            }
            JobStatus::Cancelled => {
                warn!(job_id = %job_id, cancelled = outcome.cancelled, "Upload job cancelled");
                Err(UploadError::Cancelled)
            }
            JobStatus::Failed => {
                for report in outcome.failures() {
                    error!(task_index = report.task_index(), key = %report.key(), outcome = ?report.outcome(), "Task failed");
                }
                error!(job_id = %job_id, "{}", outcome);
                Err(UploadError::JobFailed {
                    succeeded: outcome.succeeded,
                    failed: outcome.failed,
                    cancelled: outcome.cancelled,
                    total: outcome.total(),
                })
            }
        }
    }

    fn failure_report(&self, index: usize, key: &str, err: UploadError, bytes_sent: u64, retries: u32) -> TaskReport {
        if err.is_cancelled() {
            debug!(task_index = index, key = %key, "Task cancelled");
            return TaskReport::cancelled(index, key, bytes_sent);
        }

        if err.is_fatal_for_job() {
            error!(task_index = index, key = %key, error = %err, "Fatal error, aborting upload job");
            self.inner.cancel.cancel();
        } else {
            error!(task_index = index, key = %key, error = %err, "Upload task failed");
        }

        TaskReport::failed(index, key, err.failure_kind(), err.to_string(), bytes_sent, retries)
    }
}

impl fmt::Debug for JobCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("descriptor", &self.inner.descriptor)
            .field("credential", &self.inner.credential)
            .field("policy", &self.inner.policy)
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
