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

//! Per-task reports and the job-level verdict
//!
//! Every task produces exactly one [`TaskReport`]. [`aggregate`] folds any
//! collection of reports into a [`JobOutcome`]; the result does not depend on
//! the order the reports arrive in, and feeding the same report twice changes
//! nothing. When two different reports carry the same task index the more
//! severe one wins (failed over cancelled over committed).

use gcsout_config::JobConfig;
use gcsout_storage::RemoteObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a task failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Invalid settings or key material
    Configuration,
    /// Credential rejected by the store
    Authentication,
    /// Chunk retries exhausted
    TransientTransfer,
    /// Non-retryable store error
    Storage,
    /// Local source could not be read
    Source,
    /// The task panicked or hit an internal invariant
    Internal,
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Object finalized and visible
    Committed {
        /// Identity of the committed object
        object: RemoteObject,
    },
    /// The task stopped before committing
    Cancelled,
    /// The session was aborted
    Failed {
        /// Failure category
        kind: FailureKind,
        /// Error message
        message: String,
    },
}

impl TaskOutcome {
    /// Rank used to pick between conflicting reports for one task
    pub fn severity(&self) -> u8 {
        match self {
            TaskOutcome::Committed { .. } => 0,
            TaskOutcome::Cancelled => 1,
            TaskOutcome::Failed { .. } => 2,
        }
    }
}

/// Immutable record of how one task ended
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskReport {
    task_index: usize,
    key: String,
    bytes_sent: u64,
    retries: u32,
    outcome: TaskOutcome,
}

impl TaskReport {
    /// Report for a task whose object was committed
    pub fn committed(task_index: usize, object: RemoteObject, retries: u32) -> Self {
        TaskReport {
            task_index,
            key: object.name.clone(),
            bytes_sent: object.size,
            retries,
            outcome: TaskOutcome::Committed { object },
        }
    }

    /// Report for a task that failed
    pub fn failed(
        task_index: usize,
        key: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
        bytes_sent: u64,
        retries: u32,
    ) -> Self {
        TaskReport {
            task_index,
            key: key.into(),
            bytes_sent,
            retries,
            outcome: TaskOutcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    /// Report for a task that was cancelled
    pub fn cancelled(task_index: usize, key: impl Into<String>, bytes_sent: u64) -> Self {
        TaskReport {
            task_index,
            key: key.into(),
            bytes_sent,
            retries: 0,
            outcome: TaskOutcome::Cancelled,
        }
    }

    /// Index of the task this report belongs to
    pub fn task_index(&self) -> usize {
        self.task_index
    }

    /// Target object key, empty when naming itself failed
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes acknowledged by the store
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Chunk write retries the task needed
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// How the task ended
    pub fn outcome(&self) -> &TaskOutcome {
        &self.outcome
    }

    /// Whether the object was committed
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Committed { .. })
    }

    /// Whether the task failed
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Failed { .. })
    }

    /// Whether the task was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Cancelled)
    }

    /// The committed object, if any
    pub fn object(&self) -> Option<&RemoteObject> {
        match &self.outcome {
            TaskOutcome::Committed { object } => Some(object),
            _ => None,
        }
    }
}

/// When a job with some failed tasks still counts as successful
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Every task must commit
    #[default]
    RequireAll,
    /// At least this many tasks must commit
    MinSucceeded(usize),
}

impl FailurePolicy {
    /// Policy for the `[job]` settings
    pub fn from_config(job: &JobConfig) -> Self {
        match job.min_succeeded {
            Some(n) => FailurePolicy::MinSucceeded(n),
            None => FailurePolicy::RequireAll,
        }
    }
}

/// Job verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// Aggregate of all task reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Verdict under the policy used
    pub status: JobStatus,
    /// One report per task index, sorted by index
    pub reports: Vec<TaskReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Bytes in committed objects
    pub bytes_committed: u64,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Distinct tasks reported
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Objects committed by the job, in task order
    pub fn committed_objects(&self) -> impl Iterator<Item = &RemoteObject> {
        self.reports.iter().filter_map(TaskReport::object)
    }

    /// Reports of failed tasks, in task order
    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.reports.iter().filter(|r| r.is_failed())
    }

    /// Report for one task index
    pub fn report(&self, task_index: usize) -> Option<&TaskReport> {
        self.reports
            .binary_search_by_key(&task_index, TaskReport::task_index)
            .ok()
            .map(|i| &self.reports[i])
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {}: {} of {} tasks committed, {} failed, {} cancelled",
            self.status,
            self.succeeded,
            self.total(),
            self.failed,
            self.cancelled
        )
    }
}

/// Merge reports into a job outcome requiring every task to commit
pub fn aggregate<I>(reports: I) -> JobOutcome
where
    I: IntoIterator<Item = TaskReport>,
{
    aggregate_with_policy(reports, FailurePolicy::RequireAll)
}

/// Merge reports into a job outcome under `policy`
pub fn aggregate_with_policy<I>(reports: I, policy: FailurePolicy) -> JobOutcome
where
    I: IntoIterator<Item = TaskReport>,
{
    let mut by_task: BTreeMap<usize, TaskReport> = BTreeMap::new();
    for report in reports {
        let replace = by_task
            .get(&report.task_index)
            .is_none_or(|existing| rank(existing) < rank(&report));
        if replace {
            by_task.insert(report.task_index, report);
        }
    }

    let reports: Vec<TaskReport> = by_task.into_values().collect();
    let succeeded = reports.iter().filter(|r| r.is_committed()).count();
    let failed = reports.iter().filter(|r| r.is_failed()).count();
    let cancelled = reports.iter().filter(|r| r.is_cancelled()).count();
    let bytes_committed = reports
        .iter()
        .filter_map(TaskReport::object)
        .map(|o| o.size)
        .sum();

    let status = match policy {
        FailurePolicy::RequireAll if failed > 0 => JobStatus::Failed,
        FailurePolicy::RequireAll if cancelled > 0 => JobStatus::Cancelled,
        FailurePolicy::RequireAll => JobStatus::Succeeded,
        FailurePolicy::MinSucceeded(n) if succeeded >= n => JobStatus::Succeeded,
        FailurePolicy::MinSucceeded(_) if failed == 0 && cancelled > 0 => JobStatus::Cancelled,
        FailurePolicy::MinSucceeded(_) => JobStatus::Failed,
    };

    JobOutcome {
        status,
        reports,
        succeeded,
        failed,
        cancelled,
        bytes_committed,
    }
}

// Total order so duplicate resolution does not depend on arrival order
fn rank(report: &TaskReport) -> (u8, &TaskReport) {
    (report.outcome.severity(), report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn object(name: &str, size: u64) -> RemoteObject {
        RemoteObject {
            bucket: "bucket".to_string(),
            name: name.to_string(),
            size,
            generation: Some(1),
            md5_hash: None,
            crc32c: None,
        }
    }

    fn ok(index: usize, size: u64) -> TaskReport {
        TaskReport::committed(index, object(&format!("out.{:03}", index), size), 0)
    }

    fn failed(index: usize) -> TaskReport {
        TaskReport::failed(index, format!("out.{:03}", index), FailureKind::Storage, "boom", 0, 0)
    }

    #[test]
    fn test_all_committed() {
        let outcome = aggregate(vec![ok(0, 10), ok(1, 20), ok(2, 30)]);
        assert!(outcome.is_success());
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.bytes_committed, 60);
        assert_eq!(outcome.committed_objects().count(), 3);
    }

    #[test]
    fn test_any_failure_fails_job() {
        let outcome = aggregate(vec![ok(0, 1), failed(1), ok(2, 1)]);
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.failures().map(|r| r.task_index()).collect::<Vec<_>>(), vec![1]);
        assert_eq!(outcome.to_string(), "job failed: 2 of 3 tasks committed, 1 failed, 0 cancelled");
    }

    #[test]
    fn test_cancelled_without_failure() {
        let outcome = aggregate(vec![ok(0, 1), TaskReport::cancelled(1, "k", 0)]);
        assert_eq!(outcome.status, JobStatus::Cancelled);

        let outcome = aggregate(vec![failed(0), TaskReport::cancelled(1, "k", 0)]);
        assert_eq!(outcome.status, JobStatus::Failed);
    }

    #[test]
    fn test_empty_job_succeeds() {
        assert!(aggregate(Vec::new()).is_success());
    }

    #[test]
    fn test_duplicate_resolves_to_most_severe() {
        let outcome = aggregate(vec![ok(0, 5), failed(0)]);
        assert_eq!(outcome.total(), 1);
        assert!(outcome.report(0).unwrap().is_failed());

        let outcome = aggregate(vec![failed(0), ok(0, 5)]);
        assert!(outcome.report(0).unwrap().is_failed());
    }

    #[test]
    fn test_min_succeeded_policy() {
        let reports = vec![ok(0, 1), failed(1), ok(2, 1)];
        let outcome = aggregate_with_policy(reports.clone(), FailurePolicy::MinSucceeded(2));
        assert!(outcome.is_success());

        let outcome = aggregate_with_policy(reports, FailurePolicy::MinSucceeded(3));
        assert_eq!(outcome.status, JobStatus::Failed);
    }

    #[test]
    fn test_policy_from_config() {
        assert_eq!(FailurePolicy::from_config(&JobConfig::default()), FailurePolicy::RequireAll);
        let job = JobConfig { min_succeeded: Some(4) };
        assert_eq!(FailurePolicy::from_config(&job), FailurePolicy::MinSucceeded(4));
    }

    #[test]
    fn test_report_serializes_with_status_tag() {
        let json = serde_json::to_value(failed(3)).unwrap();
        assert_eq!(json["task_index"], 3);
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "storage");
    }

    fn report_strategy() -> impl Strategy<Value = TaskReport> {
        (0usize..6, 0u8..3, 0u64..1000).prop_map(|(index, which, size)| match which {
            0 => ok(index, size),
            1 => TaskReport::cancelled(index, format!("out.{:03}", index), size),
            _ => failed(index),
        })
    }

    proptest! {
        #[test]
        fn prop_aggregate_is_order_independent(
            reports in proptest::collection::vec(report_strategy(), 0..20)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let (original, shuffled) = reports;
            prop_assert_eq!(aggregate(original), aggregate(shuffled));
        }

        #[test]
        fn prop_aggregate_is_idempotent(reports in proptest::collection::vec(report_strategy(), 0..20)) {
            let once = aggregate(reports.clone());
            let twice = aggregate(reports.iter().cloned().chain(reports.iter().cloned()));
            prop_assert_eq!(once.clone(), twice);
            prop_assert_eq!(aggregate(once.reports.clone()), once);
        }
    }
}
