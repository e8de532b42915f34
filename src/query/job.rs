//! Job-status records for background queries.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one query job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Registered, worker not started yet.
    Pending,
    /// Worker is talking to the instrument.
    InProgress,
    /// Fields were stored.
    Completed,
    /// The exchange or the store failed; see `error`.
    Failed,
    /// Stopped by the user.
    Cancelled,
    /// Reported for unknown (analyzer, job) pairs; never stored
    NotFound,
}

impl JobState {
    /// Name as reported to pollers.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::NotFound => "not_found",
        }
    }

    /// Terminal jobs are never modified again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Jobs are addressed by analyzer and job id together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    /// Analyzer the job queries.
    pub analyzer_id: String,
    /// Job id, unique per analyzer.
    pub job_id: String,
}

impl JobKey {
    /// Key for `job_id` on `analyzer_id`.
    pub fn new(analyzer_id: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self {
            analyzer_id: analyzer_id.into(),
            job_id: job_id.into(),
        }
    }
}

/// Progress record a poller reads while a query runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryJob {
    /// Analyzer the job queries.
    pub analyzer_id: String,
    /// Job id.
    pub job_id: String,
    /// When the job was registered.
    pub created_at: DateTime<Utc>,
    /// Current state.
    pub state: JobState,
    /// 0 to 100
    pub progress: u8,
    /// `[HH:MM:SS.mmm] message` lines, oldest first
    pub logs: Vec<String>,
    /// Fields stored on completion.
    pub fields_count: usize,
    /// Failure text when `state` is failed.
    pub error: Option<String>,
}

impl QueryJob {
    /// A pending job with no progress.
    pub fn new(key: &JobKey) -> Self {
        Self {
            analyzer_id: key.analyzer_id.clone(),
            job_id: key.job_id.clone(),
            created_at: Utc::now(),
            state: JobState::Pending,
            progress: 0,
            logs: Vec::new(),
            fields_count: 0,
            error: None,
        }
    }

    /// Placeholder returned for unknown keys.
    pub fn not_found(key: &JobKey) -> Self {
        Self {
            state: JobState::NotFound,
            ..Self::new(key)
        }
    }

    /// Append a timestamped log line.
    pub fn log(&mut self, message: impl AsRef<str>) {
        let stamp = Utc::now().format("%H:%M:%S%.3f");
        self.logs.push(format!("[{stamp}] {}", message.as_ref()));
    }
}

/// Shared map of query jobs keyed by (analyzer id, job id).
///
/// Readers get copies. Once a job is terminal, updates to it are dropped.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobKey, QueryJob>>>,
}

impl JobRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a job.
    pub fn insert(&self, job: QueryJob) {
        let key = JobKey::new(job.analyzer_id.clone(), job.job_id.clone());
        self.jobs.write().insert(key, job);
    }

    /// Copy of the job's current record.
    pub fn snapshot(&self, key: &JobKey) -> Option<QueryJob> {
        self.jobs.read().get(key).cloned()
    }

    /// Apply `f` to a live job. Returns false when the job is missing or terminal.
    pub fn update(&self, key: &JobKey, f: impl FnOnce(&mut QueryJob)) -> bool {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(key) {
            Some(job) if !job.state.is_terminal() => {
                f(job);
                true
            }
            _ => false,
        }
    }

    /// Flag a live job as cancelled. The worker notices at its next checkpoint.
    pub fn cancel(&self, key: &JobKey) -> bool {
        self.update(key, |job| {
            job.state = JobState::Cancelled;
            job.log("Query cancelled by user");
        })
    }

    /// Whether the user cancelled the job.
    pub fn is_cancelled(&self, key: &JobKey) -> bool {
        self.jobs
            .read()
            .get(key)
            .is_some_and(|job| job.state == JobState::Cancelled)
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Whether no job is registered.
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}
