use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistent run state for one job, keyed by its unique name.
///
/// Created lazily on a job's first scheduling attempt, mutated only
/// through the state store's transactional write, deleted only by an
/// explicit administrative reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRunRecord {
    /// When the job is next eligible to run. Absent with no
    /// time-of-day constraint means immediately eligible.
    pub next_run: Option<DateTime<Utc>>,
    /// Set once on the first completed cycle, never overwritten.
    pub first_run: Option<DateTime<Utc>>,
    /// When the job last finished a cycle, success or failure.
    pub last_run: Option<DateTime<Utc>>,
    /// Most recent successful completion.
    pub last_success: Option<DateTime<Utc>>,
    /// Names this job must not run ahead of.
    pub depends_on: Vec<String>,
    /// Consecutive failures; reset to 0 on success.
    pub error_count: u32,
    /// Populated exactly when `error_count > 0`.
    pub last_error: Option<JobError>,
    /// In-progress marker: the long-lived, cross-process logical lock.
    /// Cleared whenever a run terminates, success or failure.
    pub ongoing: Option<DateTime<Utc>>,
}

/// Structured failure detail raised out of a job body and persisted
/// verbatim. Never a live error object — a plain record with a
/// defined JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct JobError {
    /// Stable machine-readable tag, e.g. `io` or `http`.
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl JobError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// One row of the append-only run history. Reporting only — the
/// scheduling decision never reads it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub app_name: String,
    /// Checkpoint timestamp of a successful run; absent on failure.
    pub success: Option<DateTime<Utc>>,
    /// Wall-clock duration in fractional seconds, measured from the
    /// previous checkpoint.
    pub duration: f64,
    pub error: Option<JobError>,
    pub logged_at: DateTime<Utc>,
}
