use chrono::{DateTime, Utc};
use thiserror::Error;

use tabber_store::StoreError;

/// Errors surfacing from a scheduling operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The job's `ongoing` marker is held by a live run elsewhere. A
    /// soft collision with another scheduler process, not a job
    /// failure — the record itself is intact, its content forbids
    /// starting.
    #[error("job {name} is already ongoing (started {since})")]
    OngoingJob {
        name: String,
        since: DateTime<Utc>,
    },

    /// The name is not among the configured jobs.
    #[error("unknown job: {name}")]
    UnknownJob { name: String },

    #[error(transparent)]
    Config(#[from] tabber_core::ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// True for the storage-layer lock-contention signal: another
    /// process won the write race for this record. Distinct from both
    /// job failures and the soft [`OngoingJob`] collision.
    ///
    /// [`OngoingJob`]: EngineError::OngoingJob
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, EngineError::Store(StoreError::LockContention { .. }))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
