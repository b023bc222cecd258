use thiserror::Error;

/// Errors from the persistent state store and run log.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the write lock for this record right now.
    /// Not a bug — it signals "someone else owns this job"; the caller
    /// must abandon the cycle for this job rather than retry against a
    /// live lock.
    #[error("write lock contention on job state for {name}")]
    LockContention { name: String },

    /// No state row exists for the given job.
    #[error("no recorded state for job: {name}")]
    NotFound { name: String },

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A JSON column (`depends_on`, `last_error`) failed to encode.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
