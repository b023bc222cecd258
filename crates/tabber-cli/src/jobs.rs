//! Built-in jobs shipped with the binary.

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::info;

use tabber_core::types::JobError;
use tabber_engine::{Job, JobDescriptor, JobOutcome, JobRegistry};

/// Run-log rows older than this are pruned by `runlog-cleanup`.
const RUN_LOG_RETENTION_DAYS: i64 = 90;

/// The registry of jobs this binary knows how to run. Which of them
/// actually run, and on what schedule, is decided by the configured
/// job list.
pub fn builtin_registry(db_path: &str) -> tabber_core::Result<JobRegistry> {
    let mut registry = JobRegistry::new();
    registry.register(JobDescriptor {
        app_name: "heartbeat",
        default_frequency: "5m",
        default_time: None,
        depends_on: &[],
        factory: Box::new(|_ctx| Box::new(Heartbeat)),
    })?;
    let path = db_path.to_string();
    registry.register(JobDescriptor {
        app_name: "runlog-cleanup",
        default_frequency: "7d",
        default_time: Some("06:00"),
        depends_on: &[],
        factory: Box::new(move |_ctx| {
            Box::new(RunLogCleanup {
                db_path: path.clone(),
            })
        }),
    })?;
    Ok(registry)
}

/// Does nothing; its run history shows the scheduler itself is alive.
struct Heartbeat;

impl Job for Heartbeat {
    fn run(&mut self) -> Result<JobOutcome, JobError> {
        info!("heartbeat");
        Ok(JobOutcome::Completed)
    }
}

/// Prunes old rows from the run history so it stays bounded.
struct RunLogCleanup {
    db_path: String,
}

impl Job for RunLogCleanup {
    fn run(&mut self) -> Result<JobOutcome, JobError> {
        let conn = Connection::open(&self.db_path).map_err(sqlite_error)?;
        let cutoff = (Utc::now() - Duration::days(RUN_LOG_RETENTION_DAYS)).to_rfc3339();
        let removed = conn
            .execute("DELETE FROM crontab_log WHERE logged_at < ?1", [cutoff])
            .map_err(sqlite_error)?;
        info!(removed, "pruned old run-log entries");
        Ok(JobOutcome::Completed)
    }
}

fn sqlite_error(e: rusqlite::Error) -> JobError {
    JobError::new("sqlite", e.to_string())
}
