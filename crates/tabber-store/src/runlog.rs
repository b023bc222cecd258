use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::instrument;

use tabber_core::types::{JobError, RunLogEntry};

use crate::error::Result;

/// Append-only run history: one row per execution attempt (or per
/// checkpoint of a multi-stage job). Written on every attempt, read
/// only for reporting.
pub struct RunLog {
    conn: Mutex<Connection>,
}

impl RunLog {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Record one successful completion with its wall-clock duration
    /// in seconds.
    #[instrument(skip(self, success))]
    pub fn remember_success(
        &self,
        name: &str,
        success: DateTime<Utc>,
        duration: f64,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crontab_log (app_name, success, duration, logged_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                name,
                success.to_rfc3339(),
                duration,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Record one failed attempt with its structured error detail.
    #[instrument(skip(self, error))]
    pub fn remember_failure(&self, name: &str, duration: f64, error: &JobError) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crontab_log
             (app_name, duration, error_kind, error_message, error_trace, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                name,
                duration,
                error.kind,
                error.message,
                error.trace,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// The most recent `limit` entries for one job, newest first.
    pub fn recent(&self, name: &str, limit: usize) -> Result<Vec<RunLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT app_name, success, duration, error_kind, error_message,
                    error_trace, logged_at
             FROM crontab_log
             WHERE app_name = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![name, limit as i64], row_to_entry)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunLogEntry> {
    let error_kind: Option<String> = row.get(3)?;
    let error_message: Option<String> = row.get(4)?;
    let error = match (error_kind, error_message) {
        (Some(kind), Some(message)) => Some(JobError {
            kind,
            message,
            trace: row.get(5)?,
        }),
        _ => None,
    };
    Ok(RunLogEntry {
        app_name: row.get(0)?,
        success: parse_timestamp(row.get(1)?, 1)?,
        duration: row.get(2)?,
        error,
        logged_at: parse_timestamp(row.get(6)?, 6)?.unwrap_or_default(),
    })
}

fn parse_timestamp(value: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
        .transpose()
}
