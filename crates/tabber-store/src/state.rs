use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, instrument};

use tabber_core::types::{JobError, JobRunRecord};

use crate::error::{Result, StoreError};

/// Persistent per-job run state, keyed by job name.
///
/// All mutation goes through [`set`], a single non-blocking write
/// transaction: if another connection holds the write lock the call
/// fails fast with [`StoreError::LockContention`] and nothing is
/// changed. This is the short-lived, storage-layer defense against
/// two scheduler processes mutating the same record; the long-lived
/// `ongoing` marker *inside* the record is the second layer, covering
/// the whole job-body execution window.
///
/// [`set`]: JobStateStore::set
pub struct JobStateStore {
    conn: Mutex<Connection>,
}

const RECORD_COLUMNS: &str = "next_run, first_run, last_run, last_success,
                    depends_on, error_count, last_error, ongoing";

impl JobStateStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Plain read; `None` when the job has never been recorded.
    /// Callers must tolerate staleness between this read and a later
    /// [`set`](JobStateStore::set).
    #[instrument(skip(self))]
    pub fn get(&self, name: &str) -> Result<Option<JobRunRecord>> {
        let conn = self.conn.lock().unwrap();
        match conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM crontab WHERE app_name = ?1"),
            rusqlite::params![name],
            row_to_record,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Transactional upsert under the non-blocking write lock.
    #[instrument(skip(self, record))]
    pub fn set(&self, name: &str, record: &JobRunRecord) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| map_contention(e, name))?;
        tx.execute(
            "INSERT INTO crontab
             (app_name, next_run, first_run, last_run, last_success,
              depends_on, error_count, last_error, ongoing)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(app_name) DO UPDATE SET
                next_run     = excluded.next_run,
                first_run    = excluded.first_run,
                last_run     = excluded.last_run,
                last_success = excluded.last_success,
                depends_on   = excluded.depends_on,
                error_count  = excluded.error_count,
                last_error   = excluded.last_error,
                ongoing      = excluded.ongoing",
            rusqlite::params![
                name,
                record.next_run.map(|t| t.to_rfc3339()),
                record.first_run.map(|t| t.to_rfc3339()),
                record.last_run.map(|t| t.to_rfc3339()),
                record.last_success.map(|t| t.to_rfc3339()),
                serde_json::to_string(&record.depends_on)?,
                record.error_count,
                record
                    .last_error
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                record.ongoing.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| map_contention(e, name))?;
        tx.commit().map_err(|e| map_contention(e, name))?;
        debug!(job = name, "state persisted");
        Ok(())
    }

    /// Delete a job's state entirely (administrative reset).
    #[instrument(skip(self))]
    pub fn delete(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM crontab WHERE app_name = ?1", [name])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        debug!(job = name, "state deleted");
        Ok(())
    }

    /// All recorded `(name, state)` pairs, in name order.
    pub fn list(&self) -> Result<Vec<(String, JobRunRecord)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT app_name, {RECORD_COLUMNS} FROM crontab ORDER BY app_name"
        ))?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let record = named_row_to_record(row, 1)?;
            Ok((name, record))
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Just the recorded job names, in name order.
    pub fn names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT app_name FROM crontab ORDER BY app_name")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn map_contention(e: rusqlite::Error, name: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked =>
        {
            StoreError::LockContention {
                name: name.to_string(),
            }
        }
        _ => StoreError::Database(e),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRunRecord> {
    named_row_to_record(row, 0)
}

/// Columns starting at `base`: next_run, first_run, last_run,
/// last_success, depends_on, error_count, last_error, ongoing.
fn named_row_to_record(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<JobRunRecord> {
    Ok(JobRunRecord {
        next_run: parse_timestamp(row.get(base)?, base)?,
        first_run: parse_timestamp(row.get(base + 1)?, base + 1)?,
        last_run: parse_timestamp(row.get(base + 2)?, base + 2)?,
        last_success: parse_timestamp(row.get(base + 3)?, base + 3)?,
        depends_on: parse_json(Some(row.get(base + 4)?), base + 4)?.unwrap_or_default(),
        error_count: row.get(base + 5)?,
        last_error: parse_json::<JobError>(row.get(base + 6)?, base + 6)?,
        ongoing: parse_timestamp(row.get(base + 7)?, base + 7)?,
    })
}

fn parse_timestamp(value: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| conversion_failure(idx, e))
        })
        .transpose()
}

fn parse_json<T: serde::de::DeserializeOwned>(
    value: Option<String>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    value
        .map(|s| serde_json::from_str(&s).map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

fn conversion_failure(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}
