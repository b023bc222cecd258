use rusqlite::Connection;

use crate::error::Result;

/// Open a connection with the pragmas the store relies on: WAL so
/// plain reads never block on a writer, and a zero busy timeout so a
/// contended write fails immediately instead of waiting.
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(std::time::Duration::ZERO)?;
    Ok(conn)
}

/// Initialise the scheduler state schema in `conn` (idempotent).
///
/// `crontab` is the per-job state table, keyed by job name.
/// `crontab_log` is the append-only run history; the index matches
/// the "recent runs of one job" query.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS crontab (
            app_name     TEXT    NOT NULL PRIMARY KEY,
            next_run     TEXT,               -- ISO-8601 or NULL
            first_run    TEXT,
            last_run     TEXT,
            last_success TEXT,
            depends_on   TEXT    NOT NULL DEFAULT '[]',  -- JSON list of app names
            error_count  INTEGER NOT NULL DEFAULT 0,
            last_error   TEXT,               -- JSON {kind,message,trace} or NULL
            ongoing      TEXT                -- in-progress marker, ISO-8601 or NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS crontab_log (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            app_name      TEXT NOT NULL,
            success       TEXT,               -- checkpoint timestamp or NULL
            duration      REAL NOT NULL,      -- fractional seconds
            error_kind    TEXT,
            error_message TEXT,
            error_trace   TEXT,
            logged_at     TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_crontab_log_app
            ON crontab_log (app_name, logged_at DESC);
        ",
    )?;
    Ok(())
}
