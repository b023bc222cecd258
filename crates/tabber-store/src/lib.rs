//! `tabber-store` — persistent job state and run history on SQLite.
//!
//! Two tables: `crontab` holds one [`JobRunRecord`] row per job and is
//! mutated only through [`JobStateStore::set`], a non-blocking write
//! transaction that fails fast with a lock-contention error when
//! another process holds the write lock; `crontab_log` is the
//! append-only run history, written on every execution attempt and
//! read only for reporting.
//!
//! [`JobRunRecord`]: tabber_core::JobRunRecord

pub mod db;
pub mod error;
pub mod runlog;
pub mod state;

pub use error::{Result, StoreError};
pub use runlog::RunLog;
pub use state::JobStateStore;
