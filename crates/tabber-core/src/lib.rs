//! `tabber-core` — shared foundation for the tabber workspace.
//!
//! Holds the configuration surface (TOML file + `TABBER_` env
//! overrides), the job-specification grammar (`name|frequency|time`),
//! and the persisted data model shared by the store and the engine.

pub mod config;
pub mod error;
pub mod spec;
pub mod types;

pub use config::TabberConfig;
pub use error::{ConfigError, Result};
pub use spec::{JobSpec, TimeOfDay};
pub use types::{JobError, JobRunRecord, RunLogEntry};
