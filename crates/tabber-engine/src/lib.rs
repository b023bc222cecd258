//! `tabber-engine` — the scheduling core: dependency ordering, the
//! per-job due/ongoing decision sequence, and the failure/retry state
//! machine.
//!
//! One invocation walks the configured jobs in dependency (DAG)
//! order. For each job the engine consults the persistent state and
//! the clock, claims the `ongoing` lock, runs the body, and finalizes
//! the record. Jobs run sequentially within an invocation;
//! concurrency across invocations is handled entirely by the store's
//! write lock plus the persisted `ongoing` marker — never by
//! in-process synchronisation.

pub mod dag;
pub mod engine;
pub mod error;
pub mod job;

pub use engine::{
    configure_jobs, is_due, next_run_after_success, resolve_spec_entry, Collision, ConfiguredJob,
    JobReport, SchedulerEngine,
};
pub use error::{EngineError, Result};
pub use job::{Checkpoints, Job, JobContext, JobDescriptor, JobFactory, JobOutcome, JobRegistry};
