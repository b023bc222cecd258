//! The job implementation contract and the statically typed registry.

use chrono::{DateTime, Utc};

use tabber_core::config::TabberConfig;
use tabber_core::error::ConfigError;
use tabber_core::types::{JobError, JobRunRecord};

/// Checkpoint timestamps a multi-stage job reports as it works
/// through a batch. Consumed synchronously by the engine; each `Ok`
/// is persisted before the next item is pulled, so a crash mid-batch
/// loses at most the stage in flight.
pub type Checkpoints = Box<dyn Iterator<Item = std::result::Result<DateTime<Utc>, JobError>>>;

/// What a job body produced.
pub enum JobOutcome {
    /// Ran to completion; the engine stamps one implicit success.
    Completed,
    /// Zero or more discrete checkpoint successes.
    Checkpoints(Checkpoints),
}

/// A schedulable unit of work. A fresh instance is constructed for
/// every attempt via the descriptor's factory.
pub trait Job {
    fn run(&mut self) -> std::result::Result<JobOutcome, JobError>;
}

/// Everything a job factory gets to see: the current configuration
/// and the job's prior run state, if any.
pub struct JobContext<'a> {
    pub config: &'a TabberConfig,
    pub state: Option<&'a JobRunRecord>,
}

pub type JobFactory = Box<dyn Fn(&JobContext<'_>) -> Box<dyn Job>>;

/// Static metadata registered for a job implementation at startup.
pub struct JobDescriptor {
    /// Unique, stable identifier; also the state-table key.
    pub app_name: &'static str,
    /// Frequency used when the job spec does not override it.
    pub default_frequency: &'static str,
    /// Optional default `HH:MM` (UTC) pin.
    pub default_time: Option<&'static str>,
    /// Jobs this one must not run ahead of.
    pub depends_on: &'static [&'static str],
    pub factory: JobFactory,
}

/// Startup-time job registry: the statically typed replacement for
/// resolving job implementations from strings at run time. The
/// scheduler consumes only this. Declaration order is preserved so
/// dependency-order tie-breaking stays deterministic.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Vec<JobDescriptor>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; names must be unique.
    pub fn register(&mut self, descriptor: JobDescriptor) -> tabber_core::Result<()> {
        if self.jobs.iter().any(|d| d.app_name == descriptor.app_name) {
            return Err(ConfigError::JobDescription(format!(
                "duplicate job name: {}",
                descriptor.app_name
            )));
        }
        self.jobs.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JobDescriptor> {
        self.jobs.iter().find(|d| d.app_name == name)
    }

    /// Descriptors in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &JobDescriptor> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
