//! The scheduler engine: per-job decision sequence and the
//! failure/retry state machine.

use std::time::Instant;

use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::{debug, info, instrument, warn};

use tabber_core::config::TabberConfig;
use tabber_core::error::ConfigError;
use tabber_core::spec::{split_spec_list, validate_schedule, JobSpec, TimeOfDay};
use tabber_core::types::{JobError, JobRunRecord, RunLogEntry};
use tabber_store::{JobStateStore, RunLog, StoreError};

use crate::dag;
use crate::error::{EngineError, Result};
use crate::job::{Job, JobContext, JobDescriptor, JobOutcome, JobRegistry};

/// One registry-resolved, schedule-validated job declaration.
#[derive(Debug, Clone)]
pub struct ConfiguredJob {
    pub name: String,
    pub frequency: Duration,
    /// The frequency verbatim (`1h`, `7d`, ...), for display.
    pub frequency_spec: String,
    pub time: Option<TimeOfDay>,
    pub depends_on: Vec<String>,
}

impl ConfiguredJob {
    fn from_spec(spec: &JobSpec, descriptor: &JobDescriptor) -> tabber_core::Result<Self> {
        // A bare name takes the descriptor's whole default schedule;
        // any override in the entry replaces it entirely.
        let (frequency_spec, time_spec) = match &spec.frequency {
            Some(frequency) => (frequency.clone(), spec.time.clone()),
            None => (
                descriptor.default_frequency.to_string(),
                descriptor.default_time.map(String::from),
            ),
        };
        let schedule = validate_schedule(&frequency_spec, time_spec.as_deref())?;
        Ok(Self {
            name: descriptor.app_name.to_string(),
            frequency: schedule.frequency,
            frequency_spec,
            time: schedule.time,
            depends_on: descriptor.depends_on.iter().map(|d| d.to_string()).collect(),
        })
    }

    /// `1h` or `7d @ 06:00`, for listings.
    pub fn schedule_display(&self) -> String {
        match self.time {
            Some(time) => format!("{} @ {}", self.frequency_spec, time),
            None => self.frequency_spec.clone(),
        }
    }
}

/// Resolve one job spec entry against the registry into a validated
/// configured job.
pub fn resolve_spec_entry(
    entry: &str,
    registry: &JobRegistry,
) -> tabber_core::Result<ConfiguredJob> {
    let spec = JobSpec::parse(entry)?;
    let descriptor = registry
        .get(&spec.name)
        .ok_or_else(|| ConfigError::UnknownJob(spec.name.clone()))?;
    ConfiguredJob::from_spec(&spec, descriptor)
}

/// Parse, resolve and dependency-order a full job spec list. All
/// configuration errors surface here, before anything runs.
pub fn configure_jobs(
    spec_list: &str,
    registry: &JobRegistry,
) -> tabber_core::Result<Vec<ConfiguredJob>> {
    let mut jobs: Vec<ConfiguredJob> = Vec::new();
    for entry in split_spec_list(spec_list) {
        let job = resolve_spec_entry(entry, registry)?;
        if jobs.iter().any(|j| j.name == job.name) {
            return Err(ConfigError::JobDescription(format!(
                "duplicate job entry: {}",
                job.name
            )));
        }
        jobs.push(job);
    }
    dag::reorder(jobs)
}

/// First scheduler-infrastructure collision seen during a cycle.
/// Reported distinctly from job failures so operational tooling can
/// tell "scheduler busy" apart from "a job is broken".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    /// Another process won the storage write race for this job.
    LockContention { name: String },
    /// Another process's run of this job is still ongoing.
    Ongoing { name: String },
}

/// A configured job paired with its stored state, for display.
pub struct JobReport<'a> {
    pub job: &'a ConfiguredJob,
    pub state: Option<JobRunRecord>,
}

/// The orchestrator. Holds the DAG-ordered job list and the injected
/// store and run log; one call to [`run_all`] is one scheduling cycle.
///
/// [`run_all`]: SchedulerEngine::run_all
pub struct SchedulerEngine {
    config: TabberConfig,
    registry: JobRegistry,
    jobs: Vec<ConfiguredJob>,
    store: JobStateStore,
    run_log: RunLog,
    error_retry: Duration,
    max_ongoing_age: Duration,
}

impl std::fmt::Debug for SchedulerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerEngine")
            .field("jobs", &self.jobs.len())
            .field("error_retry", &self.error_retry)
            .field("max_ongoing_age", &self.max_ongoing_age)
            .finish_non_exhaustive()
    }
}

impl SchedulerEngine {
    /// Resolve the configured job list against the registry and
    /// establish the dependency order.
    pub fn new(
        config: TabberConfig,
        registry: JobRegistry,
        store: JobStateStore,
        run_log: RunLog,
    ) -> Result<Self> {
        let jobs = configure_jobs(&config.scheduler.jobs, &registry)?;
        let error_retry = Duration::seconds(config.scheduler.error_retry_secs as i64);
        let max_ongoing_age =
            Duration::seconds((config.scheduler.max_ongoing_age_hours * 3600.0) as i64);
        Ok(Self {
            config,
            registry,
            jobs,
            store,
            run_log,
            error_retry,
            max_ongoing_age,
        })
    }

    /// The configured jobs in DAG order.
    pub fn jobs(&self) -> &[ConfiguredJob] {
        &self.jobs
    }

    /// Run every due job once, in dependency order. A job-body
    /// failure never aborts the cycle; a lock or ongoing collision
    /// skips that job and the first one seen becomes the cycle
    /// outcome.
    pub fn run_all(&self) -> Result<Option<Collision>> {
        let mut collision: Option<Collision> = None;
        for job in &self.jobs {
            match self.run_job(job, false, Utc::now()) {
                Ok(()) => {}
                Err(EngineError::OngoingJob { name, since }) => {
                    debug!(job = %name, since = %since, "already ongoing elsewhere, skipping");
                    collision.get_or_insert(Collision::Ongoing { name });
                }
                Err(e) if e.is_lock_contention() => {
                    debug!(job = %job.name, "state row locked by another process, skipping");
                    collision.get_or_insert(Collision::LockContention {
                        name: job.name.clone(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(collision)
    }

    /// Run a single job now. `force` bypasses the due and dependency
    /// checks (but never the locks). Collisions propagate.
    pub fn run_one(&self, name: &str, force: bool) -> Result<()> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.name == name)
            .ok_or_else(|| EngineError::UnknownJob {
                name: name.to_string(),
            })?;
        self.run_job(job, force, Utc::now())
    }

    #[instrument(skip(self, job), fields(job = %job.name))]
    fn run_job(&self, job: &ConfiguredJob, force: bool, now: DateTime<Utc>) -> Result<()> {
        if !force {
            if !self.time_to_run(job, now)? {
                debug!("not due yet, skipping");
                return Ok(());
            }
            if let Some(reason) = self.dependency_block(job, now)? {
                debug!(%reason, "dependencies not satisfied, skipping");
                return Ok(());
            }
        }

        let prior = self.store.get(&job.name)?;
        // Claim the ongoing lock before the body runs. Failing here
        // means the attempt never logically started: no run-log row,
        // no record finalization.
        self.claim_ongoing(job, prior.as_ref(), now)?;
        info!("starting");

        let descriptor = self
            .registry
            .get(&job.name)
            .ok_or_else(|| EngineError::UnknownJob {
                name: job.name.clone(),
            })?;
        let ctx = JobContext {
            config: &self.config,
            state: prior.as_ref(),
        };
        let mut body = (descriptor.factory)(&ctx);

        let mut clock = Instant::now();
        let mut last_success: Option<DateTime<Utc>> = None;
        let mut failure: Option<JobError> = None;

        match body.run() {
            Ok(JobOutcome::Completed) => {
                let success = Utc::now();
                self.run_log
                    .remember_success(&job.name, success, clock.elapsed().as_secs_f64())?;
                last_success = Some(success);
            }
            Ok(JobOutcome::Checkpoints(checkpoints)) => {
                for item in checkpoints {
                    let duration = clock.elapsed().as_secs_f64();
                    clock = Instant::now();
                    match item {
                        Ok(success) => {
                            debug!(checkpoint = %success, "checkpoint reached");
                            self.run_log.remember_success(&job.name, success, duration)?;
                            last_success = Some(success);
                            // Each checkpoint is durable on its own.
                            self.log_run(job, Some(success), None, Utc::now())?;
                        }
                        Err(error) => {
                            self.run_log.remember_failure(&job.name, duration, &error)?;
                            failure = Some(error);
                            break;
                        }
                    }
                }
            }
            Err(error) => {
                self.run_log
                    .remember_failure(&job.name, clock.elapsed().as_secs_f64(), &error)?;
                failure = Some(error);
            }
        }

        match &failure {
            Some(error) => {
                warn!(error = %error, error_kind = %error.kind, "job failed")
            }
            None => info!(last_success = ?last_success, "finished"),
        }
        self.log_run(job, last_success, failure, Utc::now())
    }

    /// Decision step 1: is the job due at `now`?
    pub fn time_to_run(&self, job: &ConfiguredJob, now: DateTime<Utc>) -> Result<bool> {
        let record = self.store.get(&job.name)?;
        Ok(is_due(record.as_ref(), job.time, now))
    }

    /// Decision step 2: `Some(reason)` when a dependency blocks this
    /// job for the current cycle. A routine skip, never an error.
    pub fn dependency_block(
        &self,
        job: &ConfiguredJob,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        for dependency in &job.depends_on {
            let Some(record) = self.store.get(dependency)? else {
                return Ok(Some(format!("{dependency} has never run")));
            };
            if record.last_error.is_some() {
                return Ok(Some(format!("{dependency} errored last time it ran")));
            }
            match record.next_run {
                Some(next_run) if next_run > now => {}
                _ => return Ok(Some(format!("{dependency} hasn't recently run"))),
            }
        }
        Ok(None)
    }

    /// Decision step 4: take the logical ongoing lock and persist it
    /// before the body is invoked. A live marker refuses the start;
    /// a stale one is presumed dead and overridden.
    fn claim_ongoing(
        &self,
        job: &ConfiguredJob,
        prior: Option<&JobRunRecord>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut record = match prior {
            Some(record) => {
                if let Some(since) = record.ongoing {
                    if now - since < self.max_ongoing_age {
                        return Err(EngineError::OngoingJob {
                            name: job.name.clone(),
                            since,
                        });
                    }
                    warn!(
                        job = %job.name,
                        since = %since,
                        "ongoing marker is stale, presuming the previous run dead"
                    );
                }
                record.clone()
            }
            None => JobRunRecord {
                depends_on: job.depends_on.clone(),
                ..JobRunRecord::default()
            },
        };
        record.ongoing = Some(now);
        self.store.set(&job.name, &record)?;
        Ok(())
    }

    /// Decision step 7: finalize the record after an attempt that
    /// logically started, success or failure.
    fn log_run(
        &self,
        job: &ConfiguredJob,
        last_success: Option<DateTime<Utc>>,
        error: Option<JobError>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut record = self.store.get(&job.name)?.unwrap_or_default();
        record.depends_on = job.depends_on.clone();
        if record.first_run.is_none() {
            record.first_run = Some(now);
        }
        record.last_run = Some(now);
        if let Some(success) = last_success {
            record.last_success = Some(success);
        }
        match error {
            Some(error) => {
                // It errored: try again much sooner than the normal
                // cadence, independent of the job's own frequency.
                record.next_run = Some(now + self.error_retry);
                record.error_count += 1;
                record.last_error = Some(error);
            }
            None => {
                record.next_run = Some(next_run_after_success(now, job.frequency, job.time));
                record.error_count = 0;
                record.last_error = None;
            }
        }
        record.ongoing = None;
        self.store.set(&job.name, &record)?;
        Ok(())
    }

    /// Synthesize a zero-duration success for each selected job
    /// without invoking its body. `all` selects every configured job;
    /// otherwise a comma-separated list of names.
    pub fn mark_success(&self, selector: &str) -> Result<()> {
        let jobs = self.select_jobs(selector)?;
        let now = Utc::now();
        for job in jobs {
            info!(job = %job.name, "marking successful");
            self.run_log.remember_success(&job.name, now, 0.0)?;
            self.log_run(job, Some(now), None, now)?;
        }
        Ok(())
    }

    fn select_jobs(&self, selector: &str) -> Result<Vec<&ConfiguredJob>> {
        if selector.eq_ignore_ascii_case("all") {
            return Ok(self.jobs.iter().collect());
        }
        selector
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| {
                self.jobs
                    .iter()
                    .find(|j| j.name == name)
                    .ok_or_else(|| EngineError::UnknownJob {
                        name: name.to_string(),
                    })
            })
            .collect()
    }

    /// Forget a job's state entirely; the next cycle treats it as
    /// never having run.
    pub fn reset_job(&self, name: &str) -> Result<()> {
        if !self.jobs.iter().any(|j| j.name == name) {
            return Err(EngineError::UnknownJob {
                name: name.to_string(),
            });
        }
        match self.store.delete(name) {
            Ok(()) => {
                info!(job = name, "state reset");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(job = name, "already reset");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Names present in the state store with no configured job —
    /// stale records left behind by configuration changes.
    pub fn audit_ghosts(&self) -> Result<Vec<String>> {
        let recorded = self.store.names()?;
        Ok(recorded
            .into_iter()
            .filter(|name| !self.jobs.iter().any(|j| j.name == *name))
            .collect())
    }

    /// Every configured job with its stored state, in DAG order.
    pub fn job_reports(&self) -> Result<Vec<JobReport<'_>>> {
        self.jobs
            .iter()
            .map(|job| {
                Ok(JobReport {
                    job,
                    state: self.store.get(&job.name)?,
                })
            })
            .collect()
    }

    /// Recent run-log entries for one job, newest first. Display
    /// only — scheduling never consults the run log.
    pub fn recent_runs(&self, name: &str, limit: usize) -> Result<Vec<RunLogEntry>> {
        Ok(self.run_log.recent(name, limit)?)
    }
}

/// Pure due check against an optional stored record.
///
/// With no record the job is due immediately, unless a fixed
/// time-of-day is configured, in which case the first run waits until
/// that time has passed at least once today. With a record the job is
/// due iff `next_run` is past — or, when `next_run` is absent, iff a
/// prior attempt left its `ongoing` marker, so the lock path can
/// resolve the limbo.
pub fn is_due(record: Option<&JobRunRecord>, time: Option<TimeOfDay>, now: DateTime<Utc>) -> bool {
    let Some(record) = record else {
        return match time {
            Some(time) => (now.hour(), now.minute()) >= (time.hour, time.minute),
            None => true,
        };
    };
    match record.next_run {
        Some(next_run) => next_run < now,
        None => record.ongoing.is_some(),
    }
}

/// `now + frequency`, then pinned to the fixed time-of-day when one
/// is configured, so daily jobs land on their time regardless of how
/// long the run took.
pub fn next_run_after_success(
    now: DateTime<Utc>,
    frequency: Duration,
    time: Option<TimeOfDay>,
) -> DateTime<Utc> {
    let next = now + frequency;
    match time {
        Some(time) => next
            .with_hour(time.hour)
            .and_then(|t| t.with_minute(time.minute))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(next),
        None => next,
    }
}
