use std::process::ExitCode;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use tabber_core::config::TabberConfig;
use tabber_core::spec::split_spec_list;
use tabber_engine::{resolve_spec_entry, Collision, EngineError, JobReport, SchedulerEngine};
use tabber_store::{db, JobStateStore, RunLog};

mod jobs;

// Exit codes are part of the surface: wrappers key off them.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG: u8 = 1;
const EXIT_LOCK_CONTENTION: u8 = 2;
const EXIT_ONGOING: u8 = 3;

#[derive(Parser)]
#[command(name = "tabber", version, about = "Dependency-aware persistent job scheduler")]
struct Cli {
    /// Config file (default: $TABBER_CONFIG, then ~/.tabber/tabber.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every due job once, in dependency order (the default)
    Run,
    /// Run a single job now
    RunOne {
        name: String,
        /// Skip the due and dependency checks (locks still apply)
        #[arg(long)]
        force: bool,
    },
    /// Show every configured job with its state and recent runs
    ListJobs,
    /// Stamp a success without running anything ("all" or a comma list)
    MarkSuccess { names: String },
    /// Forget a job's state so it starts over from scratch
    ResetJob { name: String },
    /// List state records whose job is no longer configured
    AuditGhosts,
    /// Validate the configured job list and exit
    CheckConfig,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabber=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    // config: explicit flag > TABBER_CONFIG env > ~/.tabber/tabber.toml
    let config_path = cli.config.or_else(|| std::env::var("TABBER_CONFIG").ok());
    let config = TabberConfig::load(config_path.as_deref())?;
    let command = cli.command.unwrap_or(Command::Run);

    // check-config never touches the database.
    if let Command::CheckConfig = command {
        return check_config(&config);
    }

    let engine = build_engine(config)?;
    match command {
        Command::Run => {
            let collision = engine.run_all()?;
            Ok(match collision {
                None => EXIT_OK,
                Some(Collision::LockContention { name }) => {
                    warn!(job = %name, "skipped: state row locked by another scheduler");
                    EXIT_LOCK_CONTENTION
                }
                Some(Collision::Ongoing { name }) => {
                    warn!(job = %name, "skipped: still ongoing in another scheduler");
                    EXIT_ONGOING
                }
            })
        }
        Command::RunOne { name, force } => match engine.run_one(&name, force) {
            Ok(()) => Ok(EXIT_OK),
            Err(e) if e.is_lock_contention() => {
                eprintln!("{name}: state row locked by another scheduler");
                Ok(EXIT_LOCK_CONTENTION)
            }
            Err(EngineError::OngoingJob { name, since }) => {
                eprintln!("{name}: already ongoing since {since}");
                Ok(EXIT_ONGOING)
            }
            Err(e) => Err(e.into()),
        },
        Command::ListJobs => {
            list_jobs(&engine)?;
            Ok(EXIT_OK)
        }
        Command::MarkSuccess { names } => {
            engine.mark_success(&names)?;
            Ok(EXIT_OK)
        }
        Command::ResetJob { name } => {
            engine.reset_job(&name)?;
            Ok(EXIT_OK)
        }
        Command::AuditGhosts => {
            let ghosts = engine.audit_ghosts()?;
            if ghosts.is_empty() {
                println!("no ghost records");
            } else {
                for name in ghosts {
                    println!("{name}");
                }
            }
            Ok(EXIT_OK)
        }
        Command::CheckConfig => unreachable!("handled above"),
    }
}

fn build_engine(config: TabberConfig) -> anyhow::Result<SchedulerEngine> {
    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = db::open(&db_path)?;
    db::init_db(&conn)?;

    // each subsystem gets its own connection for thread safety
    let store = JobStateStore::new(conn);
    let run_log = RunLog::new(db::open(&db_path)?);
    let registry = jobs::builtin_registry(&db_path)?;
    Ok(SchedulerEngine::new(config, registry, store, run_log)?)
}

/// Validate every configured entry, reporting all failures rather than
/// stopping at the first.
fn check_config(config: &TabberConfig) -> anyhow::Result<u8> {
    let registry = jobs::builtin_registry(&config.database.path)?;
    let mut failures: Vec<String> = Vec::new();
    for entry in split_spec_list(&config.scheduler.jobs) {
        if let Err(e) = resolve_spec_entry(entry, &registry) {
            failures.push(format!("{entry}: {e}"));
        }
    }
    if failures.is_empty() {
        // Entries are individually fine; check the dependency graph.
        if let Err(e) = tabber_engine::configure_jobs(&config.scheduler.jobs, &registry) {
            failures.push(e.to_string());
        }
    }

    if failures.is_empty() {
        let count = split_spec_list(&config.scheduler.jobs).len();
        println!("configuration ok ({count} jobs)");
        Ok(EXIT_OK)
    } else {
        for failure in &failures {
            eprintln!("invalid: {failure}");
        }
        Ok(EXIT_CONFIG)
    }
}

fn list_jobs(engine: &SchedulerEngine) -> anyhow::Result<()> {
    let now = Utc::now();
    for report in engine.job_reports()? {
        print_report(&report, now);
        for entry in engine.recent_runs(&report.job.name, 3)? {
            match &entry.error {
                Some(error) => println!("      {}  FAIL  {}", entry.logged_at, error),
                None => println!("      {}  ok    ({:.2}s)", entry.logged_at, entry.duration),
            }
        }
    }
    Ok(())
}

fn print_report(report: &JobReport<'_>, now: DateTime<Utc>) {
    let job = report.job;
    println!("=== {} ({})", job.name, job.schedule_display());
    if !job.depends_on.is_empty() {
        println!("    depends on: {}", job.depends_on.join(", "));
    }
    let Some(state) = &report.state else {
        println!("    never run");
        return;
    };
    if let Some(since) = state.ongoing {
        println!("    ONGOING since {} ({})", since, ago(now, since));
    }
    match state.last_run {
        Some(last_run) => println!("    last run     {} ({})", last_run, ago(now, last_run)),
        None => println!("    last run     never"),
    }
    if let Some(last_success) = state.last_success {
        println!(
            "    last success {} ({})",
            last_success,
            ago(now, last_success)
        );
    }
    match state.next_run {
        Some(next_run) if next_run <= now => println!("    next run     due now"),
        Some(next_run) => println!(
            "    next run     {} (in {})",
            next_run,
            humanize(next_run - now)
        ),
        None => {}
    }
    if let Some(error) = &state.last_error {
        println!("    ERROR x{}: {}", state.error_count, error);
    }
}

fn ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    format!("{} ago", humanize(now - then))
}

/// `3d 4h`, `2h 10m`, `45s` — the two most significant units.
fn humanize(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humanize_picks_the_two_top_units() {
        assert_eq!(humanize(Duration::seconds(45)), "45s");
        assert_eq!(humanize(Duration::seconds(130)), "2m 10s");
        assert_eq!(humanize(Duration::seconds(2 * 3600 + 600)), "2h 10m");
        assert_eq!(humanize(Duration::days(3) + Duration::hours(4)), "3d 4h");
        assert_eq!(humanize(Duration::seconds(-5)), "0s");
    }
}
