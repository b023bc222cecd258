use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Top-level config (tabber.toml + TABBER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TabberConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Job spec list: entries of the form `name|frequency|time`,
    /// split on newlines, commas or semicolons. `#` lines are
    /// comments. A bare name uses the job's registered defaults.
    #[serde(default = "default_jobs")]
    pub jobs: String,

    /// Seconds until a failed job becomes due again, independent of
    /// its normal frequency.
    #[serde(default = "default_error_retry_secs")]
    pub error_retry_secs: u64,

    /// An `ongoing` marker older than this is ignored as a lock and
    /// the job is run anyway.
    #[serde(default = "default_max_ongoing_age_hours")]
    pub max_ongoing_age_hours: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            error_retry_secs: default_error_retry_secs(),
            max_ongoing_age_hours: default_max_ongoing_age_hours(),
        }
    }
}

impl TabberConfig {
    /// Load config from `config_path`, falling back to
    /// `~/.tabber/tabber.toml`, with `TABBER_*` env overrides on top.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TabberConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TABBER_").split("_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tabber/tabber.toml", home)
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tabber/tabber.db", home)
}

fn default_jobs() -> String {
    ["heartbeat|5m", "runlog-cleanup|7d|06:00"].join("\n")
}

fn default_error_retry_secs() -> u64 {
    300
}

fn default_max_ongoing_age_hours() -> f64 {
    12.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = TabberConfig::default();
        assert_eq!(config.scheduler.error_retry_secs, 300);
        assert_eq!(config.scheduler.max_ongoing_age_hours, 12.0);
        assert!(config.scheduler.jobs.contains("heartbeat"));
        assert!(config.database.path.ends_with("tabber.db"));
    }
}
