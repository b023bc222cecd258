use thiserror::Error;

/// Configuration-stage failures. Each one is fatal to the operation
/// that triggered it and is surfaced before any job runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The frequency part of a job spec is malformed, or a time-of-day
    /// was combined with a frequency it makes no sense for.
    #[error("invalid frequency definition: {0}")]
    Frequency(String),

    /// The `HH:MM` time-of-day part of a job spec is malformed.
    #[error("invalid time definition: {0}")]
    Time(String),

    /// The job spec entry as a whole could not be parsed.
    #[error("invalid job description: {0}")]
    JobDescription(String),

    /// A spec entry names a job that is not in the registry.
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// A dependency cycle, or a dependency on a name that is not
    /// configured. Lists every job that could not be placed.
    #[error("unresolvable job dependencies: {0}")]
    UnresolvedDependencies(String),

    /// The config file / environment could not be loaded.
    #[error("configuration error: {0}")]
    Load(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
