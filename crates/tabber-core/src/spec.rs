//! The job-specification grammar: `<name>|<frequency>|<time-of-day>`.
//!
//! `<frequency>` is `<integer><unit>` with units `s`, `m`, `h`, `d`.
//! `<time-of-day>` is `HH:MM` (UTC) and only makes sense for
//! frequencies of at least one day. A bare `HH:MM` with no frequency
//! implies a one-day frequency; a bare name defers to the job's
//! registered defaults.

use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A fixed `HH:MM` time-of-day constraint (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    /// Accepts values like `03:45` or `6:5`; rejects out-of-range
    /// hours and minutes.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ConfigError::Time(value.to_string());
        let (h, m) = value.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.trim().parse().map_err(|_| invalid())?;
        let minute: u32 = m.trim().parse().map_err(|_| invalid())?;
        if hour >= 24 || minute >= 60 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Parse a compact duration like `30s`, `10m`, `1h` or `7d`.
pub fn parse_frequency(value: &str) -> Result<Duration> {
    let value = value.trim();
    let invalid = || ConfigError::Frequency(value.to_string());
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (digits, unit) = value.split_at(split);
    let count: i64 = digits.parse().map_err(|_| invalid())?;
    let unit_seconds = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 60 * 60 * 24,
        _ => return Err(invalid()),
    };
    Ok(Duration::seconds(count * unit_seconds))
}

/// A validated schedule for one configured job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: Duration,
    pub time: Option<TimeOfDay>,
}

/// Validate a frequency string with an optional time-of-day. A fixed
/// time-of-day only makes sense for daily-or-slower jobs.
pub fn validate_schedule(frequency: &str, time: Option<&str>) -> Result<Schedule> {
    let interval = parse_frequency(frequency)?;
    let time = time.map(TimeOfDay::parse).transpose()?;
    if time.is_some() && interval < Duration::days(1) {
        return Err(ConfigError::Frequency(format!(
            "a time-of-day requires a frequency of at least one day, got {frequency}"
        )));
    }
    Ok(Schedule {
        frequency: interval,
        time,
    })
}

/// One parsed job declaration, before registry resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    /// Frequency override, verbatim (`1h`, `7d`, ...). Absent defers
    /// to the descriptor default.
    pub frequency: Option<String>,
    /// `HH:MM` override, verbatim.
    pub time: Option<String>,
}

impl JobSpec {
    /// Parse `name|frequency|time`, `name|frequency`, `name|HH:MM`
    /// (implying a one-day frequency) or a bare `name`.
    pub fn parse(entry: &str) -> Result<Self> {
        let invalid = || ConfigError::JobDescription(entry.to_string());
        let mut parts = entry.split('|').map(str::trim);
        let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        let meta: Vec<&str> = parts.collect();
        let (frequency, time) = match meta.as_slice() {
            [] => (None, None),
            [single] if single.contains(':') => (Some("1d".to_string()), Some(single.to_string())),
            [frequency] if !frequency.is_empty() => (Some(frequency.to_string()), None),
            [frequency, time] if !frequency.is_empty() => (
                Some(frequency.to_string()),
                (!time.is_empty()).then(|| time.to_string()),
            ),
            _ => return Err(invalid()),
        };
        Ok(Self {
            name: name.to_string(),
            frequency,
            time,
        })
    }
}

/// Split a job spec list on newlines, commas and semicolons, dropping
/// blanks and `#` comment lines.
pub fn split_spec_list(text: &str) -> Vec<&str> {
    text.split(['\n', ',', ';'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty() && !entry.starts_with('#'))
        .collect()
}
