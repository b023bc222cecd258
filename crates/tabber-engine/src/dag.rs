//! Dependency (DAG) ordering of configured jobs.

use tabber_core::error::ConfigError;

use crate::engine::ConfiguredJob;

/// Reorder `jobs` so that every dependency precedes its dependents,
/// keeping declaration order among jobs with no mutual relationship.
///
/// Repeatedly scans the remaining set for any job whose dependencies
/// are all already placed. A full scan that places nothing while jobs
/// remain means a cycle or a dependency on a name that is not
/// configured; the error lists every job that could not be placed.
pub fn reorder(jobs: Vec<ConfiguredJob>) -> tabber_core::Result<Vec<ConfiguredJob>> {
    let mut remaining = jobs;
    let mut ordered: Vec<ConfiguredJob> = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let placed_before = ordered.len();
        let mut i = 0;
        while i < remaining.len() {
            let ready = remaining[i]
                .depends_on
                .iter()
                .all(|dep| ordered.iter().any(|job| job.name == *dep));
            if ready {
                ordered.push(remaining.remove(i));
            } else {
                i += 1;
            }
        }
        if ordered.len() == placed_before {
            let unresolved: Vec<&str> = remaining.iter().map(|job| job.name.as_str()).collect();
            return Err(ConfigError::UnresolvedDependencies(unresolved.join(", ")));
        }
    }

    Ok(ordered)
}
