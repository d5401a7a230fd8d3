//! Policy Engine — decides which entries are past the configured age
//! and/or aggregate size limits, strictly after reconciliation has settled
//! the tree's current shape (spec.md §4.6).

use crate::config::{ScannerConfig, SizeLimit};
use crate::state_store::StateStore;
use crate::volume::{volume_capacity, VolumeError};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error(transparent)]
    Volume(#[from] VolumeError),
}

/// Paths whose canonical age exceeds `config.days`, oldest first. Empty if
/// no age limit is configured.
pub fn age_policy_violations(
    store: &StateStore,
    config: &ScannerConfig,
    now: SystemTime,
) -> Vec<PathBuf> {
    let Some(days) = config.days else {
        return Vec::new();
    };
    let threshold = Duration::from_secs_f64((days * 86400.0).max(0.0));

    let mut violators: Vec<(Duration, PathBuf)> = store
        .entries
        .values()
        .filter(|entry| entry.age(config.timestamps, now) > threshold)
        .map(|entry| (entry.age(config.timestamps, now), entry.path.clone()))
        .collect();

    violators.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    violators.into_iter().map(|(_, path)| path).collect()
}

/// Resolves `config.max_size` to an absolute byte threshold, querying the
/// Volume Query component when the limit is a percentage.
fn resolve_size_limit(config: &ScannerConfig) -> Result<Option<u64>, PolicyError> {
    match &config.max_size {
        None => Ok(None),
        Some(SizeLimit::Bytes(bytes)) => Ok(Some(*bytes)),
        Some(SizeLimit::PercentOfVolume(pct)) => {
            let capacity = volume_capacity(&config.directory)?;
            Ok(Some(capacity.bytes_for_percent(*pct)))
        }
    }
}

/// Paths to remove, in descending-size order (largest first, lexicographic
/// path as tie-break), such that removing them brings the total tracked
/// file footprint back under the configured limit. Directories are never
/// selected directly here: their size already reflects their descendants.
pub fn size_policy_violations(
    store: &StateStore,
    config: &ScannerConfig,
) -> Result<Vec<PathBuf>, PolicyError> {
    let Some(limit) = resolve_size_limit(config)? else {
        return Ok(Vec::new());
    };

    let mut files: Vec<(u64, PathBuf)> = store
        .entries
        .values()
        .filter_map(|entry| {
            let info = entry.info?;
            if info.is_dir {
                None
            } else {
                Some((info.size, entry.path.clone()))
            }
        })
        .collect();

    let total: u64 = files.iter().map(|(size, _)| size).sum();
    if total <= limit {
        return Ok(Vec::new());
    }

    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut running_total = total;
    let mut victims = Vec::new();
    for (size, path) in files {
        if running_total <= limit {
            break;
        }
        running_total = running_total.saturating_sub(size);
        victims.push(path);
    }
    Ok(victims)
}
