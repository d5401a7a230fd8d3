//! Scanner — orchestrates one invocation end-to-end: Lock -> Load State ->
//! Walk -> Reconcile -> Policy -> Dispatch -> Save -> Unlock, with the
//! Checkpointer invoked mid-Reconcile (spec.md §2, §4.8).

use crate::action::{ActionError, Hook, HookEvent};
use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::config::ScannerConfig;
use crate::lock::{acquire_exclusive, acquire_shared, LockError};
use crate::policy::{age_policy_violations, size_policy_violations, PolicyError};
use crate::reconciler::{reconcile, ReconcileError};
use crate::state_store::{StateStore, StateStoreError};
use crate::walker::{self, WalkError};
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    StateStore(#[from] StateStoreError),
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub past_age_limit: usize,
    pub past_size_limit: usize,
    pub skipped: bool,
}

/// Runs the full Lock -> Load -> Walk -> Reconcile -> Policy -> Dispatch ->
/// Save -> Unlock pipeline.
pub fn scan(config: &ScannerConfig) -> Result<ScanSummary, ScanError> {
    let _lock = acquire_exclusive(&config.database)?;
    let mut store = StateStore::load(&config.database)?;

    if walker::should_skip_scan(config, store.root_mtime_nanos) {
        tracing::info!(
            "minimal-scan: {} unchanged since last save, skipping traversal",
            config.directory.display()
        );
        return Ok(ScanSummary {
            skipped: true,
            ..Default::default()
        });
    }

    let now = SystemTime::now();
    let walked = walker::walk(config)?;
    let mut checkpointer = Checkpointer::new(config.checkpoint_bytes);
    let outcome = reconcile(&mut store, walked, config, now, &mut checkpointer, &config.database)?;

    let summary_counts = (
        outcome.added.len(),
        outcome.changed.len(),
        outcome.unchanged.len(),
        outcome.removed.len(),
    );

    dispatch_added(&mut store, &outcome.added, &config.on_entry_added, config.dryrun)?;
    dispatch_changed(
        &mut store,
        &outcome.changed,
        &outcome.changed_originals,
        &config.on_entry_changed,
        config.dryrun,
        now,
    )?;
    dispatch_removed(&mut store, outcome.removed, &config.on_entry_removed, config.dryrun)?;

    checkpointer.checkpoint_if_due(&mut store, &config.database)?;

    // Age policy runs to completion, including dispatch, before the size
    // policy is even computed: spec.md §4.6 applies the two policies "in
    // this fixed order", and the size policy's "total size of tracked
    // Entries" must be read after age removals have already shrunk that
    // total, or it over-selects victims the age policy already freed
    // enough space to make unnecessary.
    let age_violations = age_policy_violations(&store, config, now);
    let age_count = age_violations.len();
    dispatch_past_limit(&mut store, config, &age_violations, now)?;

    let size_violations = size_policy_violations(&store, config)?;
    let size_count = size_violations.len();
    dispatch_past_limit(&mut store, config, &size_violations, now)?;

    update_root_mtime(&mut store, config);
    store.save(&config.database)?;

    Ok(ScanSummary {
        added: summary_counts.0,
        changed: summary_counts.1,
        unchanged: summary_counts.2,
        removed: summary_counts.3,
        past_age_limit: age_count,
        past_size_limit: size_count,
        skipped: false,
    })
}

/// Dispatches `onEntryPastLimit(age)` for each violating path, in the order
/// given (spec.md §4.1/§4.6: the hook receives the entry's age in days).
/// A hook that commits removes the entry from the store (and, if
/// `prune_dirs` is set, prunes any ancestor directories left empty); a
/// hook that declines leaves the entry tracked so the policy re-evaluates
/// it next run.
fn dispatch_past_limit(
    store: &mut StateStore,
    config: &ScannerConfig,
    violations: &[PathBuf],
    now: SystemTime,
) -> Result<(), ActionError> {
    for path in violations {
        let Some(entry) = store.entries.get(path).cloned() else {
            continue;
        };
        let age_days = entry.age(config.timestamps, now).as_secs_f64() / 86400.0;
        let committed = config.on_entry_past_limit.fire(
            &entry,
            HookEvent::PastLimit { age_days },
            config.dryrun,
        )?;
        if committed {
            store.entries.remove(path);
            if config.prune_dirs && !config.dryrun {
                prune_empty_ancestors(store, &config.directory, path);
            }
        }
    }
    Ok(())
}

/// Runs Lock -> Load -> Walk -> Reconcile -> Save(if dirty) -> Unlock, with
/// no policy evaluation or dispatch: a read-mostly inspection pass
/// (SPEC_FULL.md §6 `status`).
pub fn status(config: &ScannerConfig) -> Result<ScanSummary, ScanError> {
    let _lock = acquire_shared(&config.database)?;
    let mut store = StateStore::load(&config.database)?;

    if walker::should_skip_scan(config, store.root_mtime_nanos) {
        return Ok(ScanSummary {
            skipped: true,
            ..Default::default()
        });
    }

    let now = SystemTime::now();
    let walked = walker::walk(config)?;
    let mut checkpointer = Checkpointer::new(config.checkpoint_bytes);
    let outcome = reconcile(&mut store, walked, config, now, &mut checkpointer, &config.database)?;

    let summary = ScanSummary {
        added: outcome.added.len(),
        changed: outcome.changed.len(),
        unchanged: outcome.unchanged.len(),
        removed: outcome.removed.len(),
        past_age_limit: 0,
        past_size_limit: 0,
        skipped: false,
    };

    // `status` fires no hooks, so every Changed entry is treated as an
    // implicit always-commit: its baseline advances unconditionally rather
    // than staying pinned for a re-fire that would never actually happen
    // (no dispatcher ever runs here to decide otherwise).
    for path in &outcome.changed {
        if let Some(entry) = store.entries.get_mut(path) {
            entry.commit_reconciliation(now);
        }
    }

    if store.is_dirty() {
        update_root_mtime(&mut store, config);
        store.save(&config.database)?;
    }

    Ok(summary)
}

/// Removes directories left empty by a policy-driven removal, walking
/// upward from `removed_path`'s parent toward (but never including) the
/// scan root. Stops at the first non-empty directory. Pruned directories
/// are also dropped from the store so they don't linger as stale tracked
/// entries (SPEC_FULL.md §6 `--prune-dirs`).
fn prune_empty_ancestors(store: &mut StateStore, root: &std::path::Path, removed_path: &std::path::Path) {
    let mut dir = match removed_path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => return,
    };
    loop {
        if dir == *root || !dir.starts_with(root) {
            break;
        }
        match std::fs::read_dir(&dir) {
            Ok(mut iter) => {
                if iter.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        if std::fs::remove_dir(&dir).is_err() {
            break;
        }
        store.entries.remove(&dir);
        tracing::info!("pruned empty directory {}", dir.display());
        let Some(parent) = dir.parent() else { break };
        dir = parent.to_path_buf();
    }
}

fn update_root_mtime(store: &mut StateStore, config: &ScannerConfig) {
    if let Ok(mtime) = std::fs::metadata(&config.directory).and_then(|m| m.modified()) {
        let nanos = mtime
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        store.root_mtime_nanos = Some(nanos);
    }
}

/// Dispatches the `Added` hook. A hook that declines to commit (returns
/// `false`) discards the entry entirely, so the next run re-discovers and
/// re-dispatches it as Added again (spec.md §4.5).
fn dispatch_added(
    store: &mut StateStore,
    paths: &[PathBuf],
    hook: &Hook,
    dryrun: bool,
) -> Result<(), ActionError> {
    for path in paths {
        let Some(entry) = store.entries.get(path).cloned() else {
            continue;
        };
        let committed = hook.fire(&entry, HookEvent::Added, dryrun)?;
        if !committed {
            store.entries.remove(path);
        }
    }
    Ok(())
}

/// Dispatches the `Changed` hook. On commit, the entry's `_prevStamp`/
/// `_prevInfo` baseline (and any checksum recomputed along the way)
/// advances to the freshly observed state. On decline, the entry is
/// restored verbatim to its pre-scan snapshot from `originals`, so the
/// next scan rediffs against the same baseline and reports Changed again
/// (spec.md §4.5: "retain previous snapshot... so next run re-fires").
fn dispatch_changed(
    store: &mut StateStore,
    paths: &[PathBuf],
    originals: &std::collections::BTreeMap<PathBuf, crate::entry::Entry>,
    hook: &Hook,
    dryrun: bool,
    now: SystemTime,
) -> Result<(), ActionError> {
    for path in paths {
        let Some(entry) = store.entries.get(path).cloned() else {
            continue;
        };
        let committed = hook.fire(&entry, HookEvent::Changed, dryrun)?;
        if committed {
            if let Some(entry) = store.entries.get_mut(path) {
                entry.commit_reconciliation(now);
            }
        } else if let Some(original) = originals.get(path) {
            store.entries.insert(path.clone(), original.clone());
        }
    }
    Ok(())
}

/// Dispatches the `Removed` hook for entries no longer present on disk. A
/// hook that declines to commit causes the entry to be reinserted so it is
/// reconsidered (and re-dispatched) on the next run.
fn dispatch_removed(
    store: &mut StateStore,
    removed: Vec<crate::entry::Entry>,
    hook: &Hook,
    dryrun: bool,
) -> Result<(), ActionError> {
    for entry in removed {
        let committed = hook.fire(&entry, HookEvent::Removed, dryrun)?;
        if !committed {
            store.entries.insert(entry.path.clone(), entry);
        }
    }
    Ok(())
}
