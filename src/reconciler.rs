//! Reconciler — diffs the Walker's fresh listing against the State Store's
//! previous snapshot using a shadow-set comparison (spec.md §4.5).
//!
//! A path present on disk but absent from the store is Added; present in
//! both with changed content is Changed; present in both with unchanged
//! content is Unchanged; present in the store but absent on disk is
//! Removed. The Checkpointer is invoked as content hashing accumulates
//! bytes, per spec.md §4.8.

use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::config::ScannerConfig;
use crate::entry::{Entry, EntryError};
use crate::state_store::StateStore;
use crate::walker::WalkedPath;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub added: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<Entry>,
    /// Pre-mutation snapshot of every `changed` entry, keyed by path. If
    /// `onEntryChanged` declines to commit, the dispatcher restores this
    /// snapshot verbatim so the next scan rediffs against the same
    /// baseline and re-fires Changed (spec.md §4.5: "retain previous
    /// snapshot so next run re-fires").
    pub changed_originals: std::collections::BTreeMap<PathBuf, Entry>,
}

/// Diffs `walked` against `store` in place: new entries are inserted,
/// changed entries have their checksum/stamp refreshed, and entries no
/// longer present on disk are removed from the store and returned for
/// dispatch. `database` is the checkpoint save target: each time hashing
/// crosses the configured byte threshold, the Checkpointer saves `store`
/// to it right there in the loop (spec.md §2 "Checkpointer is invoked
/// mid-Reconcile"), so a crash partway through a multi-hour hashing pass
/// loses at most one threshold's worth of work.
pub fn reconcile(
    store: &mut StateStore,
    walked: Vec<WalkedPath>,
    config: &ScannerConfig,
    now: SystemTime,
    checkpointer: &mut Checkpointer,
    database: &Path,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut outcome = ReconcileOutcome::default();
    let seen: BTreeSet<PathBuf> = walked.iter().map(|w| w.path.clone()).collect();

    for walked_path in walked {
        match store.entries.get_mut(&walked_path.path) {
            None => {
                let entry = Entry::new(walked_path.path.clone(), walked_path.stat, now);
                store.entries.insert(walked_path.path.clone(), entry);
                outcome.added.push(walked_path.path);
            }
            Some(entry) => {
                let original = entry.clone();
                entry.info = Some(walked_path.stat);
                let (changed, hashed_bytes) = entry.contents_have_changed(config, now)?;
                if hashed_bytes > 0 {
                    checkpointer.record_bytes(hashed_bytes);
                    checkpointer.checkpoint_if_due(store, database)?;
                }
                if changed {
                    outcome.changed_originals.insert(walked_path.path.clone(), original);
                    outcome.changed.push(walked_path.path);
                } else {
                    outcome.unchanged.push(walked_path.path);
                }
            }
        }
    }

    let removed_paths: Vec<PathBuf> = store
        .entries
        .keys()
        .filter(|p| !seen.contains(*p))
        .cloned()
        .collect();
    for path in removed_paths {
        if let Some(entry) = store.entries.remove(&path) {
            outcome.removed.push(entry);
        }
    }

    // `changed` entries are deliberately excluded here: their baseline is
    // only advanced once `onEntryChanged` confirms the commit (see
    // `scanner::dispatch_changed`), so a declined hook leaves the old
    // snapshot in place and the same diff re-fires next scan.
    for path in outcome.added.iter().chain(outcome.unchanged.iter()) {
        if let Some(entry) = store.entries.get_mut(path) {
            entry.commit_reconciliation(now);
        }
    }

    Ok(outcome)
}
