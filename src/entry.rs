//! `Entry` — the tracked-object record for one filesystem path.
//!
//! Mirrors the `WardEntry`/checksum machinery of a per-directory integrity
//! tool, but generalized to a single flat `path -> Entry` index (see
//! `state_store`) and to the age/size policy hooks spec'd for this engine.

use crate::config::{ChecksumMode, ScannerConfig, TimestampSources};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file modified during checksumming: {0}")]
    ConcurrentModification(PathBuf),
}

fn io_err(path: &Path, source: std::io::Error) -> EntryError {
    EntryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The subset of `ScannerConfig` the removal protocol actually needs.
/// Kept separate from `ScannerConfig` so a `Hook::Callable` can capture an
/// owned, `'static` copy without borrowing the whole configuration.
#[derive(Debug, Clone, Default)]
pub struct RemovalOptions {
    pub dryrun: bool,
    pub sudo: bool,
    pub secure_wipe: Option<String>,
}

impl From<&ScannerConfig> for RemovalOptions {
    fn from(config: &ScannerConfig) -> Self {
        RemovalOptions {
            dryrun: config.dryrun,
            sudo: config.sudo,
            secure_wipe: config.secure_wipe.clone(),
        }
    }
}

/// A serializable snapshot of the metadata fields the engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedStat {
    pub size: u64,
    pub mtime_nanos: u64,
    pub atime_nanos: u64,
    #[serde(default)]
    pub inode: u64,
    #[serde(default)]
    pub mode: u32,
    pub is_dir: bool,
    pub is_symlink: bool,
}

impl CachedStat {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Result<Self, std::io::Error> {
        #[cfg(unix)]
        let (inode, mode) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.ino(), metadata.mode())
        };
        #[cfg(not(unix))]
        let (inode, mode) = (0u64, 0u32);

        Ok(CachedStat {
            size: metadata.len(),
            mtime_nanos: system_time_to_nanos(metadata.modified()?),
            atime_nanos: system_time_to_nanos(metadata.accessed()?),
            inode,
            mode,
            is_dir: metadata.is_dir(),
            is_symlink: metadata.file_type().is_symlink(),
        })
    }
}

fn system_time_to_nanos(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

fn nanos_to_system_time(nanos: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(nanos)
}

/// The persisted, lifecycle-managed record for one path.
///
/// Fields prefixed in spec with an underscore (`_info`, `_checksum`, ...)
/// are kept here without the prefix; Rust's module privacy already hides
/// them from callers outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    #[serde(skip)]
    pub path: PathBuf,
    /// Instant this path was first observed by the Walker.
    pub stamp_nanos: u64,
    /// SHA-1 hex digest of file content, populated lazily.
    pub checksum: Option<String>,
    /// Instant of the last checksum verification (drives `check_window`).
    pub last_check_nanos: Option<u64>,
    /// Snapshot at the end of the previous reconciliation pass; the
    /// baseline `contents_have_changed` diffs against.
    pub prev_stamp_nanos: u64,

    /// Transient: set when in-memory mutation requires the State Store to
    /// be re-saved. Never serialized; reloading starts with this cleared.
    #[serde(skip)]
    pub dirty: bool,

    // Struct-valued fields are declared last: the `toml` crate's
    // serializer requires a table's scalar fields to precede its
    // table-valued ones.
    /// Cached stat snapshot from the most recent read, if attribute caching
    /// is enabled (or if no reconciliation pass has invalidated it yet).
    pub info: Option<CachedStat>,
    pub prev_info: Option<CachedStat>,
}

impl Entry {
    /// Instantiates a freshly-discovered Entry (Walker's job per spec.md §4.1
    /// "Created: by the Walker when a path is discovered for the first
    /// time").
    pub fn new(path: PathBuf, stat: CachedStat, now: SystemTime) -> Self {
        let now_nanos = system_time_to_nanos(now);
        Entry {
            path,
            stamp_nanos: now_nanos,
            info: Some(stat),
            checksum: None,
            last_check_nanos: None,
            prev_stamp_nanos: now_nanos,
            prev_info: Some(stat),
            dirty: true,
        }
    }

    pub fn stamp(&self) -> SystemTime {
        nanos_to_system_time(self.stamp_nanos)
    }

    /// Refreshes `_info` from disk. Honors `cache_attrs`: if caching is
    /// enabled and a snapshot is already present, the cached value is kept.
    pub fn refresh_info(&mut self, cache_attrs: bool) -> Result<(), EntryError> {
        if cache_attrs && self.info.is_some() {
            return Ok(());
        }
        let metadata =
            std::fs::symlink_metadata(&self.path).map_err(|e| io_err(&self.path, e))?;
        self.info = Some(CachedStat::from_metadata(&metadata).map_err(|e| io_err(&self.path, e))?);
        Ok(())
    }

    /// File size, or recursive sum of children for directories. Uses the
    /// cached snapshot when attribute caching is enabled; otherwise re-stats.
    pub fn size(
        &mut self,
        entries: &BTreeMap<PathBuf, Entry>,
        cache_attrs: bool,
    ) -> Result<u64, EntryError> {
        self.refresh_info(cache_attrs)?;
        let info = self.info.expect("refresh_info populates info or errors");

        if info.is_dir {
            let mut total = 0u64;
            for (child_path, child) in entries.range(self.path.clone()..) {
                if child_path == &self.path {
                    continue;
                }
                if !child_path.starts_with(&self.path) {
                    break;
                }
                if let Some(child_info) = child.info {
                    if !child_info.is_dir {
                        total += child_info.size;
                    }
                }
            }
            Ok(total)
        } else {
            Ok(info.size)
        }
    }

    /// Lazily computes and caches the SHA-1 hex digest of file content.
    /// Returns `None` for non-regular files (directories, symlinks).
    pub fn checksum(&mut self) -> Result<Option<&str>, EntryError> {
        let is_regular = match self.info {
            Some(info) => !info.is_dir && !info.is_symlink,
            None => true, // unknown type: attempt, let the read fail if not a file
        };
        if !is_regular {
            self.checksum = None;
            return Ok(None);
        }
        if self.checksum.is_none() {
            self.checksum = Some(self.hash_file()?);
            self.dirty = true;
        }
        Ok(self.checksum.as_deref())
    }

    fn hash_file(&self) -> Result<String, EntryError> {
        let mtime_before = std::fs::symlink_metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&self.path, e))?;

        let mut file = File::open(&self.path).map_err(|e| io_err(&self.path, e))?;
        let mut hasher = Sha1::new();
        let mut buffer = [0u8; 8192];
        loop {
            let n = file.read(&mut buffer).map_err(|e| io_err(&self.path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        let mtime_after = std::fs::symlink_metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&self.path, e))?;
        if mtime_before != mtime_after {
            return Err(EntryError::ConcurrentModification(self.path.clone()));
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Stable per-entry jitter used to desynchronize a fleet of hosts
    /// re-hashing the same layout on the same `check_window` cadence.
    /// Derived from the path so it is deterministic across runs without
    /// persisting an extra random seed field.
    fn jitter(&self, window: Duration) -> Duration {
        if window.is_zero() {
            return Duration::ZERO;
        }
        let mut hasher = Sha1::new();
        hasher.update(self.path.as_os_str().as_encoded_bytes());
        let digest = hasher.finalize();
        let seed = u64::from_be_bytes(digest[0..8].try_into().unwrap());
        Duration::from_nanos(seed % (window.as_nanos() as u64).max(1))
    }

    /// Heuristic content-change predicate (spec.md §4.1).
    ///
    /// Returns `true` iff the entry's on-disk content is believed to have
    /// changed since the previous reconciliation. As a side effect, returns
    /// the number of bytes freshly hashed (for the Checkpointer's
    /// byte-accumulator) alongside the verdict.
    pub fn contents_have_changed(
        &mut self,
        config: &ScannerConfig,
        now: SystemTime,
    ) -> Result<(bool, u64), EntryError> {
        self.refresh_info(config.cache_attrs)?;
        let current = self.info.expect("refreshed above");
        let previous = self.prev_info;

        let mtime_changed = previous.map(|p| p.mtime_nanos != current.mtime_nanos).unwrap_or(true);

        if !mtime_changed && !matches!(config.checksum_mode, ChecksumMode::Always) {
            return Ok((false, 0));
        }

        if mtime_changed && matches!(config.checksum_mode, ChecksumMode::OnChange) {
            let old_checksum = self.checksum.clone();
            let new_checksum = self.hash_file()?;
            let hashed_bytes = current.size;
            let changed = old_checksum.as_deref() != Some(new_checksum.as_str());
            self.checksum = Some(new_checksum);
            self.dirty = true;
            return Ok((changed, hashed_bytes));
        }

        if matches!(config.checksum_mode, ChecksumMode::Always) {
            let now_nanos = system_time_to_nanos(now);
            if let Some(last_check) = self.last_check_nanos {
                let jitter = self.jitter(config.check_window);
                let window_nanos = config.check_window.as_nanos() as u64 + jitter.as_nanos() as u64;
                let due = last_check + window_nanos;
                if now_nanos < due {
                    return Ok((mtime_changed, 0));
                }
            }
            let old_checksum = self.checksum.clone();
            let new_checksum = self.hash_file()?;
            let hashed_bytes = current.size;
            self.last_check_nanos = Some(now_nanos);
            self.dirty = true;
            let changed = old_checksum.as_deref() != Some(new_checksum.as_str())
                || (old_checksum.is_none() && mtime_changed);
            self.checksum = Some(new_checksum);
            return Ok((changed, hashed_bytes));
        }

        // mtime changed, but no checksum policy configured: treat the mtime
        // delta itself as the change signal.
        Ok((mtime_changed, 0))
    }

    /// The single timestamp used for all age calculations: access time if
    /// configured, else modification time if configured, else first-seen.
    pub fn canonical_timestamp(&self, sources: TimestampSources) -> SystemTime {
        if sources.use_atime {
            if let Some(info) = self.info {
                return nanos_to_system_time(info.atime_nanos);
            }
        }
        if sources.use_mtime {
            if let Some(info) = self.info {
                return nanos_to_system_time(info.mtime_nanos);
            }
        }
        self.stamp()
    }

    pub fn age(&self, sources: TimestampSources, now: SystemTime) -> Duration {
        now.duration_since(self.canonical_timestamp(sources))
            .unwrap_or(Duration::ZERO)
    }

    /// Advances `_prevStamp`/`_prevInfo` to the current snapshot, marking
    /// the end of this reconciliation pass for this Entry.
    pub fn commit_reconciliation(&mut self, now: SystemTime) {
        self.prev_stamp_nanos = system_time_to_nanos(now);
        self.prev_info = self.info;
        self.dirty = true;
    }

    /// Removal protocol (spec.md §4.1 "Removal protocol").
    pub fn remove(&self, options: &RemovalOptions) -> Result<(), EntryError> {
        if options.dryrun {
            tracing::info!("dry-run: would remove {}", self.path.display());
            return Ok(());
        }

        let info = self.info;
        let result = match info {
            Some(i) if i.is_dir => self.remove_dir(),
            Some(i) if i.is_symlink => std::fs::remove_file(&self.path),
            _ => self.remove_file(options),
        };

        let result = match result {
            Err(e) if options.sudo => {
                tracing::warn!(
                    "removal of {} failed ({}), retrying under sudo",
                    self.path.display(),
                    e
                );
                self.remove_with_sudo()
            }
            other => other,
        };

        if let Err(e) = result {
            tracing::warn!("failed to remove {}: {}", self.path.display(), e);
            return Ok(());
        }

        if self.path.exists() {
            tracing::warn!(
                "removal of {} reported success but path still exists",
                self.path.display()
            );
        }

        Ok(())
    }

    fn remove_file(&self, options: &RemovalOptions) -> std::io::Result<()> {
        if let Some(tool) = &options.secure_wipe {
            let status = std::process::Command::new(tool).arg(&self.path).status()?;
            if status.success() {
                return Ok(());
            }
            return Err(std::io::Error::other(format!(
                "{tool} exited with {status}"
            )));
        }
        std::fs::remove_file(&self.path)
    }

    fn remove_dir(&self) -> std::io::Result<()> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn remove_with_sudo(&self) -> std::io::Result<()> {
        let status = std::process::Command::new("sudo")
            .arg("rm")
            .arg("-rf")
            .arg("--")
            .arg(&self.path)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!("sudo rm exited with {status}")))
        }
    }
}
