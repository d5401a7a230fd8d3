//! Typed configuration for a single scan invocation.
//!
//! Mirrors the option table a caller assembles either programmatically (as a
//! library) or from CLI flags (the `dirsweep` binary). Nothing here touches
//! the filesystem; `ScannerConfig` is pure data consumed by the other
//! modules.

use crate::action::Hook;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which cached timestamp(s) participate in the canonical-timestamp
/// precedence rule (access time, else modification time, else first-seen).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimestampSources {
    pub use_atime: bool,
    pub use_mtime: bool,
}

/// Controls when content hashes are (re)computed for a regular file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChecksumMode {
    /// Never hash; rely on metadata alone.
    #[default]
    Never,
    /// Hash once mtime has changed relative to the previous scan.
    OnChange,
    /// Hash periodically regardless of mtime, subject to `check_window`.
    Always,
}

/// An aggregate byte limit, either an absolute count or a percentage of the
/// scan root's filesystem capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeLimit {
    Bytes(u64),
    PercentOfVolume(f64),
}

impl SizeLimit {
    /// Parses `"1048576"` or `"80%"` as spec.md §6 requires of `maxSize`.
    pub fn parse(text: &str) -> Result<Self, std::num::ParseFloatError> {
        if let Some(pct) = text.strip_suffix('%') {
            Ok(SizeLimit::PercentOfVolume(pct.trim().parse()?))
        } else {
            // Absolute byte counts are whole, but accept "10.0" style input
            // from callers that compute the value as a float.
            let bytes: f64 = text.trim().parse()?;
            Ok(SizeLimit::Bytes(bytes.max(0.0) as u64))
        }
    }
}

pub struct ScannerConfig {
    /// Directory subtree to scan.
    pub directory: PathBuf,
    /// Path to the state database file (default `<directory>/.dirsweep.dat`).
    pub database: PathBuf,
    /// Age threshold in days (floating point allowed). `None` disables the
    /// age policy.
    pub days: Option<f64>,
    /// Aggregate size limit. `None` disables the size policy.
    pub max_size: Option<SizeLimit>,
    /// 0 = list the root's immediate children only, N = descend N levels
    /// below that, `None` = unbounded.
    pub depth: Option<u32>,
    pub timestamps: TimestampSources,
    pub checksum_mode: ChecksumMode,
    /// Minimum interval between forced re-hashes under `ChecksumMode::Always`.
    pub check_window: Duration,
    /// Retain a stat() result across repeated property reads within one scan.
    pub cache_attrs: bool,
    /// Skip traversal entirely when the root directory's mtime matches the
    /// last successful save.
    pub minimal_scan: bool,
    /// Remove directories left empty by policy-driven removals.
    pub prune_dirs: bool,
    /// Retry removals under elevated privilege (`sudo`) if the initial
    /// attempt fails.
    pub sudo: bool,
    /// Dispatch hooks but never mutate the filesystem.
    pub dryrun: bool,
    /// Shell out to a secure-wipe ("shred"-like) tool instead of unlink.
    pub secure_wipe: Option<String>,
    /// Bytes of freshly hashed content between checkpoint saves.
    pub checkpoint_bytes: u64,

    pub on_entry_added: Hook,
    pub on_entry_changed: Hook,
    pub on_entry_removed: Hook,
    pub on_entry_past_limit: Hook,
}

impl ScannerConfig {
    /// Default database path for a given scan root.
    pub fn default_database_path(directory: &Path) -> PathBuf {
        directory.join(".dirsweep.dat")
    }

    /// Default checkpoint threshold: 10 GiB, per spec.md §4.8.
    pub const DEFAULT_CHECKPOINT_BYTES: u64 = 10 * 1024 * 1024 * 1024;
}
