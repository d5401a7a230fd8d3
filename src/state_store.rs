//! State Store — the durable `path -> Entry` index persisted to disk
//! between invocations (spec.md §4.2).
//!
//! Format follows the teacher's ward-file convention: a `[metadata]`
//! section gates the schema version before the full document is parsed, so
//! a corrupt or future-versioned file reports `UnsupportedVersion` rather
//! than an opaque field-level parse error. A legacy bare
//! `path -> timestamp` table (no `[metadata]` section) is detected and
//! upgraded in place.

use crate::entry::{CachedStat, Entry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("failed to parse state file {path}: {source}")]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize state file: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("state file {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

fn io_err(path: &Path, source: std::io::Error) -> StateStoreError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        StateStoreError::PermissionDenied(path.to_path_buf())
    } else {
        StateStoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    version: u32,
    /// Root directory mtime as of the last successful save, used by the
    /// Walker's minimal-scan gate (SPEC_FULL.md §6 `--minimal-scan`):
    /// when unchanged, the whole traversal is skipped.
    #[serde(default)]
    root_mtime_nanos: Option<u64>,
}

/// A lenient pre-parse that succeeds whenever a `[metadata]` section with a
/// `version` key is present, regardless of what else is in the document.
/// Lets `load` distinguish "current-format file with a bad version" from
/// "not this format at all" before committing to a strict parse.
#[derive(Debug, Deserialize)]
struct MetadataOnly {
    metadata: Option<Metadata>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    metadata: Metadata,
    #[serde(default)]
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Default)]
pub struct StateStore {
    pub entries: BTreeMap<PathBuf, Entry>,
    /// Set when the store was upgraded from the legacy format or otherwise
    /// mutated such that a save is warranted even if no Entry is dirty.
    pub needs_save: bool,
    /// Root directory mtime as of the last successful save; feeds the
    /// Walker's minimal-scan gate.
    pub root_mtime_nanos: Option<u64>,
}

impl StateStore {
    pub fn empty() -> Self {
        StateStore {
            entries: BTreeMap::new(),
            needs_save: false,
            root_mtime_nanos: None,
        }
    }

    /// Loads the state file at `path`. A missing file is not an error: it
    /// yields an empty store, matching spec.md §4.2's "Init" behavior.
    pub fn load(path: &Path) -> Result<Self, StateStoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::empty()),
            Err(e) => return Err(io_err(path, e)),
        };

        match toml::from_str::<MetadataOnly>(&contents) {
            Ok(MetadataOnly {
                metadata: Some(meta),
            }) => {
                if meta.version != CURRENT_VERSION {
                    return Err(StateStoreError::UnsupportedVersion {
                        path: path.to_path_buf(),
                        found: meta.version,
                        expected: CURRENT_VERSION,
                    });
                }
                Self::load_current(path, &contents)
            }
            _ => Self::load_legacy_or_fail(path, &contents),
        }
    }

    fn load_current(path: &Path, contents: &str) -> Result<Self, StateStoreError> {
        let file: StateFile =
            toml::from_str(contents).map_err(|source| StateStoreError::TomlParse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut entries = BTreeMap::new();
        for (key, mut entry) in file.entries {
            entry.path = PathBuf::from(key);
            entries.insert(entry.path.clone(), entry);
        }
        Ok(StateStore {
            entries,
            needs_save: false,
            root_mtime_nanos: file.metadata.root_mtime_nanos,
        })
    }

    /// Attempts the legacy bare `path = timestamp` table; on success,
    /// upgrades every row to a current-format Entry with no cached stat
    /// (the next Walk pass will populate it) and marks the store dirty so
    /// the upgrade is persisted on the next save.
    fn load_legacy_or_fail(path: &Path, contents: &str) -> Result<Self, StateStoreError> {
        let legacy: BTreeMap<String, f64> =
            toml::from_str(contents).map_err(|source| StateStoreError::TomlParse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut entries = BTreeMap::new();
        for (key, timestamp) in legacy {
            let stamp = UNIX_EPOCH + Duration::from_secs_f64(timestamp.max(0.0));
            let path_buf = PathBuf::from(&key);
            let entry = Entry {
                path: path_buf.clone(),
                stamp_nanos: to_nanos(stamp),
                info: None,
                checksum: None,
                last_check_nanos: None,
                prev_stamp_nanos: to_nanos(stamp),
                prev_info: None,
                dirty: true,
            };
            entries.insert(path_buf, entry);
        }
        Ok(StateStore {
            entries,
            needs_save: true,
            root_mtime_nanos: None,
        })
    }

    /// Whether any entry (or the store as a whole) has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.needs_save || self.entries.values().any(|e| e.dirty)
    }

    /// Atomically writes the store to `path`: a temp file on the same
    /// filesystem, fsync'd, then renamed over the destination. Matches
    /// `ward_file.rs::save`.
    pub fn save(&mut self, path: &Path) -> Result<(), StateStoreError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut entries = BTreeMap::new();
        for (p, entry) in &self.entries {
            entries.insert(path_to_key(p), entry.clone());
        }
        let file = StateFile {
            metadata: Metadata {
                version: CURRENT_VERSION,
                root_mtime_nanos: self.root_mtime_nanos,
            },
            entries,
        };
        let rendered = toml::to_string(&file)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_err(path, e))?;
        tmp.write_all(rendered.as_bytes())
            .map_err(|e| io_err(path, e))?;
        tmp.as_file().sync_all().map_err(|e| io_err(path, e))?;
        tmp.persist(path)
            .map_err(|e| io_err(path, e.error))?;

        self.needs_save = false;
        for entry in self.entries.values_mut() {
            entry.dirty = false;
        }
        Ok(())
    }
}

fn path_to_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn to_nanos(t: std::time::SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_empty_store() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("nonexistent.dat");
        let store = StateStore::load(&db).unwrap();
        assert!(store.entries.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn round_trips_entries() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("state.dat");

        let mut store = StateStore::empty();
        let meta = std::fs::metadata(temp.path()).unwrap();
        let stat = CachedStat::from_metadata(&meta).unwrap();
        let entry = Entry::new(temp.path().to_path_buf(), stat, SystemTime::now());
        store.entries.insert(temp.path().to_path_buf(), entry);
        store.save(&db).unwrap();

        let reloaded = StateStore::load(&db).unwrap();
        assert_eq!(reloaded.entries.len(), 1);
        assert!(reloaded.entries.contains_key(temp.path()));
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn save_clears_dirty_bits() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("state.dat");
        let mut store = StateStore::empty();
        let meta = std::fs::metadata(temp.path()).unwrap();
        let stat = CachedStat::from_metadata(&meta).unwrap();
        let entry = Entry::new(temp.path().to_path_buf(), stat, SystemTime::now());
        assert!(entry.dirty);
        store.entries.insert(temp.path().to_path_buf(), entry);
        store.save(&db).unwrap();
        assert!(!store.entries.values().next().unwrap().dirty);
    }

    #[test]
    fn legacy_bare_table_is_upgraded() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("legacy.dat");
        std::fs::write(&db, "\"/tmp/a\" = 1700000000.0\n\"/tmp/b\" = 1600000000.5\n").unwrap();

        let store = StateStore::load(&db).unwrap();
        assert_eq!(store.entries.len(), 2);
        assert!(store.is_dirty());
        let entry = &store.entries[Path::new("/tmp/a")];
        assert!(entry.info.is_none());
    }

    #[test]
    fn future_version_is_rejected() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("future.dat");
        std::fs::write(&db, "[metadata]\nversion = 999\n").unwrap();

        let err = StateStore::load(&db).unwrap_err();
        assert!(matches!(err, StateStoreError::UnsupportedVersion { .. }));
    }

    #[test]
    fn corrupt_current_format_reports_parse_error_not_legacy() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("corrupt.dat");
        std::fs::write(&db, "[metadata]\nversion = 1\n[entries]\nnot valid = [[[\n").unwrap();

        let err = StateStore::load(&db);
        assert!(err.is_err());
    }
}
