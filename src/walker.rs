//! Walker — enumerates the scan root's subtree into `(path, CachedStat)`
//! pairs for the Reconciler (spec.md §4.4).
//!
//! Symlinks are recorded as entries but never followed for recursion, so a
//! symlink cycle cannot cause unbounded traversal. The state database and
//! its companion lock file are always skipped, even if they live inside the
//! scanned directory (the default).

use crate::config::ScannerConfig;
use crate::entry::CachedStat;
use crate::lock::lock_path_for;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("IO error listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
}

fn io_err(path: &Path, source: std::io::Error) -> WalkError {
    if source.kind() == std::io::ErrorKind::PermissionDenied {
        WalkError::PermissionDenied(path.to_path_buf())
    } else {
        WalkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub struct WalkedPath {
    pub path: PathBuf,
    pub stat: CachedStat,
}

/// Returns `true` when the traversal can be skipped entirely: the root's
/// mtime matches the mtime recorded as of the last successful save, and
/// `minimal_scan` is enabled (SPEC_FULL.md §6 `--minimal-scan`).
pub fn should_skip_scan(config: &ScannerConfig, last_root_mtime_nanos: Option<u64>) -> bool {
    if !config.minimal_scan {
        return false;
    }
    let Some(last) = last_root_mtime_nanos else {
        return false;
    };
    match std::fs::metadata(&config.directory).and_then(|m| m.modified()) {
        Ok(mtime) => {
            let nanos = mtime
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;
            nanos == last
        }
        Err(_) => false,
    }
}

/// Walks the configured directory, bounded by `config.depth` (0 = root's
/// immediate children only, `None` = unbounded).
///
/// Per spec.md §7, a transient I/O failure (permission denied, a path that
/// vanishes mid-walk) on any path *below* the root is logged and that path
/// is skipped rather than aborting the scan; the root itself failing to
/// open is still reported, since no traversal is possible at all.
pub fn walk(config: &ScannerConfig) -> Result<Vec<WalkedPath>, WalkError> {
    let exclude = [
        config.database.clone(),
        lock_path_for(&config.database),
    ];
    let read_dir = std::fs::read_dir(&config.directory).map_err(|e| io_err(&config.directory, e))?;
    let mut results = Vec::new();
    walk_entries(read_dir, &config.directory, config.depth, 0, &exclude, &mut results);
    Ok(results)
}

fn walk_recursive(
    dir: &Path,
    max_depth: Option<u32>,
    current_depth: u32,
    exclude: &[PathBuf],
    results: &mut Vec<WalkedPath>,
) {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            tracing::warn!("skipping {}: {}", dir.display(), io_err(dir, e));
            return;
        }
    };
    walk_entries(read_dir, dir, max_depth, current_depth, exclude, results);
}

fn walk_entries(
    read_dir: std::fs::ReadDir,
    dir: &Path,
    max_depth: Option<u32>,
    current_depth: u32,
    exclude: &[PathBuf],
    results: &mut Vec<WalkedPath>,
) {
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("skipping an entry of {}: {}", dir.display(), io_err(dir, e));
                continue;
            }
        };
        let path = entry.path();
        if exclude.iter().any(|p| p == &path) {
            continue;
        }

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), io_err(&path, e));
                continue;
            }
        };
        let stat = match CachedStat::from_metadata(&metadata) {
            Ok(stat) => stat,
            Err(e) => {
                tracing::warn!("skipping {}: {}", path.display(), io_err(&path, e));
                continue;
            }
        };
        let is_real_dir = stat.is_dir && !stat.is_symlink;

        results.push(WalkedPath {
            path: path.clone(),
            stat,
        });

        if is_real_dir {
            let next_depth = current_depth + 1;
            let within_depth = max_depth.map(|d| next_depth <= d).unwrap_or(true);
            if within_depth {
                walk_recursive(&path, max_depth, next_depth, exclude, results);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Hook;
    use crate::config::{ChecksumMode, TimestampSources};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_for(dir: &Path) -> ScannerConfig {
        ScannerConfig {
            directory: dir.to_path_buf(),
            database: ScannerConfig::default_database_path(dir),
            days: None,
            max_size: None,
            depth: None,
            timestamps: TimestampSources::default(),
            checksum_mode: ChecksumMode::Never,
            check_window: Duration::from_secs(7 * 86400),
            cache_attrs: false,
            minimal_scan: false,
            prune_dirs: false,
            sudo: false,
            dryrun: false,
            secure_wipe: None,
            checkpoint_bytes: ScannerConfig::DEFAULT_CHECKPOINT_BYTES,
            on_entry_added: Hook::Callable(Arc::new(|_| true)),
            on_entry_changed: Hook::Callable(Arc::new(|_| true)),
            on_entry_removed: Hook::Callable(Arc::new(|_| true)),
            on_entry_past_limit: Hook::Callable(Arc::new(|_| true)),
        }
    }

    #[test]
    fn walks_nested_directories() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("a")).unwrap();
        std::fs::write(temp.path().join("a/f.txt"), b"x").unwrap();
        std::fs::write(temp.path().join("g.txt"), b"y").unwrap();

        let config = config_for(temp.path());
        let walked = walk(&config).unwrap();
        let names: Vec<_> = walked
            .iter()
            .map(|w| w.path.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert!(names.contains(&PathBuf::from("a")));
        assert!(names.contains(&PathBuf::from("a/f.txt")));
        assert!(names.contains(&PathBuf::from("g.txt")));
    }

    #[test]
    fn depth_zero_limits_to_immediate_children() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("a")).unwrap();
        std::fs::write(temp.path().join("a/f.txt"), b"x").unwrap();

        let mut config = config_for(temp.path());
        config.depth = Some(0);
        let walked = walk(&config).unwrap();
        let names: Vec<_> = walked
            .iter()
            .map(|w| w.path.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a")]);
    }

    #[test]
    fn skips_database_and_lock_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".dirsweep.dat"), b"").unwrap();
        std::fs::write(temp.path().join(".dirsweep.dat.lock"), b"").unwrap();
        std::fs::write(temp.path().join("real.txt"), b"x").unwrap();

        let config = config_for(temp.path());
        let walked = walk(&config).unwrap();
        let names: Vec<_> = walked
            .iter()
            .map(|w| w.path.file_name().unwrap().to_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "real.txt");
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_recorded_but_not_followed() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("real")).unwrap();
        std::fs::write(temp.path().join("real/inner.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let config = config_for(temp.path());
        let walked = walk(&config).unwrap();
        let link_entry = walked
            .iter()
            .find(|w| w.path.file_name().unwrap() == "link")
            .unwrap();
        assert!(link_entry.stat.is_symlink);

        let under_link = walked
            .iter()
            .any(|w| w.path.strip_prefix(temp.path()).unwrap() == Path::new("link/inner.txt"));
        assert!(!under_link);
    }

    #[test]
    fn minimal_scan_skips_when_root_mtime_unchanged() {
        let temp = TempDir::new().unwrap();
        let mut config = config_for(temp.path());
        config.minimal_scan = true;

        let mtime = std::fs::metadata(temp.path())
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;

        assert!(should_skip_scan(&config, Some(mtime)));
        assert!(!should_skip_scan(&config, Some(mtime + 1)));
        assert!(!should_skip_scan(&config, None));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        if nix::unistd::Uid::current().is_root() {
            // Permission bits don't restrict root; nothing to assert.
            return;
        }

        let temp = TempDir::new().unwrap();
        let protected = temp.path().join("protected");
        std::fs::create_dir(&protected).unwrap();
        std::fs::write(protected.join("secret.txt"), b"x").unwrap();
        std::fs::write(temp.path().join("visible.txt"), b"y").unwrap();
        std::fs::set_permissions(&protected, std::fs::Permissions::from_mode(0o000)).unwrap();

        let config = config_for(temp.path());
        let result = walk(&config);

        std::fs::set_permissions(&protected, std::fs::Permissions::from_mode(0o755)).unwrap();

        let walked = result.unwrap();
        let names: Vec<_> = walked
            .iter()
            .map(|w| w.path.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert!(names.contains(&PathBuf::from("visible.txt")));
        assert!(names.contains(&PathBuf::from("protected")));
        assert!(!names.contains(&PathBuf::from("protected/secret.txt")));
    }
}
