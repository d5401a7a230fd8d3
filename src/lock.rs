//! Lock Manager — advisory file locking so two scanner invocations against
//! the same state file don't race (spec.md §4.3 / §5).
//!
//! Shared locks protect reads (`status`-only runs may overlap), exclusive
//! locks protect the full scan-and-save pipeline. The lock is released via
//! RAII: dropping the guard always unlocks, even on an early return or a
//! panic during unwinding.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not open lock file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not acquire lock on {path}: {source}")]
    Acquire {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Holds an advisory lock on the state file for the duration of one
/// invocation. Unlocks on drop.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("failed to release lock on {}: {}", self.path.display(), e);
        }
    }
}

/// Path of the lock file companion to a given state-database path, e.g.
/// `.dirsweep.dat` -> `.dirsweep.dat.lock`.
pub fn lock_path_for(database: &Path) -> PathBuf {
    let mut name = database.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|source| LockError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Blocks until an exclusive lock on `database`'s companion lock file is
/// acquired. Used by `scan` (and any `status` run that would upgrade the
/// store, e.g. a legacy-format migration).
pub fn acquire_exclusive(database: &Path) -> Result<LockGuard, LockError> {
    let lock_path = lock_path_for(database);
    let file = open_lock_file(&lock_path)?;
    file.lock_exclusive().map_err(|source| LockError::Acquire {
        path: lock_path.clone(),
        source,
    })?;
    Ok(LockGuard {
        file,
        path: lock_path,
    })
}

/// Blocks until a shared lock is acquired. Multiple readers (e.g. `status`
/// invocations) may hold this concurrently; it excludes any exclusive
/// holder.
pub fn acquire_shared(database: &Path) -> Result<LockGuard, LockError> {
    let lock_path = lock_path_for(database);
    let file = open_lock_file(&lock_path)?;
    file.lock_shared().map_err(|source| LockError::Acquire {
        path: lock_path.clone(),
        source,
    })?;
    Ok(LockGuard {
        file,
        path: lock_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn exclusive_lock_is_released_on_drop() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("state.dat");

        {
            let _guard = acquire_exclusive(&db).unwrap();
        }
        // A second exclusive acquisition must succeed promptly once the
        // first guard is dropped.
        let _guard2 = acquire_exclusive(&db).unwrap();
    }

    #[test]
    fn shared_locks_can_coexist() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("state.dat");

        let guard1 = acquire_shared(&db).unwrap();
        let guard2 = acquire_shared(&db).unwrap();
        drop(guard1);
        drop(guard2);
    }

    #[test]
    fn lock_path_appends_suffix() {
        let db = Path::new("/tmp/foo/.dirsweep.dat");
        assert_eq!(
            lock_path_for(db),
            PathBuf::from("/tmp/foo/.dirsweep.dat.lock")
        );
    }
}
