//! Volume Query — free/total byte accounting for the filesystem hosting
//! the scan root, used by the Size Policy when `maxSize` is given as a
//! percentage (spec.md §6, SPEC_FULL.md §4.9).

use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("statvfs failed on {path}: {source}")]
    Statvfs {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCapacity {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeCapacity {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Byte threshold corresponding to `percent` of total volume capacity.
    pub fn bytes_for_percent(&self, percent: f64) -> u64 {
        ((self.total_bytes as f64) * (percent / 100.0)).max(0.0) as u64
    }
}

/// Queries free/total byte counts for the filesystem hosting `path`.
pub fn volume_capacity(path: &Path) -> Result<VolumeCapacity, VolumeError> {
    let stat = statvfs(path).map_err(|source| VolumeError::Statvfs {
        path: path.to_path_buf(),
        source,
    })?;
    let block_size = stat.fragment_size().max(1) as u64;
    Ok(VolumeCapacity {
        total_bytes: stat.blocks() as u64 * block_size,
        free_bytes: stat.blocks_available() as u64 * block_size,
    })
}
