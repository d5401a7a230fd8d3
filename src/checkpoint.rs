//! Checkpointer — triggers an atomic mid-scan save once enough fresh
//! content has been hashed, so a long-running scan over a huge tree
//! doesn't lose hours of checksum work to a crash (spec.md §4.8).

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Save(#[from] crate::state_store::StateStoreError),
}

/// Accumulates bytes freshly hashed during reconciliation and reports when
/// the configured threshold (default 10 GiB, spec.md §4.8) has been
/// crossed.
pub struct Checkpointer {
    accumulated_bytes: u64,
    threshold_bytes: u64,
}

impl Checkpointer {
    pub fn new(threshold_bytes: u64) -> Self {
        Checkpointer {
            accumulated_bytes: 0,
            threshold_bytes,
        }
    }

    pub fn record_bytes(&mut self, bytes: u64) {
        self.accumulated_bytes += bytes;
    }

    /// Whether enough bytes have accumulated since the last reset to
    /// warrant a checkpoint save.
    pub fn is_due(&self) -> bool {
        self.threshold_bytes > 0 && self.accumulated_bytes >= self.threshold_bytes
    }

    pub fn reset(&mut self) {
        self.accumulated_bytes = 0;
    }

    /// Saves `store` and resets the accumulator if (and only if) the
    /// threshold has been crossed. No-op otherwise.
    pub fn checkpoint_if_due(
        &mut self,
        store: &mut crate::state_store::StateStore,
        database: &std::path::Path,
    ) -> Result<bool, CheckpointError> {
        if !self.is_due() {
            return Ok(false);
        }
        tracing::debug!(
            "checkpoint threshold crossed ({} bytes hashed), saving state",
            self.accumulated_bytes
        );
        store.save(database)?;
        self.reset();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_due_below_threshold() {
        let mut checkpointer = Checkpointer::new(1000);
        checkpointer.record_bytes(500);
        assert!(!checkpointer.is_due());
    }

    #[test]
    fn due_once_threshold_crossed() {
        let mut checkpointer = Checkpointer::new(1000);
        checkpointer.record_bytes(600);
        checkpointer.record_bytes(500);
        assert!(checkpointer.is_due());
    }

    #[test]
    fn reset_clears_accumulator() {
        let mut checkpointer = Checkpointer::new(1000);
        checkpointer.record_bytes(2000);
        assert!(checkpointer.is_due());
        checkpointer.reset();
        assert!(!checkpointer.is_due());
    }

    #[test]
    fn zero_threshold_never_triggers() {
        let mut checkpointer = Checkpointer::new(0);
        checkpointer.record_bytes(1_000_000);
        assert!(!checkpointer.is_due());
    }

    #[test]
    fn checkpoint_if_due_saves_and_resets() {
        let temp = tempfile::TempDir::new().unwrap();
        let db = temp.path().join("state.dat");
        let mut store = crate::state_store::StateStore::empty();
        let mut checkpointer = Checkpointer::new(10);
        checkpointer.record_bytes(20);

        let saved = checkpointer.checkpoint_if_due(&mut store, &db).unwrap();
        assert!(saved);
        assert!(db.exists());
        assert!(!checkpointer.is_due());
    }
}
