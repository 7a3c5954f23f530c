//! Runner configuration.

/// Default number of rows per backfill batch.
pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 1000;

/// Migration runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Refuse to run when the ledger records versions the registry does not
    /// know.
    pub stop_on_unknown_applied: bool,
    /// Plan only; no executor calls and no ledger writes.
    pub dry_run: bool,
    /// Upper bound on rows per batch for bulk data rewrites.
    pub backfill_batch_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stop_on_unknown_applied: false,
            dry_run: false,
            backfill_batch_size: DEFAULT_BACKFILL_BATCH_SIZE,
        }
    }
}

impl RunnerConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject ledgers containing unknown versions.
    pub fn with_stop_on_unknown_applied(mut self, enabled: bool) -> Self {
        self.stop_on_unknown_applied = enabled;
        self
    }

    /// Enable dry-run mode.
    pub fn with_dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Set the backfill batch size. Zero is treated as one.
    pub fn with_backfill_batch_size(mut self, size: usize) -> Self {
        self.backfill_batch_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = RunnerConfig::new()
            .with_dry_run(true)
            .with_stop_on_unknown_applied(true)
            .with_backfill_batch_size(0);

        assert!(config.dry_run);
        assert!(config.stop_on_unknown_applied);
        assert_eq!(config.backfill_batch_size, 1);
        assert_eq!(RunnerConfig::default().backfill_batch_size, DEFAULT_BACKFILL_BATCH_SIZE);
    }
}
