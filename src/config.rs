//! Runtime configuration for maintenance runs and the in-memory store.

use std::fmt;

use crate::store::{Isolation, LockMode, OpenMode, OpenOptions};

/// Default number of rows moved per relocation batch.
pub const DEFAULT_RELOCATION_BATCH_SIZE: usize = 100;

/// Default page size of the in-memory store, in bytes.
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Default number of index entries per index page.
pub const DEFAULT_INDEX_ENTRIES_PER_PAGE: usize = 64;

/// Smallest page size the in-memory store accepts.
pub const MIN_PAGE_SIZE: u32 = 128;

/// What defragmentation does when the index entry for a relocated row is
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingEntryPolicy {
    /// Fail the phase with an internal-inconsistency error and abandon all
    /// relocation work.
    #[default]
    Abort,
    /// Log the problem and insert the entry for the new location anyway.
    Reinsert,
}

/// Configuration for consistency checks and compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintConfig {
    /// Rows requested from the relocation scan per batch.
    pub relocation_batch_size: usize,
    /// Lock granularity for every scan and controller opened.
    pub lock_mode: LockMode,
    /// Isolation level for every scan and controller opened.
    pub isolation: Isolation,
    /// Behavior when a relocated row's index entry cannot be found.
    pub missing_entry_policy: MissingEntryPolicy,
}

impl Default for MaintConfig {
    fn default() -> Self {
        Self {
            relocation_batch_size: DEFAULT_RELOCATION_BATCH_SIZE,
            lock_mode: LockMode::Table,
            isolation: Isolation::Serializable,
            missing_entry_policy: MissingEntryPolicy::Abort,
        }
    }
}

impl MaintConfig {
    pub fn with_relocation_batch_size(mut self, rows: usize) -> Self {
        self.relocation_batch_size = rows;
        self
    }

    pub fn with_lock_mode(mut self, lock_mode: LockMode) -> Self {
        self.lock_mode = lock_mode;
        self
    }

    pub fn with_isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_missing_entry_policy(mut self, policy: MissingEntryPolicy) -> Self {
        self.missing_entry_policy = policy;
        self
    }

    /// Open options derived from this configuration.
    pub fn open_options(&self, mode: OpenMode) -> OpenOptions {
        OpenOptions {
            mode,
            lock: self.lock_mode,
            isolation: self.isolation,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relocation_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

/// Configuration for [`MemoryStore`](crate::store::MemoryStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Heap page size in bytes.
    pub page_size: u32,
    /// Index entries that fit on one index page.
    pub index_entries_per_page: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            index_entries_per_page: DEFAULT_INDEX_ENTRIES_PER_PAGE,
        }
    }
}

impl MemoryStoreConfig {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_index_entries_per_page(mut self, entries: usize) -> Self {
        self.index_entries_per_page = entries;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size < MIN_PAGE_SIZE || self.page_size > u32::from(u16::MAX) {
            return Err(ConfigError::PageSizeOutOfRange(self.page_size));
        }
        if self.index_entries_per_page == 0 {
            return Err(ConfigError::ZeroIndexFanout);
        }
        Ok(())
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `relocation_batch_size` was 0.
    ZeroBatchSize,
    /// `page_size` outside `MIN_PAGE_SIZE..=65535`.
    PageSizeOutOfRange(u32),
    /// `index_entries_per_page` was 0.
    ZeroIndexFanout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroBatchSize => write!(f, "relocation batch size must be positive"),
            ConfigError::PageSizeOutOfRange(size) => write!(
                f,
                "page size {} out of range ({}..={})",
                size,
                MIN_PAGE_SIZE,
                u16::MAX
            ),
            ConfigError::ZeroIndexFanout => {
                write!(f, "index entries per page must be positive")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MaintConfig::default();
        assert_eq!(config.relocation_batch_size, 100);
        assert_eq!(config.lock_mode, LockMode::Table);
        assert_eq!(config.isolation, Isolation::Serializable);
        assert_eq!(config.missing_entry_policy, MissingEntryPolicy::Abort);
        config.validate().unwrap();
        MemoryStoreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = MaintConfig::default().with_relocation_batch_size(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn test_store_config_bounds() {
        let small = MemoryStoreConfig::default().with_page_size(64);
        assert_eq!(small.validate(), Err(ConfigError::PageSizeOutOfRange(64)));

        let huge = MemoryStoreConfig::default().with_page_size(1 << 20);
        assert!(huge.validate().is_err());

        let fanout = MemoryStoreConfig::default().with_index_entries_per_page(0);
        assert_eq!(fanout.validate(), Err(ConfigError::ZeroIndexFanout));
    }

    #[test]
    fn test_open_options_follow_config() {
        let config = MaintConfig::default()
            .with_lock_mode(LockMode::Row)
            .with_isolation(Isolation::ReadCommitted);
        let options = config.open_options(OpenMode::ForUpdate);
        assert!(options.for_update());
        assert_eq!(options.lock, LockMode::Row);
        assert_eq!(options.isolation, Isolation::ReadCommitted);
    }
}
