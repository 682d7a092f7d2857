//! Runtime configuration for the storage layer.

use std::time::Duration;

/// Default page budget for a single table file.
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Default number of pages the buffer pool keeps resident.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Default time a transaction waits for a page lock before aborting.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Upper bound on the page count of a table file, whatever its size.
    pub max_pages: u32,
    pub buffer_pool_pages: usize,
    pub lock_timeout: Duration,
}

impl StorageConfig {
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            buffer_pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}
