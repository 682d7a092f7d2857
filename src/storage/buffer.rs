use crate::concurrency::{LockManager, LockMode};
use crate::config::StorageConfig;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, Page, PageId};
use crate::transaction::TransactionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Access mode requested for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn lock_mode(&self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Outcome of a successful cache lookup. The page lock is held in both cases.
#[derive(Debug, Clone)]
pub enum PageLookup {
    Cached(Arc<HeapPage>),
    /// The page is not resident. The caller may read it from disk and hand it
    /// back through [`PageCache::install_page`].
    NotCached,
}

/// Grants transactions access to pages under the locking discipline.
pub trait PageCache: Send + Sync {
    /// Locks `page_id` for `tid` and looks it up.
    ///
    /// Lock timeouts and deadlocks surface as `TransactionAborted`.
    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> StorageResult<PageLookup>;

    /// Makes a page materialized by `tid` resident and returns the shared copy.
    fn install_page(&self, tid: TransactionId, page: HeapPage) -> StorageResult<Arc<HeapPage>>;
}

impl<T: PageCache + ?Sized> PageCache for Arc<T> {
    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> StorageResult<PageLookup> {
        (**self).get_page(tid, page_id, perm)
    }

    fn install_page(&self, tid: TransactionId, page: HeapPage) -> StorageResult<Arc<HeapPage>> {
        (**self).install_page(tid, page)
    }
}

/// Shared page cache.
///
/// Pages are read-only, so dropping one from the table never needs a write
/// back. When full, the page resident the longest is dropped; readers that
/// still hold its `Arc` keep a valid copy.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    page_table: DashMap<PageId, Arc<HeapPage>>,
    /// Resident pages, oldest first. Also serializes installs.
    arrival: Mutex<VecDeque<PageId>>,
    lock_manager: LockManager,
    max_pages: usize,
}

impl BufferPool {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                page_table: DashMap::with_capacity(config.buffer_pool_pages),
                arrival: Mutex::new(VecDeque::with_capacity(config.buffer_pool_pages)),
                lock_manager: LockManager::new(config.lock_timeout),
                max_pages: config.buffer_pool_pages,
            }),
        }
    }

    /// Releases the lock `tid` holds on `page_id`.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.release(tid, page_id)
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.lock_mode(tid, page_id).is_some()
    }

    /// Releases every page lock held by `tid`.
    pub fn transaction_complete(&self, tid: TransactionId) {
        debug!("{} complete, releasing locks", tid);
        self.inner.lock_manager.release_all(tid);
    }

    /// Drops `page_id` from the cache without touching its locks.
    pub fn discard_page(&self, page_id: PageId) {
        let mut arrival = self.inner.arrival.lock();
        if self.inner.page_table.remove(&page_id).is_some() {
            arrival.retain(|resident| *resident != page_id);
        }
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.page_table.contains_key(&page_id)
    }

    pub fn resident_pages(&self) -> usize {
        self.inner.page_table.len()
    }
}

impl PageCache for BufferPool {
    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        perm: Permission,
    ) -> StorageResult<PageLookup> {
        self.inner
            .lock_manager
            .acquire(tid, page_id, perm.lock_mode())?;

        match self.inner.page_table.get(&page_id) {
            Some(entry) => {
                trace!("Cache hit for page {}", page_id);
                Ok(PageLookup::Cached(Arc::clone(entry.value())))
            }
            None => {
                trace!("Cache miss for page {}", page_id);
                Ok(PageLookup::NotCached)
            }
        }
    }

    fn install_page(&self, tid: TransactionId, page: HeapPage) -> StorageResult<Arc<HeapPage>> {
        let page_id = page.page_id();
        if !self.holds_lock(tid, page_id) {
            return Err(StorageError::IllegalState(format!(
                "{} installed page {} without holding its lock",
                tid, page_id
            )));
        }

        let mut arrival = self.inner.arrival.lock();
        let page = match self.inner.page_table.entry(page_id) {
            Entry::Occupied(entry) => return Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let page = Arc::new(page);
                entry.insert(Arc::clone(&page));
                page
            }
        };
        arrival.push_back(page_id);

        while arrival.len() > self.inner.max_pages {
            let Some(oldest) = arrival.pop_front() else {
                break;
            };
            self.inner.page_table.remove(&oldest);
            debug!("Dropped page {} from cache", oldest);
        }

        Ok(page)
    }
}
