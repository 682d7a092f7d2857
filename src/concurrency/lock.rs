//! Page-level lock management.
//!
//! Transactions take shared locks to read a page and exclusive locks to
//! write one. A request that cannot be granted waits until the holders
//! release or the timeout expires; a request that would close a cycle in the
//! wait-for graph is refused at once.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, trace};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// Whether holding `self` already satisfies a request for `wanted`.
    fn covers(&self, wanted: LockMode) -> bool {
        *self == LockMode::Exclusive || wanted == LockMode::Shared
    }
}

#[derive(Debug, Default)]
struct LockTable {
    /// Granted locks per page.
    holders: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// Pages each transaction holds a lock on.
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Wait-for graph: waiter -> transactions it is blocked on.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTable {
    /// Grants the lock or returns the transactions standing in the way.
    fn try_grant(
        &mut self,
        tid: TransactionId,
        page_id: PageId,
        mode: LockMode,
    ) -> Result<(), HashSet<TransactionId>> {
        let holders = self.holders.entry(page_id).or_default();

        if let Some(current) = holders.get(&tid) {
            if current.covers(mode) {
                return Ok(());
            }
        }

        let blockers: HashSet<TransactionId> = holders
            .iter()
            .filter(|(holder, held_mode)| **holder != tid && !held_mode.is_compatible_with(&mode))
            .map(|(holder, _)| *holder)
            .collect();
        if !blockers.is_empty() {
            return Err(blockers);
        }

        // Inserting over an existing shared entry upgrades it
        holders.insert(tid, mode);
        self.held.entry(tid).or_default().insert(page_id);
        Ok(())
    }

    /// Would waiting on `blockers` let `waiter` wait on itself?
    fn would_deadlock(&self, waiter: TransactionId, blockers: &HashSet<TransactionId>) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = blockers.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }
            if visited.insert(current) {
                if let Some(next) = self.wait_for.get(&current) {
                    queue.extend(next.iter().copied());
                }
            }
        }
        false
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) -> bool {
        let removed = match self.holders.get_mut(&page_id) {
            Some(holders) => {
                let removed = holders.remove(&tid).is_some();
                if holders.is_empty() {
                    self.holders.remove(&page_id);
                }
                removed
            }
            None => false,
        };

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        removed
    }
}

/// Lock manager keyed by page.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquires `mode` on `page_id` for `tid`, blocking up to the timeout.
    ///
    /// Fails with `TransactionAborted` on timeout or when waiting would
    /// deadlock. A shared lock held by `tid` alone is upgraded in place.
    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> StorageResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        loop {
            let blockers = match table.try_grant(tid, page_id, mode) {
                Ok(()) => {
                    table.wait_for.remove(&tid);
                    return Ok(());
                }
                Err(blockers) => blockers,
            };

            if table.would_deadlock(tid, &blockers) {
                table.wait_for.remove(&tid);
                debug!("{} aborted: deadlock on page {}", tid, page_id);
                return Err(StorageError::TransactionAborted {
                    tid,
                    reason: format!("deadlock waiting for page {}", page_id),
                });
            }

            if Instant::now() >= deadline {
                table.wait_for.remove(&tid);
                debug!("{} aborted: lock timeout on page {}", tid, page_id);
                return Err(StorageError::TransactionAborted {
                    tid,
                    reason: format!("timed out waiting for {:?} lock on page {}", mode, page_id),
                });
            }

            trace!("{} waiting for {:?} lock on page {}", tid, mode, page_id);
            table.wait_for.insert(tid, blockers);
            self.released.wait_until(&mut table, deadline);
        }
    }

    /// Releases the lock `tid` holds on `page_id`. Returns false if none was held.
    pub fn release(&self, tid: TransactionId, page_id: PageId) -> bool {
        let removed = self.table.lock().release(tid, page_id);
        if removed {
            self.released.notify_all();
        }
        removed
    }

    /// Releases every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        {
            let mut table = self.table.lock();
            let pages: Vec<PageId> = table
                .held
                .get(&tid)
                .map(|pages| pages.iter().copied().collect())
                .unwrap_or_default();
            for page_id in pages {
                table.release(tid, page_id);
            }
            table.wait_for.remove(&tid);
        }
        self.released.notify_all();
    }

    /// The mode `tid` currently holds on `page_id`, if any.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .holders
            .get(&page_id)
            .and_then(|holders| holders.get(&tid).copied())
    }

    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
