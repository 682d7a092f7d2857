//! Sequential scan over every tuple of a table file.

use crate::access::tuple::Tuple;
use crate::storage::buffer::{PageCache, PageLookup, Permission};
use crate::storage::disk::TableFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPageIter, PageId};
use crate::transaction::TransactionId;
use log::{debug, trace};
use std::sync::Arc;

/// Walks a table page by page, then slot by slot, on behalf of one
/// transaction.
///
/// Pages come from the cache collaborator under a shared lock. A page the
/// cache does not hold is read from the table file while that lock is held
/// and handed back to the cache. Errors from either path are returned to the
/// caller as they are.
///
/// The iterator starts closed. `rewind` restarts from page 0 without
/// reopening; `close` only stops future fetches.
pub struct TableScanIterator<C: PageCache> {
    file: Arc<TableFile>,
    cache: C,
    tid: TransactionId,
    open: bool,
    page_no: u32,
    current: Option<HeapPageIter>,
    lookahead: Option<Tuple>,
}

impl<C: PageCache> TableScanIterator<C> {
    pub fn new(file: Arc<TableFile>, cache: C, tid: TransactionId) -> Self {
        Self {
            file,
            cache,
            tid,
            open: false,
            page_no: 0,
            current: None,
            lookahead: None,
        }
    }

    pub fn open(&mut self) {
        debug!("{} opened scan of table {}", self.tid, self.file.id());
        self.open = true;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Page the cursor is on.
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.tid
    }

    /// Fetches the tuples of page `page_no`, or `None` past the last page.
    fn fetch_page(&self, page_no: u32) -> StorageResult<Option<HeapPageIter>> {
        if page_no >= self.file.num_pages() {
            return Ok(None);
        }

        let page_id = PageId::new(self.file.id(), page_no);
        let page = match self
            .cache
            .get_page(self.tid, page_id, Permission::ReadOnly)?
        {
            PageLookup::Cached(page) => page,
            PageLookup::NotCached => {
                trace!("{} materializing page {}", self.tid, page_id);
                let page = self.file.read_page(page_id)?;
                self.cache.install_page(self.tid, page)?
            }
        };

        Ok(Some(page.iter()))
    }

    pub fn has_next(&mut self) -> StorageResult<bool> {
        if !self.open {
            return Ok(false);
        }
        if self.lookahead.is_some() {
            return Ok(true);
        }

        if self.current.is_none() {
            self.current = self.fetch_page(self.page_no)?;
        }

        loop {
            let Some(tuples) = self.current.as_mut() else {
                return Ok(false);
            };
            if let Some(tuple) = tuples.next() {
                self.lookahead = Some(tuple);
                return Ok(true);
            }

            // The cursor only moves once the next page is in hand, so a
            // failed fetch is retried on the next call instead of skipped.
            let next = self.fetch_page(self.page_no + 1)?;
            self.page_no += 1;
            self.current = next;
        }
    }

    /// Returns the next tuple.
    ///
    /// Fails with `NoSuchElement` when the scan is closed or exhausted.
    pub fn next(&mut self) -> StorageResult<Tuple> {
        if !self.open {
            return Err(StorageError::NoSuchElement("scan is not open"));
        }
        if !self.has_next()? {
            return Err(StorageError::NoSuchElement("scan is exhausted"));
        }
        self.lookahead
            .take()
            .ok_or(StorageError::NoSuchElement("scan is exhausted"))
    }

    /// Moves the cursor back to page 0; the next call re-fetches it.
    pub fn rewind(&mut self) -> StorageResult<()> {
        if !self.open {
            return Err(StorageError::IllegalState(
                "rewind called on a closed scan".to_string(),
            ));
        }
        debug!("{} rewound scan of table {}", self.tid, self.file.id());
        self.page_no = 0;
        self.current = None;
        self.lookahead = None;
        Ok(())
    }

    pub fn close(&mut self) {
        debug!("{} closed scan of table {}", self.tid, self.file.id());
        self.open = false;
        self.current = None;
        self.lookahead = None;
    }

    /// Adapts the scan to a standard iterator of results.
    pub fn tuples(&mut self) -> Tuples<'_, C> {
        Tuples { scan: self }
    }
}

/// Iterator view over an open [`TableScanIterator`].
///
/// Ends after the first error.
pub struct Tuples<'a, C: PageCache> {
    scan: &'a mut TableScanIterator<C>,
}

impl<C: PageCache> Iterator for Tuples<'_, C> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan.has_next() {
            Ok(true) => Some(self.scan.next()),
            Ok(false) => None,
            Err(e) => {
                self.scan.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::schema::Schema;
    use crate::access::value::{DataType, Value};
    use crate::config::StorageConfig;
    use crate::storage::buffer::BufferPool;
    use crate::storage::page::heap_page::slots_per_page;
    use crate::storage::page::{HeapPage, Page};
    use anyhow::Result;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_types(&[DataType::Int32, DataType::Int32]).unwrap())
    }

    /// Writes one page per entry holding that many tuples `(page, i)`.
    fn create_table(dir: &TempDir, counts: &[usize]) -> Result<Arc<TableFile>> {
        let path = dir.path().join("table.dat");
        let schema = schema();
        let mut file = std::fs::File::create(&path)?;
        for (page, &count) in counts.iter().enumerate() {
            let tuples: Vec<Vec<Value>> = (0..count)
                .map(|i| vec![Value::Int32(page as i32), Value::Int32(i as i32)])
                .collect();
            file.write_all(&HeapPage::encode(&schema, &tuples)?[..])?;
        }
        drop(file);
        open_table(&path)
    }

    fn open_table(path: &Path) -> Result<Arc<TableFile>> {
        Ok(Arc::new(TableFile::open(
            path,
            schema(),
            &StorageConfig::default(),
        )?))
    }

    fn drain<C: PageCache>(scan: &mut TableScanIterator<C>) -> Result<Vec<(i32, i32)>> {
        let mut out = Vec::new();
        while scan.has_next()? {
            let tuple = scan.next()?;
            match (&tuple.values[0], &tuple.values[1]) {
                (Value::Int32(p), Value::Int32(i)) => out.push((*p, *i)),
                other => panic!("unexpected values {:?}", other),
            }
        }
        Ok(out)
    }

    fn pool() -> BufferPool {
        BufferPool::new(&StorageConfig::default())
    }

    /// Cache that never holds anything and records what it was asked for.
    #[derive(Default)]
    struct RecordingCache {
        requests: Mutex<Vec<(PageId, Permission)>>,
        installs: Mutex<Vec<PageId>>,
    }

    impl PageCache for RecordingCache {
        fn get_page(
            &self,
            _tid: TransactionId,
            page_id: PageId,
            perm: Permission,
        ) -> StorageResult<PageLookup> {
            self.requests.lock().push((page_id, perm));
            Ok(PageLookup::NotCached)
        }

        fn install_page(
            &self,
            _tid: TransactionId,
            page: HeapPage,
        ) -> StorageResult<Arc<HeapPage>> {
            self.installs.lock().push(page.page_id());
            Ok(Arc::new(page))
        }
    }

    /// Cache that aborts every request.
    struct AbortingCache;

    impl PageCache for AbortingCache {
        fn get_page(
            &self,
            tid: TransactionId,
            _page_id: PageId,
            _perm: Permission,
        ) -> StorageResult<PageLookup> {
            Err(StorageError::TransactionAborted {
                tid,
                reason: "test".to_string(),
            })
        }

        fn install_page(
            &self,
            _tid: TransactionId,
            _page: HeapPage,
        ) -> StorageResult<Arc<HeapPage>> {
            unreachable!("aborted lookups never install")
        }
    }

    /// Delegates to a pool but aborts the first request for one page.
    struct FlakyCache {
        pool: BufferPool,
        flaky_page: PageId,
        tripped: Mutex<bool>,
    }

    impl PageCache for FlakyCache {
        fn get_page(
            &self,
            tid: TransactionId,
            page_id: PageId,
            perm: Permission,
        ) -> StorageResult<PageLookup> {
            if page_id == self.flaky_page {
                let mut tripped = self.tripped.lock();
                if !*tripped {
                    *tripped = true;
                    return Err(StorageError::TransactionAborted {
                        tid,
                        reason: "lock timeout".to_string(),
                    });
                }
            }
            self.pool.get_page(tid, page_id, perm)
        }

        fn install_page(
            &self,
            tid: TransactionId,
            page: HeapPage,
        ) -> StorageResult<Arc<HeapPage>> {
            self.pool.install_page(tid, page)
        }
    }

    #[test]
    fn test_scan_in_page_order() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[3, 2, 4])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        let rows = drain(&mut scan)?;
        assert_eq!(
            rows,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0), (2, 1), (2, 2), (2, 3)]
        );
        assert_eq!(scan.page_no(), 3);
        Ok(())
    }

    #[test]
    fn test_empty_table() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        assert!(!scan.has_next()?);
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement(_))));
        Ok(())
    }

    #[test]
    fn test_skips_empty_pages() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[0, 2, 0, 0, 1, 0])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        assert_eq!(drain(&mut scan)?, vec![(1, 0), (1, 1), (4, 0)]);
        Ok(())
    }

    #[test]
    fn test_closed_scan() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[2])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));

        assert!(!scan.has_next()?);
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement(_))));
        assert!(matches!(scan.rewind(), Err(StorageError::IllegalState(_))));

        scan.open();
        assert!(scan.has_next()?);
        scan.close();
        assert!(!scan.is_open());
        assert!(!scan.has_next()?);
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement(_))));
        Ok(())
    }

    #[test]
    fn test_next_without_has_next() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[1, 1])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        assert_eq!(scan.next()?.values[0], Value::Int32(0));
        assert_eq!(scan.next()?.values[0], Value::Int32(1));
        assert!(matches!(scan.next(), Err(StorageError::NoSuchElement(_))));
        Ok(())
    }

    #[test]
    fn test_has_next_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[1, 1])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        assert!(scan.has_next()?);
        assert!(scan.has_next()?);
        assert_eq!(scan.next()?.values[0], Value::Int32(0));
        Ok(())
    }

    #[test]
    fn test_rewind_after_partial_scan() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[3, 3])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        let full = drain(&mut scan)?;
        scan.rewind()?;
        for _ in 0..4 {
            scan.next()?;
        }
        scan.rewind()?;
        assert_eq!(scan.page_no(), 0);
        assert_eq!(drain(&mut scan)?, full);
        Ok(())
    }

    #[test]
    fn test_exhaustion_persists_until_rewind() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[2])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        drain(&mut scan)?;
        assert!(!scan.has_next()?);
        assert!(!scan.has_next()?);
        assert_eq!(scan.page_no(), table.num_pages());

        scan.rewind()?;
        assert!(scan.has_next()?);
        Ok(())
    }

    #[test]
    fn test_miss_reads_file_and_installs() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[1, 1])?;
        let cache = Arc::new(RecordingCache::default());
        let mut scan = table.scan(Arc::clone(&cache), TransactionId::new(7));
        scan.open();

        assert_eq!(drain(&mut scan)?.len(), 2);

        let expected: Vec<PageId> = (0..2).map(|n| PageId::new(table.id(), n)).collect();
        let requests = cache.requests.lock().clone();
        assert_eq!(
            requests,
            expected
                .iter()
                .map(|pid| (*pid, Permission::ReadOnly))
                .collect::<Vec<_>>()
        );
        assert_eq!(*cache.installs.lock(), expected);
        Ok(())
    }

    #[test]
    fn test_abort_is_not_swallowed() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[2])?;
        let mut scan = table.scan(AbortingCache, TransactionId::new(1));
        scan.open();

        match scan.has_next() {
            Err(e) => assert!(e.is_abort()),
            Ok(found) => panic!("abort was hidden, has_next returned {}", found),
        }
        Ok(())
    }

    #[test]
    fn test_read_error_surfaces() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[1, 1])?;

        // Truncate the file after the page count was taken
        let file = std::fs::OpenOptions::new().write(true).open(table.path())?;
        file.set_len(100)?;
        drop(file);

        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();
        assert!(matches!(scan.has_next(), Err(StorageError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_failed_fetch_is_retried_not_skipped() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[1, 1, 1])?;
        let cache = FlakyCache {
            pool: pool(),
            flaky_page: PageId::new(table.id(), 1),
            tripped: Mutex::new(false),
        };
        let mut scan = table.scan(cache, TransactionId::new(1));
        scan.open();

        assert_eq!(scan.next()?.values[0], Value::Int32(0));
        match scan.has_next() {
            Err(e) => assert!(e.is_abort()),
            Ok(found) => panic!("abort was hidden, has_next returned {}", found),
        }
        assert_eq!(scan.page_no(), 0);

        // Retrying picks up at the page that failed
        assert_eq!(drain(&mut scan)?, vec![(1, 0), (2, 0)]);
        Ok(())
    }

    #[test]
    fn test_corrupt_page_surfaces_format_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("flags.dat");
        let schema = Arc::new(Schema::from_types(&[DataType::Boolean])?);

        let good = HeapPage::encode(&schema, &[vec![Value::Boolean(true)]])?;
        let mut bad = HeapPage::encode(&schema, &[vec![Value::Boolean(false)]])?;
        // Slot 0's field sits after the header and the one-byte null bitmap
        let header = slots_per_page(&schema).div_ceil(8);
        bad[header + 1] = 7;

        let mut file = std::fs::File::create(&path)?;
        file.write_all(&good[..])?;
        file.write_all(&bad[..])?;
        drop(file);

        let table = Arc::new(TableFile::open(&path, schema, &StorageConfig::default())?);
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        assert_eq!(scan.next()?.values, vec![Value::Boolean(true)]);
        assert!(matches!(scan.has_next(), Err(StorageError::Format { .. })));
        // Still failing on retry rather than ending the scan early
        assert!(matches!(scan.next(), Err(StorageError::Format { .. })));
        Ok(())
    }

    #[test]
    fn test_scan_reuses_cached_pages() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[2, 2])?;
        let pool = pool();
        let tid = TransactionId::new(1);

        let mut first = table.scan(pool.clone(), tid);
        first.open();
        assert_eq!(drain(&mut first)?.len(), 4);
        assert_eq!(pool.resident_pages(), 2);
        assert!(pool.holds_lock(tid, PageId::new(table.id(), 1)));

        // Pages are served from the cache once resident
        std::fs::OpenOptions::new()
            .write(true)
            .open(table.path())?
            .set_len(0)?;
        let mut second = table.scan(pool.clone(), tid);
        second.open();
        assert_eq!(drain(&mut second)?.len(), 4);
        Ok(())
    }

    #[test]
    fn test_tuples_adapter() -> Result<()> {
        let dir = tempdir()?;
        let table = create_table(&dir, &[2, 0, 3])?;
        let mut scan = table.scan(pool(), TransactionId::new(1));
        scan.open();

        let tuples = scan.tuples().collect::<StorageResult<Vec<_>>>()?;
        assert_eq!(tuples.len(), 5);
        assert!(tuples.windows(2).all(|w| w[0].tuple_id < w[1].tuple_id));
        Ok(())
    }
}
