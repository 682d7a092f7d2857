use crate::access::scan::TableScanIterator;
use crate::access::schema::Schema;
use crate::access::tuple::{Tuple, TupleId};
use crate::config::StorageConfig;
use crate::storage::buffer::PageCache;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::heap_page::slots_per_page;
use crate::storage::page::{HeapPage, Page, PageId, TableId};
use crate::transaction::TransactionId;
use log::{debug, trace, warn};
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PAGE_SIZE: usize = 4096;

/// The on-disk backing store of one table: a headerless run of
/// `PAGE_SIZE`-byte pages numbered from 0.
///
/// The page count is taken once when the file is opened. Pages appended to
/// the file afterwards are not seen by this handle.
#[derive(Debug)]
pub struct TableFile {
    path: PathBuf,
    id: TableId,
    schema: Arc<Schema>,
    num_pages: u32,
}

impl TableFile {
    pub fn open(path: &Path, schema: Arc<Schema>, config: &StorageConfig) -> StorageResult<Self> {
        let path = std::path::absolute(path)?;
        if slots_per_page(&schema) == 0 {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple size {} does not fit in a {}-byte page",
                schema.tuple_size(),
                PAGE_SIZE
            )));
        }

        let file_size = std::fs::metadata(&path)?.len();
        let whole_pages = file_size / PAGE_SIZE as u64;
        let num_pages = if whole_pages > config.max_pages as u64 {
            warn!(
                "{:?} holds {} pages, limiting to {}",
                path, whole_pages, config.max_pages
            );
            config.max_pages
        } else {
            whole_pages as u32
        };

        let id = Self::table_id_for(&path);
        debug!("Opened table {} at {:?} with {} pages", id, path, num_pages);

        Ok(Self {
            path,
            id,
            schema,
            num_pages,
        })
    }

    fn table_id_for(path: &Path) -> TableId {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        let hash = hasher.finish();
        TableId((hash ^ (hash >> 32)) as u32)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Reads page `page_id.page_no` straight from disk.
    ///
    /// The file handle is opened for this call only and closed on every
    /// return path.
    pub fn read_page(&self, page_id: PageId) -> StorageResult<HeapPage> {
        if page_id.table_id != self.id {
            return Err(StorageError::TableMismatch {
                page_id,
                table_id: self.id,
            });
        }
        if page_id.page_no >= self.num_pages {
            return Err(StorageError::PageOutOfRange {
                page_no: page_id.page_no,
                num_pages: self.num_pages,
            });
        }

        let offset = page_id.page_no as u64 * PAGE_SIZE as u64;
        let mut data = HeapPage::empty_page_data();
        {
            let mut file = File::open(&self.path)?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data[..])?;
        }
        trace!("Read page {} from {:?}", page_id, self.path);

        HeapPage::from_bytes(page_id, &self.schema, data)
    }

    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        debug!("Rejecting write of page {}", page.page_id());
        Err(StorageError::NotImplemented("TableFile::write_page"))
    }

    pub fn insert_tuple(&self, _tid: TransactionId, _tuple: &Tuple) -> StorageResult<Vec<PageId>> {
        Err(StorageError::NotImplemented("TableFile::insert_tuple"))
    }

    pub fn delete_tuple(&self, _tid: TransactionId, _tuple_id: TupleId) -> StorageResult<Vec<PageId>> {
        Err(StorageError::NotImplemented("TableFile::delete_tuple"))
    }

    /// Sequential scan over every tuple of this table on behalf of `tid`.
    pub fn scan<C: PageCache>(self: &Arc<Self>, cache: C, tid: TransactionId) -> TableScanIterator<C> {
        TableScanIterator::new(Arc::clone(self), cache, tid)
    }
}
