//! Storage layer implementation for heapdb.
//!
//! A table lives in a flat file of fixed-size pages. Key components:
//!
//! - **TableFile**: Binds a table to its backing file and reads pages by number
//! - **HeapPage**: Slot-bitmap page format holding fixed-width tuples
//! - **BufferPool**: Shared page cache that hands out pages under page locks
//!
//! Pages are read-only from this layer's perspective; the mutation entry points
//! exist but report `NotImplemented`.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPool, PageCache, PageLookup, Permission};
pub use disk::{TableFile, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, HeapPageIter, Page, PageId, TableId};
