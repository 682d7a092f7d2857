//! Storage layer error types.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed page {page_id}: {reason}")]
    Format { page_id: PageId, reason: String },

    #[error("Page {page_no} out of range (table has {num_pages} pages)")]
    PageOutOfRange { page_no: u32, num_pages: u32 },

    #[error("Page {page_id} does not belong to table {table_id}")]
    TableMismatch {
        page_id: PageId,
        table_id: crate::storage::page::TableId,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Transaction {tid} aborted: {reason}")]
    TransactionAborted { tid: TransactionId, reason: String },

    #[error("No such element: {0}")]
    NoSuchElement(&'static str),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

impl StorageError {
    /// Whether the error signals that the calling transaction must abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, StorageError::TransactionAborted { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
