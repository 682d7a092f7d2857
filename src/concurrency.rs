//! Concurrency control module.
//!
//! Page-granularity shared/exclusive locking with timeout and deadlock
//! detection. The buffer pool takes these locks on behalf of transactions.

pub mod lock;

pub use lock::{LockManager, LockMode};
