//! Access layer for tuple-oriented operations.
//!
//! - **Schema**: Column layout every tuple of a table conforms to
//! - **Tuple**: Decoded row tagged with its page and slot
//! - **Value / DataType**: Typed field values and their fixed-width encoding
//! - **TableScanIterator**: Transaction-aware sequential scan of a table file

pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use scan::{TableScanIterator, Tuples};
pub use schema::{Column, Schema};
pub use tuple::{Tuple, TupleId};
pub use value::{deserialize_values, serialize_values, DataType, Value};
