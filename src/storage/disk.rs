pub mod table_file;

pub use table_file::{TableFile, PAGE_SIZE};
