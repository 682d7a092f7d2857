//! Tuple descriptors.

use crate::access::value::{tuple_width, DataType};
use crate::storage::error::{StorageError, StorageResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of columns every tuple of a table conforms to.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
    types: Vec<DataType>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> StorageResult<Self> {
        if columns.is_empty() {
            return Err(StorageError::SchemaMismatch(
                "Schema must have at least one column".to_string(),
            ));
        }
        let types = columns.iter().map(|c| c.data_type).collect();
        Ok(Self { columns, types })
    }

    /// Builds a schema of unnamed columns (`col0`, `col1`, ...).
    pub fn from_types(types: &[DataType]) -> StorageResult<Self> {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, dt)| Column::new(format!("col{}", i), *dt))
                .collect(),
        )
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Bytes one tuple occupies on a page.
    pub fn tuple_size(&self) -> usize {
        tuple_width(&self.types)
    }
}
