use crate::storage::error::{StorageError, StorageResult};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

/// Capacity in bytes of a `Varchar` field on disk.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Int32,
    Varchar,
}

impl DataType {
    /// Number of bytes a field of this type occupies on a page.
    pub fn width(&self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int32 => 4,
            DataType::Varchar => 4 + STRING_LEN,
        }
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    String(String),
}

impl Value {
    /// Check if this value is compatible with the given data type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true, // NULL is compatible with any type
            (Value::Boolean(_), DataType::Boolean) => true,
            (Value::Int32(_), DataType::Int32) => true,
            (Value::String(_), DataType::Varchar) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int32(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// Raised when stored bytes cannot be read back under a schema.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct DecodeError(pub String);

/// Size of the per-tuple NULL bitmap for `columns` columns.
pub fn null_bitmap_size(columns: usize) -> usize {
    columns.div_ceil(8)
}

/// Encoded width of one tuple: NULL bitmap followed by fixed-width fields.
pub fn tuple_width(types: &[DataType]) -> usize {
    null_bitmap_size(types.len()) + types.iter().map(DataType::width).sum::<usize>()
}

/// Serialize values into a fixed-width record.
///
/// NULL fields still occupy their full width (zero filled) so every record
/// of a schema has the same size.
pub fn serialize_values(values: &[Value], types: &[DataType]) -> StorageResult<Vec<u8>> {
    if values.len() != types.len() {
        return Err(StorageError::SchemaMismatch(format!(
            "Value count {} doesn't match schema length {}",
            values.len(),
            types.len()
        )));
    }

    let bitmap_size = null_bitmap_size(types.len());
    let mut data = vec![0u8; tuple_width(types)];
    let mut offset = bitmap_size;

    for (i, (value, data_type)) in values.iter().zip(types.iter()).enumerate() {
        if !value.is_compatible_with(*data_type) {
            return Err(StorageError::SchemaMismatch(format!(
                "Value {:?} is not compatible with type {:?}",
                value, data_type
            )));
        }

        if matches!(value, Value::Null) {
            data[i / 8] |= 1 << (i % 8);
        }

        let field = &mut data[offset..offset + data_type.width()];
        match value {
            Value::Null => {}
            Value::Boolean(b) => field[0] = u8::from(*b),
            Value::Int32(v) => LittleEndian::write_i32(field, *v),
            Value::String(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > STRING_LEN {
                    return Err(StorageError::SchemaMismatch(format!(
                        "String of {} bytes exceeds capacity {}",
                        bytes.len(),
                        STRING_LEN
                    )));
                }
                LittleEndian::write_u32(&mut field[..4], bytes.len() as u32);
                field[4..4 + bytes.len()].copy_from_slice(bytes);
            }
        }
        offset += data_type.width();
    }

    Ok(data)
}

/// Deserialize a fixed-width record produced by [`serialize_values`].
pub fn deserialize_values(data: &[u8], types: &[DataType]) -> Result<Vec<Value>, DecodeError> {
    if data.len() < tuple_width(types) {
        return Err(DecodeError(format!(
            "Record of {} bytes is shorter than tuple width {}",
            data.len(),
            tuple_width(types)
        )));
    }

    let bitmap_size = null_bitmap_size(types.len());
    let null_bitmap = &data[..bitmap_size];
    let mut offset = bitmap_size;
    let mut values = Vec::with_capacity(types.len());

    for (i, data_type) in types.iter().enumerate() {
        let field = &data[offset..offset + data_type.width()];
        offset += data_type.width();

        if null_bitmap[i / 8] & (1 << (i % 8)) != 0 {
            values.push(Value::Null);
            continue;
        }

        let value = match data_type {
            DataType::Boolean => match field[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => {
                    return Err(DecodeError(format!(
                        "Invalid boolean byte {:#04x} in column {}",
                        other, i
                    )))
                }
            },
            DataType::Int32 => Value::Int32(LittleEndian::read_i32(field)),
            DataType::Varchar => {
                let len = LittleEndian::read_u32(&field[..4]) as usize;
                if len > STRING_LEN {
                    return Err(DecodeError(format!(
                        "String length {} exceeds capacity {} in column {}",
                        len, STRING_LEN, i
                    )));
                }
                let s = std::str::from_utf8(&field[4..4 + len]).map_err(|e| {
                    DecodeError(format!("Invalid UTF-8 in column {}: {}", i, e))
                })?;
                Value::String(s.to_string())
            }
        };
        values.push(value);
    }

    Ok(values)
}
