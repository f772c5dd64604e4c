//! # Record Serialization
//!
//! Records are the values stored against keys in leaf cells. Encoding and
//! decoding are pure functions of a schema and never touch pages.
//!
//! ## Record Binary Layout
//!
//! ```text
//! +------------------+---------------------------+------------------+
//! | header_size (u32)| serial_type[0..C] (u32 ea)| body             |
//! +------------------+---------------------------+------------------+
//! ```
//!
//! `header_size` counts itself plus the serial-type array. One serial type
//! per column, in schema definition order:
//!
//! | code | size | datatype |
//! |-------|----------|-----------------------------|
//! | 0 | 0 | NULL (no body bytes) |
//! | 1 | 4 | INTEGER, signed little-endian |
//! | 2 | 4 | REAL, f32 little-endian |
//! | 3 | 1 | BOOL |
//! | 4 + n | n | TEXT or BLOB of n bytes |
//!
//! Codes 4 and up carry the payload length in the code itself, so the body
//! needs no per-column framing; the schema's declared type decides whether
//! the payload decodes as UTF-8 text or raw bytes.
//!
//! ## Cell Layout
//!
//! A cell is what actually sits in a leaf page:
//!
//! ```text
//! +-----------+------------------+------------------+
//! | key (i32) | value_size (u32) | record bytes     |
//! +-----------+------------------+------------------+
//! ```
//!
//! `cell_key` and `cell_size` read only the 8-byte cell header, so the
//! tree can search and account space without decoding records.
//!
//! Records larger than `MAX_RECORD_SIZE` are rejected at encode time;
//! the bound guarantees at least two cells fit on every leaf, which the
//! split algorithm relies on. There are no overflow pages.

pub mod schema;
pub mod types;

pub use schema::{Column, Schema};
pub use types::{DataType, Value};

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::btree::MAX_CELL_SIZE;
use crate::errors::StorageError;

/// Cell overhead in front of the record: 4-byte key + 4-byte value size.
pub const CELL_HEADER_SIZE: usize = 8;

/// Largest record `serialize_record` will produce.
pub const MAX_RECORD_SIZE: usize = MAX_CELL_SIZE - CELL_HEADER_SIZE;

const SERIAL_NULL: u32 = 0;
const SERIAL_INTEGER: u32 = 1;
const SERIAL_REAL: u32 = 2;
const SERIAL_BOOL: u32 = 3;
const SERIAL_VAR_BASE: u32 = 4;

/// Encodes `values` under `schema` into record bytes.
pub fn serialize_record(schema: &Schema, values: &[Value]) -> Result<Vec<u8>> {
    ensure!(
        values.len() == schema.column_count(),
        StorageError::SchemaMismatch(format!(
            "expected {} values, got {}",
            schema.column_count(),
            values.len()
        ))
    );

    let mut serial_types: SmallVec<[u32; 8]> = SmallVec::new();
    let mut body: Vec<u8> = Vec::new();

    for (col, value) in schema.columns().iter().zip(values) {
        match value {
            Value::Null => {
                if col.not_null {
                    bail!(StorageError::SchemaMismatch(format!(
                        "column '{}' is NOT NULL but value is null",
                        col.name
                    )));
                }
                serial_types.push(SERIAL_NULL);
            }
            Value::Integer(i) if col.datatype == DataType::Integer => {
                serial_types.push(SERIAL_INTEGER);
                body.extend_from_slice(&i.to_le_bytes());
            }
            Value::Real(f) if col.datatype == DataType::Real => {
                serial_types.push(SERIAL_REAL);
                body.extend_from_slice(&f.to_le_bytes());
            }
            Value::Bool(b) if col.datatype == DataType::Bool => {
                serial_types.push(SERIAL_BOOL);
                body.push(*b as u8);
            }
            Value::Text(s) if col.datatype == DataType::Text => {
                serial_types.push(SERIAL_VAR_BASE + s.len() as u32);
                body.extend_from_slice(s.as_bytes());
            }
            Value::Blob(b) if col.datatype == DataType::Blob => {
                serial_types.push(SERIAL_VAR_BASE + b.len() as u32);
                body.extend_from_slice(b);
            }
            other => bail!(StorageError::SchemaMismatch(format!(
                "column '{}' is {:?} but value is {:?}",
                col.name, col.datatype, other
            ))),
        }
    }

    let header_size = 4 * (1 + serial_types.len());
    let mut record = Vec::with_capacity(header_size + body.len());
    record.extend_from_slice(&(header_size as u32).to_le_bytes());
    for code in &serial_types {
        record.extend_from_slice(&code.to_le_bytes());
    }
    record.extend_from_slice(&body);

    if record.len() > MAX_RECORD_SIZE {
        bail!(StorageError::TooLarge {
            size: record.len(),
            max: MAX_RECORD_SIZE,
        });
    }
    Ok(record)
}

/// Decodes record bytes back into values under `schema`.
pub fn deserialize_record(schema: &Schema, record: &[u8]) -> Result<Vec<Value>> {
    let mismatch = |msg: String| StorageError::SchemaMismatch(msg);

    ensure!(
        record.len() >= 4,
        mismatch("record shorter than its header size field".into())
    );
    let header_size = u32::from_le_bytes(record[0..4].try_into().expect("4-byte slice")) as usize;
    ensure!(
        header_size >= 4 && header_size <= record.len() && (header_size - 4) % 4 == 0,
        mismatch(format!("bad record header size {}", header_size))
    );

    let column_count = (header_size - 4) / 4;
    ensure!(
        column_count == schema.column_count(),
        mismatch(format!(
            "record has {} columns, schema has {}",
            column_count,
            schema.column_count()
        ))
    );

    let body = &record[header_size..];
    let mut pos = 0usize;
    let mut values = Vec::with_capacity(column_count);

    for (idx, col) in schema.columns().iter().enumerate() {
        let code_offset = 4 + idx * 4;
        let code = u32::from_le_bytes(
            record[code_offset..code_offset + 4]
                .try_into()
                .expect("4-byte slice"),
        );

        let value = match code {
            SERIAL_NULL => {
                ensure!(
                    !col.not_null,
                    mismatch(format!("null stored in NOT NULL column '{}'", col.name))
                );
                Value::Null
            }
            SERIAL_INTEGER => {
                ensure!(
                    col.datatype == DataType::Integer,
                    mismatch(format!("INTEGER stored in {:?} column '{}'", col.datatype, col.name))
                );
                ensure!(pos + 4 <= body.len(), mismatch("record body truncated".into()));
                let v = i32::from_le_bytes(body[pos..pos + 4].try_into().expect("4-byte slice"));
                pos += 4;
                Value::Integer(v)
            }
            SERIAL_REAL => {
                ensure!(
                    col.datatype == DataType::Real,
                    mismatch(format!("REAL stored in {:?} column '{}'", col.datatype, col.name))
                );
                ensure!(pos + 4 <= body.len(), mismatch("record body truncated".into()));
                let v = f32::from_le_bytes(body[pos..pos + 4].try_into().expect("4-byte slice"));
                pos += 4;
                Value::Real(v)
            }
            SERIAL_BOOL => {
                ensure!(
                    col.datatype == DataType::Bool,
                    mismatch(format!("BOOL stored in {:?} column '{}'", col.datatype, col.name))
                );
                ensure!(pos < body.len(), mismatch("record body truncated".into()));
                let b = body[pos];
                ensure!(
                    b <= 1,
                    mismatch(format!("bad BOOL byte {:#04x} in column '{}'", b, col.name))
                );
                pos += 1;
                Value::Bool(b == 1)
            }
            _ => {
                let len = (code - SERIAL_VAR_BASE) as usize;
                ensure!(pos + len <= body.len(), mismatch("record body truncated".into()));
                let payload = &body[pos..pos + len];
                pos += len;
                match col.datatype {
                    DataType::Text => {
                        let s = std::str::from_utf8(payload).map_err(|_| {
                            mismatch(format!("column '{}' holds non-UTF-8 text", col.name))
                        })?;
                        Value::Text(s.to_string())
                    }
                    DataType::Blob => Value::Blob(payload.to_vec()),
                    other => bail!(mismatch(format!(
                        "variable-length payload stored in {:?} column '{}'",
                        other, col.name
                    ))),
                }
            }
        };
        values.push(value);
    }

    ensure!(
        pos == body.len(),
        mismatch(format!("{} trailing bytes after record body", body.len() - pos))
    );
    Ok(values)
}

/// Assembles a leaf cell from a key and serialized record bytes.
pub fn make_cell(key: i32, record: &[u8]) -> Vec<u8> {
    let mut cell = Vec::with_capacity(CELL_HEADER_SIZE + record.len());
    cell.extend_from_slice(&key.to_le_bytes());
    cell.extend_from_slice(&(record.len() as u32).to_le_bytes());
    cell.extend_from_slice(record);
    cell
}

/// Reads a cell's key without touching the record.
pub fn cell_key(cell: &[u8]) -> Result<i32> {
    ensure!(
        cell.len() >= CELL_HEADER_SIZE,
        StorageError::CorruptPage(format!("cell truncated at {} bytes", cell.len()))
    );
    Ok(i32::from_le_bytes(cell[0..4].try_into().expect("4-byte slice")))
}

/// Total cell size (header plus record), read from the cell header alone.
pub fn cell_size(cell: &[u8]) -> Result<usize> {
    ensure!(
        cell.len() >= CELL_HEADER_SIZE,
        StorageError::CorruptPage(format!("cell truncated at {} bytes", cell.len()))
    );
    let value_size = u32::from_le_bytes(cell[4..8].try_into().expect("4-byte slice")) as usize;
    Ok(CELL_HEADER_SIZE + value_size)
}

/// The record bytes of a cell.
pub fn cell_value(cell: &[u8]) -> Result<&[u8]> {
    let size = cell_size(cell)?;
    ensure!(
        cell.len() >= size,
        StorageError::CorruptPage(format!(
            "cell claims {} bytes but only {} are present",
            size,
            cell.len()
        ))
    );
    Ok(&cell[CELL_HEADER_SIZE..size])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fruits_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("name", DataType::Text).not_null(),
            Column::new("avg_weight", DataType::Real),
        ])
        .unwrap()
    }

    fn mixed_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("label", DataType::Text),
            Column::new("active", DataType::Bool),
            Column::new("payload", DataType::Blob),
        ])
        .unwrap()
    }

    #[test]
    fn record_round_trip() {
        let schema = fruits_schema();
        let values = vec![
            Value::Integer(1),
            Value::Text("apple".into()),
            Value::Real(4.2),
        ];

        let record = serialize_record(&schema, &values).unwrap();
        let decoded = deserialize_record(&schema, &record).unwrap();

        assert_eq!(decoded, values);
    }

    #[test]
    fn null_columns_occupy_no_body_bytes() {
        let schema = fruits_schema();
        let with_null = vec![Value::Integer(1), Value::Text("kiwi".into()), Value::Null];
        let with_real = vec![
            Value::Integer(1),
            Value::Text("kiwi".into()),
            Value::Real(0.1),
        ];

        let a = serialize_record(&schema, &with_null).unwrap();
        let b = serialize_record(&schema, &with_real).unwrap();

        assert_eq!(a.len() + 4, b.len());
        assert_eq!(deserialize_record(&schema, &a).unwrap()[2], Value::Null);
    }

    #[test]
    fn mixed_types_round_trip() {
        let schema = mixed_schema();
        let values = vec![
            Value::Integer(-42),
            Value::Text("héllo wörld".into()),
            Value::Bool(true),
            Value::Blob(vec![0, 1, 2, 255, 254]),
        ];

        let record = serialize_record(&schema, &values).unwrap();

        assert_eq!(deserialize_record(&schema, &record).unwrap(), values);
    }

    #[test]
    fn empty_text_round_trips() {
        let schema = fruits_schema();
        let values = vec![Value::Integer(9), Value::Text(String::new()), Value::Null];

        let record = serialize_record(&schema, &values).unwrap();

        assert_eq!(deserialize_record(&schema, &record).unwrap(), values);
    }

    #[test]
    fn arity_mismatch_rejected() {
        let schema = fruits_schema();

        let result = serialize_record(&schema, &[Value::Integer(1)]);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn type_mismatch_rejected() {
        let schema = fruits_schema();
        let values = vec![
            Value::Integer(1),
            Value::Real(1.0),
            Value::Text("nope".into()),
        ];

        let result = serialize_record(&schema, &values);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn null_in_not_null_column_rejected() {
        let schema = fruits_schema();
        let values = vec![Value::Integer(1), Value::Null, Value::Null];

        let result = serialize_record(&schema, &values);

        assert!(result.is_err());
    }

    #[test]
    fn oversized_record_is_too_large() {
        let schema = fruits_schema();
        let values = vec![
            Value::Integer(1),
            Value::Text("x".repeat(MAX_RECORD_SIZE)),
            Value::Null,
        ];

        let result = serialize_record(&schema, &values);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::TooLarge { .. })
        ));
    }

    #[test]
    fn truncated_record_rejected() {
        let schema = fruits_schema();
        let record = serialize_record(
            &schema,
            &[
                Value::Integer(1),
                Value::Text("apple".into()),
                Value::Real(4.2),
            ],
        )
        .unwrap();

        let result = deserialize_record(&schema, &record[..record.len() - 2]);

        assert!(result.is_err());
    }

    #[test]
    fn cell_helpers_read_header_only() {
        let record = vec![0xAA; 20];
        let cell = make_cell(-7, &record);

        assert_eq!(cell_key(&cell).unwrap(), -7);
        assert_eq!(cell_size(&cell).unwrap(), CELL_HEADER_SIZE + 20);
        assert_eq!(cell_value(&cell).unwrap(), &record[..]);
    }

    #[test]
    fn short_cell_is_corrupt() {
        let result = cell_key(&[1, 2, 3]);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::CorruptPage(_))
        ));
    }
}
