//! # Schema Definition
//!
//! A schema is an ordered list of column definitions. Exactly one column
//! must be an `INTEGER PRIMARY KEY`; it becomes the tree key and is
//! implicitly NOT NULL.
//!
//! Schemas are persisted in the catalog as a compact length-prefixed
//! binary blob:
//!
//! ```text
//! column_count: u16
//! per column:
//!   name_len: u16
//!   name:     UTF-8 bytes
//!   datatype: u8 (DataType repr)
//!   flags:    u8 (bit 0 = primary key, bit 1 = not null)
//! ```

use eyre::{bail, ensure, Result};

use crate::errors::StorageError;

use super::types::DataType;

const FLAG_PRIMARY: u8 = 0b01;
const FLAG_NOT_NULL: u8 = 0b10;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub is_primary: bool,
    pub not_null: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            is_primary: false,
            not_null: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary = true;
        self.not_null = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Builds a schema, validating the single-INTEGER-primary-key rule.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        ensure!(
            !columns.is_empty(),
            StorageError::SchemaMismatch("schema has no columns".into())
        );

        let mut primary = None;
        for (idx, col) in columns.iter().enumerate() {
            ensure!(
                !col.name.is_empty(),
                StorageError::SchemaMismatch(format!("column {} has an empty name", idx))
            );
            if columns[..idx].iter().any(|c| c.name == col.name) {
                bail!(StorageError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
            if col.is_primary {
                if col.datatype != DataType::Integer {
                    bail!(StorageError::SchemaMismatch(format!(
                        "primary key column '{}' must be INTEGER",
                        col.name
                    )));
                }
                if primary.replace(idx).is_some() {
                    bail!(StorageError::SchemaMismatch(
                        "more than one primary key column".into()
                    ));
                }
            }
        }
        ensure!(
            primary.is_some(),
            StorageError::SchemaMismatch("schema needs an INTEGER PRIMARY KEY column".into())
        );

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c.is_primary)
            .expect("validated schema has a primary key")
    }

    /// Encodes the schema into its catalog blob form.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for col in &self.columns {
            buf.extend_from_slice(&(col.name.len() as u16).to_le_bytes());
            buf.extend_from_slice(col.name.as_bytes());
            buf.push(col.datatype as u8);
            let mut flags = 0u8;
            if col.is_primary {
                flags |= FLAG_PRIMARY;
            }
            if col.not_null {
                flags |= FLAG_NOT_NULL;
            }
            buf.push(flags);
        }
        buf
    }

    /// Decodes a catalog blob back into a schema.
    pub fn from_blob(blob: &[u8]) -> Result<Self> {
        let mismatch = |msg: &str| StorageError::SchemaMismatch(format!("schema blob: {}", msg));

        ensure!(blob.len() >= 2, mismatch("shorter than its column count"));
        let count = u16::from_le_bytes(blob[0..2].try_into().expect("2-byte slice")) as usize;
        let mut pos = 2;
        let mut columns = Vec::with_capacity(count);

        for _ in 0..count {
            ensure!(pos + 2 <= blob.len(), mismatch("truncated column name length"));
            let name_len =
                u16::from_le_bytes(blob[pos..pos + 2].try_into().expect("2-byte slice")) as usize;
            pos += 2;

            ensure!(pos + name_len + 2 <= blob.len(), mismatch("truncated column"));
            let name = std::str::from_utf8(&blob[pos..pos + name_len])
                .map_err(|_| mismatch("column name is not UTF-8"))?
                .to_string();
            pos += name_len;

            let datatype = DataType::from_byte(blob[pos])
                .ok_or_else(|| mismatch(&format!("unknown datatype byte {:#04x}", blob[pos])))?;
            let flags = blob[pos + 1];
            pos += 2;

            columns.push(Column {
                name,
                datatype,
                is_primary: flags & FLAG_PRIMARY != 0,
                not_null: flags & FLAG_NOT_NULL != 0,
            });
        }
        ensure!(pos == blob.len(), mismatch("trailing bytes"));

        Schema::new(columns)
    }
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

    #[test]
    fn schema_requires_a_primary_key() {
        let result = Schema::new(vec![Column::new("name", DataType::Text)]);

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn schema_rejects_non_integer_primary_key() {
        let result = Schema::new(vec![Column::new("id", DataType::Text).primary_key()]);

        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_two_primary_keys() {
        let result = Schema::new(vec![
            Column::new("a", DataType::Integer).primary_key(),
            Column::new("b", DataType::Integer).primary_key(),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn schema_rejects_duplicate_column_names() {
        let result = Schema::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("id", DataType::Text),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn primary_key_index_finds_the_key_column() {
        let schema = fruits_schema();

        assert_eq!(schema.primary_key_index(), 0);
        assert_eq!(schema.column_index("avg_weight"), Some(2));
        assert_eq!(schema.column_index("missing"), None);
    }

    #[test]
    fn blob_round_trip_preserves_schema() {
        let schema = fruits_schema();

        let decoded = Schema::from_blob(&schema.to_blob()).unwrap();

        assert_eq!(decoded, schema);
    }

    #[test]
    fn truncated_blob_is_schema_mismatch() {
        let blob = fruits_schema().to_blob();

        let result = Schema::from_blob(&blob[..blob.len() - 3]);

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::SchemaMismatch(_))
        ));
    }
}
