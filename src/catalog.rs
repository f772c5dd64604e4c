//! # Catalog
//!
//! The catalog is itself a table: a tree rooted at the well-known page 1
//! with one row per user table. Its schema is fixed:
//!
//! ```text
//! (pkey INTEGER PRIMARY KEY, name TEXT, root_page INTEGER,
//!  sql_text TEXT, schema_blob BLOB)
//! ```
//!
//! `schema_blob` holds the table's schema in the compact binary form from
//! [`Schema::to_blob`]; `sql_text` keeps the original DDL for display.
//! Because the catalog is an ordinary tree over ordinary records, it needs
//! no storage machinery of its own.

use eyre::{ensure, Result};

use crate::btree::Tree;
use crate::errors::StorageError;
use crate::records::{
    deserialize_record, serialize_record, Column, DataType, Schema, Value,
};

/// The catalog table's own schema.
pub fn catalog_schema() -> Schema {
    Schema::new(vec![
        Column::new("pkey", DataType::Integer).primary_key(),
        Column::new("name", DataType::Text).not_null(),
        Column::new("root_page", DataType::Integer).not_null(),
        Column::new("sql_text", DataType::Text),
        Column::new("schema_blob", DataType::Blob).not_null(),
    ])
    .expect("catalog schema is statically valid")
}

/// One table registration.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub pkey: i32,
    pub name: String,
    pub root_page: u32,
    pub sql_text: String,
    pub schema: Schema,
}

pub fn encode_row(row: &CatalogRow) -> Result<Vec<u8>> {
    serialize_record(
        &catalog_schema(),
        &[
            Value::Integer(row.pkey),
            Value::Text(row.name.clone()),
            Value::Integer(row.root_page as i32),
            Value::Text(row.sql_text.clone()),
            Value::Blob(row.schema.to_blob()),
        ],
    )
}

pub fn decode_row(record: &[u8]) -> Result<CatalogRow> {
    let values = deserialize_record(&catalog_schema(), record)?;
    let mismatch = |what: &str| StorageError::SchemaMismatch(format!("catalog row: {}", what));

    let pkey = values[0]
        .as_integer()
        .ok_or_else(|| mismatch("pkey is not an integer"))?;
    let name = values[1]
        .as_text()
        .ok_or_else(|| mismatch("name is not text"))?
        .to_string();
    let root_page = values[2]
        .as_integer()
        .ok_or_else(|| mismatch("root_page is not an integer"))?;
    ensure!(root_page > 0, mismatch("root_page is not positive"));
    let sql_text = match &values[3] {
        Value::Text(s) => s.clone(),
        Value::Null => String::new(),
        _ => return Err(eyre::eyre!(mismatch("sql_text is not text"))),
    };
    let schema = Schema::from_blob(
        values[4]
            .as_blob()
            .ok_or_else(|| mismatch("schema_blob is not a blob"))?,
    )?;

    Ok(CatalogRow {
        pkey,
        name,
        root_page: root_page as u32,
        sql_text,
        schema,
    })
}

/// Reads every table registration in pkey order.
pub fn scan(tree: &mut Tree<'_>) -> Result<Vec<CatalogRow>> {
    let mut rows = Vec::new();
    let mut cursor = tree.cursor_start()?;
    while let Some((_, record)) = cursor.value()? {
        rows.push(decode_row(&record)?);
        cursor.advance()?;
    }
    Ok(rows)
}
