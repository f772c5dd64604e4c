//! # learndb - Single-File Embedded Relational Storage
//!
//! The storage core of a single-file relational database: a paged B+tree
//! over variable-length records, the pager that mediates between the tree
//! and the file, the record serialization format, and free-space
//! management at both the cell and the page level.
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------+
//! |       Database (catalog, DDL)       |
//! +-------------------------------------+
//! |   B+tree (find/insert/delete/scan)  |
//! +-------------------------------------+
//! |   Record serde (serial types)       |
//! +-------------------------------------+
//! |   Pager (cache, allocation,         |
//! |   free-page list)                   |
//! +-------------------------------------+
//! |   DbFile (locked block I/O)         |
//! +-------------------------------------+
//! ```
//!
//! One file is one database. Page 0 is the file header, page 1 the
//! catalog's root; every table is a tree of pages keyed by a 4-byte
//! integer primary key, storing serialized records as values.
//!
//! ## Quick Start
//!
//! ```ignore
//! use learndb::{Column, Database, DataType, Schema, Value};
//! use learndb::records::{serialize_record, deserialize_record};
//!
//! let mut db = Database::open("./app.db")?;
//! let schema = Schema::new(vec![
//!     Column::new("id", DataType::Integer).primary_key(),
//!     Column::new("name", DataType::Text),
//! ])?;
//! let root = db.create_table("users", schema.clone(), "create table users (...)")?;
//!
//! let record = serialize_record(&schema, &[Value::Integer(1), Value::Text("ada".into())])?;
//! db.tree(root)?.insert(1, &record)?;
//!
//! db.close()?;
//! ```
//!
//! ## What This Crate Is Not
//!
//! There is no SQL surface, no query planner, no transactions, and no
//! multi-writer concurrency: exactly one process (enforced by an OS file
//! lock) runs exactly one operation at a time. Records larger than a
//! usable page are rejected rather than spilled to overflow pages.
//! Durability is flush-on-close; a crash mid-operation may leave the file
//! inconsistent.
//!
//! ## Module Overview
//!
//! - [`storage`]: file wrapper, file header, pager
//! - [`btree`]: tree, node page layouts, cursor
//! - [`records`]: record serde, schemas, datatypes
//! - [`catalog`]: the table-of-tables at page 1
//! - [`database`]: open/close lifecycle and DDL
//! - [`errors`]: the typed error kinds of the storage API

pub mod btree;
pub mod catalog;
pub mod database;
pub mod errors;
pub mod records;
pub mod storage;

pub use btree::{Cursor, SearchResult, Tree};
pub use database::{Database, TableInfo};
pub use errors::StorageError;
pub use records::{Column, DataType, Schema, Value};
pub use storage::{Pager, CATALOG_ROOT_PAGE, PAGE_SIZE};
