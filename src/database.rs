//! # Database
//!
//! The top-level handle an executor talks to. A `Database` owns the pager
//! (and with it the file lock) plus an in-memory mirror of the catalog,
//! and hands out `Tree` handles for individual tables.
//!
//! ```text
//! Database::open(path)
//!     │
//!     ├── Pager::open          file lock, header, free list
//!     ├── catalog tree @ page 1
//!     └── tables: name -> TableInfo (pkey, root page, schema)
//!
//! db.create_table(...)  ->  root page for a new tree
//! db.tree(root)         ->  insert / find / delete / cursors
//! db.close()            ->  flush, truncate, unlock
//! ```
//!
//! Dropping a table walks its tree and returns every page to the pager,
//! which is what lets a later `create_table` reuse the space instead of
//! growing the file.

use eyre::{bail, Result};
use hashbrown::HashMap;
use tracing::debug;

use crate::btree::{LeafNodeMut, Tree};
use crate::catalog::{self, CatalogRow};
use crate::records::Schema;
use crate::storage::{Pager, CATALOG_ROOT_PAGE, NULL_PAGE};

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub pkey: i32,
    pub root_page: u32,
    pub schema: Schema,
    pub sql_text: String,
}

pub struct Database {
    pager: Pager,
    tables: HashMap<String, TableInfo>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and loads the
    /// catalog.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let mut pager = Pager::open(path)?;

        let mut tables = HashMap::new();
        {
            let mut catalog_tree = Tree::new(&mut pager, CATALOG_ROOT_PAGE)?;
            for row in catalog::scan(&mut catalog_tree)? {
                tables.insert(
                    row.name.clone(),
                    TableInfo {
                        pkey: row.pkey,
                        root_page: row.root_page,
                        schema: row.schema,
                        sql_text: row.sql_text,
                    },
                );
            }
        }
        debug!(tables = tables.len(), "catalog loaded");

        Ok(Self { pager, tables })
    }

    /// Flushes all state and releases the file lock.
    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    /// Registers a new table: allocates and initializes its root page and
    /// inserts the catalog row. Returns the root page number.
    pub fn create_table(&mut self, name: &str, schema: Schema, sql_text: &str) -> Result<u32> {
        if self.tables.contains_key(name) {
            bail!("table '{}' already exists", name);
        }

        let root_page = self.pager.allocate_page()?;
        {
            let page = self.pager.page_mut(root_page)?;
            LeafNodeMut::init(page, true, NULL_PAGE)?;
        }

        let pkey = self.tables.values().map(|t| t.pkey).max().unwrap_or(0) + 1;
        let row = CatalogRow {
            pkey,
            name: name.to_string(),
            root_page,
            sql_text: sql_text.to_string(),
            schema: schema.clone(),
        };
        let record = catalog::encode_row(&row)?;
        {
            let mut catalog_tree = Tree::new(&mut self.pager, CATALOG_ROOT_PAGE)?;
            catalog_tree.insert(pkey, &record)?;
        }

        debug!(table = name, root = root_page, "table created");
        self.tables.insert(
            name.to_string(),
            TableInfo {
                pkey,
                root_page,
                schema,
                sql_text: sql_text.to_string(),
            },
        );
        Ok(root_page)
    }

    /// Unregisters `name`, returning every page of its tree to the pager.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let (pkey, root_page) = match self.tables.get(name) {
            Some(info) => (info.pkey, info.root_page),
            None => bail!("no such table '{}'", name),
        };

        let pages = {
            let mut tree = Tree::new(&mut self.pager, root_page)?;
            tree.pages()?
        };
        for page_num in &pages {
            self.pager.return_page(*page_num);
        }

        {
            let mut catalog_tree = Tree::new(&mut self.pager, CATALOG_ROOT_PAGE)?;
            catalog_tree.delete(pkey)?;
        }

        debug!(table = name, pages = pages.len(), "table dropped");
        self.tables.remove(name);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Registered table names, sorted for stable output.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A tree handle on an arbitrary root page (the catalog included).
    pub fn tree(&mut self, root_page: u32) -> Result<Tree<'_>> {
        Tree::new(&mut self.pager, root_page)
    }

    /// A tree handle on a table by name.
    pub fn table_tree(&mut self, name: &str) -> Result<Tree<'_>> {
        let root_page = match self.tables.get(name) {
            Some(info) => info.root_page,
            None => bail!("no such table '{}'", name),
        };
        self.tree(root_page)
    }

    /// Runs the full invariant walk over one table's tree.
    pub fn validate_table(&mut self, name: &str) -> Result<()> {
        self.table_tree(name)?.validate()
    }

    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages()
    }

    /// Pages currently reusable (session returns plus the on-disk free
    /// list). Exposed for page-accounting checks.
    pub fn free_pages(&mut self) -> Result<Vec<u32>> {
        self.pager.free_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Column, DataType};
    use tempfile::tempdir;

    fn fruits_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("name", DataType::Text),
        ])
        .unwrap()
    }

    #[test]
    fn create_table_registers_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut db = Database::open(&path).unwrap();
        let root = db
            .create_table("fruits", fruits_schema(), "create table fruits (...)")
            .unwrap();
        assert!(root > CATALOG_ROOT_PAGE);
        db.close().unwrap();

        let db = Database::open(&path).unwrap();
        let info = db.table("fruits").unwrap();
        assert_eq!(info.root_page, root);
        assert_eq!(info.schema, fruits_schema());
        assert_eq!(db.table_names(), vec!["fruits"]);
    }

    #[test]
    fn duplicate_table_name_rejected() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        db.create_table("t", fruits_schema(), "").unwrap();

        let result = db.create_table("t", fruits_schema(), "");

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[test]
    fn drop_table_unregisters_and_recycles() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let root = db.create_table("t", fruits_schema(), "").unwrap();
        {
            let mut tree = db.tree(root).unwrap();
            for key in 1..=50 {
                tree.insert(key, &vec![0u8; 64]).unwrap();
            }
        }

        db.drop_table("t").unwrap();

        assert!(db.table("t").is_none());
        assert!(db.free_pages().unwrap().contains(&root));
        assert!(db.drop_table("t").is_err());
    }

    #[test]
    fn multiple_tables_keep_distinct_pkeys() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();

        db.create_table("a", fruits_schema(), "").unwrap();
        db.create_table("b", fruits_schema(), "").unwrap();
        db.create_table("c", fruits_schema(), "").unwrap();

        let pkeys: Vec<i32> = ["a", "b", "c"]
            .iter()
            .map(|n| db.table(n).unwrap().pkey)
            .collect();
        assert_eq!(pkeys, vec![1, 2, 3]);
    }

    #[test]
    fn validate_table_walks_the_tree() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let root = db.create_table("t", fruits_schema(), "").unwrap();
        {
            let mut tree = db.tree(root).unwrap();
            for key in 1..=200 {
                tree.insert(key, &vec![0u8; 64]).unwrap();
            }
        }

        db.validate_table("t").unwrap();
    }
}
