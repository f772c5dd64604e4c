//! # End-to-End Storage Scenarios
//!
//! Full-stack exercises of the storage engine through the `Database` API:
//! create tables, insert through trees, scan with cursors, survive
//! close/reopen cycles, and recycle pages across table drops. Each module
//! is one scenario.

use learndb::records::{deserialize_record, serialize_record};
use learndb::{Column, DataType, Database, Schema, StorageError, Value};
use tempfile::tempdir;

fn fruits_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer).primary_key(),
        Column::new("name", DataType::Text).not_null(),
        Column::new("avg_weight", DataType::Real),
    ])
    .unwrap()
}

fn fruit_record(schema: &Schema, id: i32, name: &str, avg_weight: f32) -> Vec<u8> {
    serialize_record(
        schema,
        &[
            Value::Integer(id),
            Value::Text(name.to_string()),
            Value::Real(avg_weight),
        ],
    )
    .unwrap()
}

/// Keys currently in the table, in cursor order.
fn scan_keys(db: &mut Database, table: &str) -> Vec<i32> {
    let mut tree = db.table_tree(table).unwrap();
    let mut cursor = tree.cursor_start().unwrap();
    let mut keys = Vec::new();
    while let Some((key, _)) = cursor.value().unwrap() {
        keys.push(key);
        cursor.advance().unwrap();
    }
    keys
}

mod single_row_round_trip {
    use super::*;

    #[test]
    fn insert_then_find_returns_all_three_values() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let schema = fruits_schema();
        let root = db
            .create_table(
                "fruits",
                schema.clone(),
                "create table fruits (id integer primary key, name text, avg_weight real)",
            )
            .unwrap();

        let record = fruit_record(&schema, 1, "apple", 4.2);
        db.tree(root).unwrap().insert(1, &record).unwrap();

        let found = db.tree(root).unwrap().find(1).unwrap().unwrap();
        let values = deserialize_record(&schema, &found).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(1),
                Value::Text("apple".into()),
                Value::Real(4.2),
            ]
        );
    }
}

mod split_workload {
    use super::*;

    #[test]
    fn two_hundred_in_order_inserts_build_a_two_level_tree() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let schema = fruits_schema();
        db.create_table("fruits", schema.clone(), "").unwrap();

        // ~64-byte records, page size 4096: several leaf splits.
        for id in 1..=200 {
            let record = fruit_record(&schema, id, &format!("fruit-{:040}", id), id as f32);
            db.table_tree("fruits").unwrap().insert(id, &record).unwrap();
        }

        db.validate_table("fruits").unwrap();
        assert!(db.table_tree("fruits").unwrap().height().unwrap() >= 2);
        assert_eq!(scan_keys(&mut db, "fruits"), (1..=200).collect::<Vec<_>>());
    }
}

mod delete_and_reinsert {
    use super::*;

    #[test]
    fn deleted_keys_vanish_and_reinserts_carry_new_records() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let schema = fruits_schema();
        let root = db.create_table("fruits", schema.clone(), "").unwrap();

        for id in 1..=100 {
            let record = fruit_record(&schema, id, &format!("old-{}", id), 1.0);
            db.tree(root).unwrap().insert(id, &record).unwrap();
        }

        let victims = [50, 25, 75, 10, 90];
        for &id in &victims {
            db.tree(root).unwrap().delete(id).unwrap();
        }
        for &id in &victims {
            assert!(db.tree(root).unwrap().find(id).unwrap().is_none());
        }
        db.validate_table("fruits").unwrap();

        for &id in &victims {
            let record = fruit_record(&schema, id, &format!("new-{}", id), 2.0);
            db.tree(root).unwrap().insert(id, &record).unwrap();
        }

        assert_eq!(scan_keys(&mut db, "fruits"), (1..=100).collect::<Vec<_>>());
        for &id in &victims {
            let found = db.tree(root).unwrap().find(id).unwrap().unwrap();
            let values = deserialize_record(&schema, &found).unwrap();
            assert_eq!(values[1], Value::Text(format!("new-{}", id)));
        }
        db.validate_table("fruits").unwrap();
    }

    #[test]
    fn duplicate_insert_surfaces_the_typed_error() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let schema = fruits_schema();
        let root = db.create_table("fruits", schema.clone(), "").unwrap();
        let record = fruit_record(&schema, 1, "apple", 4.2);
        db.tree(root).unwrap().insert(1, &record).unwrap();

        let err = db.tree(root).unwrap().insert(1, &record).unwrap_err();

        assert_eq!(
            err.downcast_ref::<StorageError>(),
            Some(&StorageError::DuplicateKey)
        );
    }
}

mod persistence {
    use super::*;

    #[test]
    fn data_survives_two_close_reopen_cycles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let schema = fruits_schema();

        let mut db = Database::open(&path).unwrap();
        db.create_table("fruits", schema.clone(), "").unwrap();
        for id in 1..=50 {
            let record = fruit_record(&schema, id, &format!("f{}", id), 0.5);
            db.table_tree("fruits").unwrap().insert(id, &record).unwrap();
        }
        db.close().unwrap();

        let mut db = Database::open(&path).unwrap();
        assert_eq!(scan_keys(&mut db, "fruits"), (1..=50).collect::<Vec<_>>());
        for id in 51..=100 {
            let record = fruit_record(&schema, id, &format!("f{}", id), 0.5);
            db.table_tree("fruits").unwrap().insert(id, &record).unwrap();
        }
        db.close().unwrap();

        let mut db = Database::open(&path).unwrap();
        assert_eq!(scan_keys(&mut db, "fruits"), (1..=100).collect::<Vec<_>>());
        db.validate_table("fruits").unwrap();
    }

    #[test]
    fn lock_blocks_a_second_database_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let _db = Database::open(&path).unwrap();

        assert!(Database::open(&path).is_err());
    }
}

mod free_page_recycling {
    use super::*;

    #[test]
    fn dropping_a_table_lets_its_successor_reuse_the_pages() {
        let dir = tempdir().unwrap();
        let mut db = Database::open(dir.path().join("test.db")).unwrap();
        let schema = fruits_schema();

        let root = db.create_table("t", schema.clone(), "").unwrap();
        for id in 1..=500 {
            let record = fruit_record(&schema, id, &format!("row-{:032}", id), 1.0);
            db.tree(root).unwrap().insert(id, &record).unwrap();
        }
        let pages_after_t = db.num_pages();

        db.drop_table("t").unwrap();

        let root2 = db.create_table("t2", schema.clone(), "").unwrap();
        for id in 1..=500 {
            let record = fruit_record(&schema, id, &format!("row-{:032}", id), 1.0);
            db.tree(root2).unwrap().insert(id, &record).unwrap();
        }

        assert!(
            db.num_pages() <= pages_after_t + 1,
            "file grew from {} to {} pages despite the free list",
            pages_after_t,
            db.num_pages()
        );
        db.validate_table("t2").unwrap();
    }

    #[test]
    fn trailing_free_pages_shrink_the_file_on_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let schema = fruits_schema();

        let mut db = Database::open(&path).unwrap();
        let root = db.create_table("t", schema.clone(), "").unwrap();
        for id in 1..=500 {
            let record = fruit_record(&schema, id, &format!("row-{:032}", id), 1.0);
            db.tree(root).unwrap().insert(id, &record).unwrap();
        }
        db.drop_table("t").unwrap();
        db.close().unwrap();

        // Only the header, the catalog root, and any interior free pages
        // remain; the tail was truncated.
        let db = Database::open(&path).unwrap();
        assert!(db.num_pages() <= 3);
    }
}
