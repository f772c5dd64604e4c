//! # B+Tree Storage
//!
//! The ordered key -> record store at the center of the engine. One tree
//! per table (the catalog included), each identified by a fixed root page
//! number.
//!
//! ## Node Types
//!
//! - **Leaf nodes** hold the cells. A sorted cell-pointer array indexes
//!   variable-size cells allocated from the high end of the page, with an
//!   intra-page free list and in-place compaction managing the holes that
//!   deletes leave behind.
//!
//! - **Internal nodes** hold fixed-size `(child, key)` entries plus a
//!   right child. Keys are subtree maxima: everything under `child[i]` is
//!   `<= key[i]`, everything under the right child is greater than the
//!   last key.
//!
//! Leaves are linked left-to-right through `next_leaf`, which is what the
//! cursor walks.
//!
//! ## Module Organization
//!
//! - `node`: on-disk header structs and layout constants
//! - `leaf`: leaf page views (cell allocation, free list, compaction)
//! - `internal`: internal page views (entry splicing)
//! - `tree`: find / insert / delete / validate and structural changes
//! - `cursor`: ascending scans

mod cursor;
mod internal;
mod leaf;
mod node;
mod tree;

pub use cursor::Cursor;
pub use internal::{ChildPos, InternalNode, InternalNodeMut};
pub use leaf::{LeafNode, LeafNodeMut, SearchResult};
pub use node::{
    NodeType, CELL_POINTER_SIZE, COMPACTION_THRESHOLD, INTERNAL_MAX_CELLS, LEAF_CAPACITY,
    LEAF_CONTENT_START, MAX_CELL_SIZE, MIN_FREE_BLOCK,
};
pub use tree::Tree;
