//! # Cursor
//!
//! A cursor is a stateful position inside one tree: `(page_num,
//! cell_num, end_of_table)`. `advance` walks cells left to right and
//! follows `next_leaf` across page boundaries; a zero link means the scan
//! is done.
//!
//! A cursor holds a mutable borrow of its tree for its whole lifetime, so
//! the borrow checker rejects any mutation of the tree while a cursor is
//! live. That is the "cursors are invalidated by writes" contract from the
//! storage API enforced at compile time rather than by a runtime
//! generation counter.

use eyre::Result;

use crate::records::{cell_key, cell_value};
use crate::storage::NULL_PAGE;

use super::internal::InternalNode;
use super::leaf::{LeafNode, SearchResult};
use super::node::NodeType;
use super::tree::Tree;

pub struct Cursor<'t, 'p> {
    tree: &'t mut Tree<'p>,
    page_num: u32,
    cell_num: usize,
    end_of_table: bool,
}

impl<'p> Tree<'p> {
    /// A cursor on the smallest key in the tree.
    pub fn cursor_start(&mut self) -> Result<Cursor<'_, 'p>> {
        let mut current = self.root_page();
        while self.node_type(current)? == NodeType::Internal {
            let node = InternalNode::from_page(self.pager().page(current)?)?;
            current = if node.num_keys() > 0 {
                node.child_at(0)?
            } else {
                node.right_child()
            };
        }

        let empty = {
            let leaf = LeafNode::from_page(self.pager().page(current)?)?;
            leaf.num_cells() == 0
        };
        Ok(Cursor {
            page_num: current,
            cell_num: 0,
            end_of_table: empty,
            tree: self,
        })
    }

    /// A cursor on `key`, or on the smallest key greater than it.
    pub fn cursor_at(&mut self, key: i32) -> Result<Cursor<'_, 'p>> {
        let (page_num, result) = self.seek(key)?;
        let cell_num = match result {
            SearchResult::Found(idx) => idx,
            SearchResult::NotFound(idx) => idx,
        };

        let mut cursor = Cursor {
            page_num,
            cell_num,
            end_of_table: false,
            tree: self,
        };
        cursor.skip_past_leaf_end()?;
        Ok(cursor)
    }
}

impl<'t, 'p> Cursor<'t, 'p> {
    pub fn end_of_table(&self) -> bool {
        self.end_of_table
    }

    /// The `(key, record)` pair under the cursor, or `None` at the end.
    pub fn value(&mut self) -> Result<Option<(i32, Vec<u8>)>> {
        if self.end_of_table {
            return Ok(None);
        }
        let leaf = LeafNode::from_page(self.tree.pager().page(self.page_num)?)?;
        let cell = leaf.cell_at(self.cell_num)?;
        Ok(Some((cell_key(cell)?, cell_value(cell)?.to_vec())))
    }

    /// Moves to the next cell in key order, following the sibling chain.
    pub fn advance(&mut self) -> Result<()> {
        if self.end_of_table {
            return Ok(());
        }
        self.cell_num += 1;
        self.skip_past_leaf_end()
    }

    /// If positioned past the last cell of the current leaf, steps to the
    /// next leaf or marks the end of the table.
    fn skip_past_leaf_end(&mut self) -> Result<()> {
        loop {
            let (num_cells, next_leaf) = {
                let leaf = LeafNode::from_page(self.tree.pager().page(self.page_num)?)?;
                (leaf.num_cells(), leaf.next_leaf())
            };
            if self.cell_num < num_cells {
                return Ok(());
            }
            if next_leaf == NULL_PAGE {
                self.end_of_table = true;
                return Ok(());
            }
            self.page_num = next_leaf;
            self.cell_num = 0;
        }
    }
}
