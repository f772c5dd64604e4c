//! # B+Tree
//!
//! Ordered key -> record storage over pages. All data lives in leaf cells;
//! internal nodes carry `(child, key)` entries where each key is the
//! maximum key of its child's subtree. Leaves are chained through
//! `next_leaf` for ascending scans.
//!
//! ## Structural Changes Are Out-of-Place
//!
//! A node that must split allocates *two* fresh pages, redistributes every
//! cell (plus the incoming one) between them, and returns the old page to
//! the pager. This costs an extra page write per split but keeps the
//! invariants easy to state: a node's cells are never half-moved, and a
//! failed split cannot leave a partially repacked page behind.
//!
//! The root page is the one exception: a tree is identified by its root
//! page number (the catalog stores it, the file header pins the catalog's
//! own root at page 1), so the root page never moves. When the root
//! splits, both halves go to fresh pages and the root page is rebuilt in
//! place as an internal node; when the tree collapses, the surviving child
//! is copied onto the root page.
//!
//! ## Parent Pointers
//!
//! Every non-root node stores its parent's page number. Splits and max-key
//! changes repair ancestors by walking parent pointers upward; a node
//! borrows its parent only for the duration of one step, so no in-memory
//! graph (with its cyclic ownership) is needed.
//!
//! ## Deletion
//!
//! Deletes never rebalance siblings. A vacated region joins the leaf's
//! intra-page free list; a leaf that empties is unlinked from the sibling
//! chain, removed from its parent, and recycled. An internal node left
//! with a single right child is dissolved (its child takes its slot in the
//! grandparent, or becomes the tree if the node was the root); one left
//! with no children at all is removed from its parent the same way a leaf
//! is. Zeroary and unary nodes are the error-prone cases and are handled
//! explicitly; a non-root internal node never persists with zero children.

use eyre::{bail, ensure, Result};
use tracing::debug;

use crate::errors::StorageError;
use crate::records::{cell_key, make_cell};
use crate::storage::{Pager, NULL_PAGE, PAGE_SIZE};

use super::internal::{ChildPos, InternalNode, InternalNodeMut};
use super::leaf::{LeafNode, LeafNodeMut, SearchResult};
use super::node::{NodeHeader, NodeType, CELL_POINTER_SIZE, LEAF_CAPACITY, MAX_CELL_SIZE};

pub struct Tree<'p> {
    pager: &'p mut Pager,
    root_page_num: u32,
}

impl<'p> Tree<'p> {
    /// Opens the tree rooted at `root_page_num`, initializing the page as
    /// an empty leaf if it has never been written.
    pub fn new(pager: &'p mut Pager, root_page_num: u32) -> Result<Self> {
        ensure!(
            root_page_num != NULL_PAGE && root_page_num < pager.num_pages(),
            "root page {} out of bounds (num_pages={})",
            root_page_num,
            pager.num_pages()
        );

        let page = pager.page_mut(root_page_num)?;
        if NodeHeader::from_page(page)?.is_blank() {
            LeafNodeMut::init(page, true, NULL_PAGE)?;
        }
        Ok(Self {
            pager,
            root_page_num,
        })
    }

    pub fn root_page(&self) -> u32 {
        self.root_page_num
    }

    pub(crate) fn pager(&mut self) -> &mut Pager {
        self.pager
    }

    pub(crate) fn node_type(&mut self, page_num: u32) -> Result<NodeType> {
        let page = self.pager.page(page_num)?;
        NodeHeader::from_page(page)?.node_type()
    }

    /// Descends to the leaf covering `key` and its slot within it.
    pub(crate) fn seek(&mut self, key: i32) -> Result<(u32, SearchResult)> {
        let mut current = self.root_page_num;
        loop {
            match self.node_type(current)? {
                NodeType::Leaf => {
                    let leaf = LeafNode::from_page(self.pager.page(current)?)?;
                    return Ok((current, leaf.find_key(key)?));
                }
                NodeType::Internal => {
                    let node = InternalNode::from_page(self.pager.page(current)?)?;
                    let (child, _) = node.find_child(key)?;
                    ensure!(
                        child != NULL_PAGE,
                        StorageError::CorruptPage(format!(
                            "internal node {} has a null child pointer",
                            current
                        ))
                    );
                    current = child;
                }
            }
        }
    }

    /// Looks up `key`, returning its record bytes.
    pub fn find(&mut self, key: i32) -> Result<Option<Vec<u8>>> {
        let (page_num, result) = self.seek(key)?;
        match result {
            SearchResult::Found(idx) => {
                let leaf = LeafNode::from_page(self.pager.page(page_num)?)?;
                let cell = leaf.cell_at(idx)?;
                Ok(Some(crate::records::cell_value(cell)?.to_vec()))
            }
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    /// Inserts `record` under `key`. Fails with `DuplicateKey` if the key
    /// is present and `TooLarge` if the cell cannot fit a leaf.
    pub fn insert(&mut self, key: i32, record: &[u8]) -> Result<()> {
        let cell = make_cell(key, record);
        if cell.len() > MAX_CELL_SIZE {
            bail!(StorageError::TooLarge {
                size: cell.len(),
                max: MAX_CELL_SIZE,
            });
        }

        let (leaf_page, result) = self.seek(key)?;
        let idx = match result {
            SearchResult::Found(_) => bail!(StorageError::DuplicateKey),
            SearchResult::NotFound(idx) => idx,
        };

        let (num_cells, is_root, fits) = {
            let leaf = LeafNodeMut::from_page(self.pager.page_mut(leaf_page)?)?;
            (
                leaf.num_cells(),
                leaf.as_ref().is_root(),
                leaf.can_fit(cell.len())?,
            )
        };

        if fits {
            let mut leaf = LeafNodeMut::from_page(self.pager.page_mut(leaf_page)?)?;
            leaf.insert_cell(idx, &cell)?;
            if idx == num_cells && !is_root {
                // Appended past the old maximum: ancestors referencing this
                // subtree by its max key must learn the new one.
                self.propagate_max_update(leaf_page)?;
            }
            return Ok(());
        }

        self.split_leaf(leaf_page, idx, &cell)
    }

    /// Removes `key`, failing with `NotFound` if absent.
    pub fn delete(&mut self, key: i32) -> Result<()> {
        let (leaf_page, result) = self.seek(key)?;
        let idx = match result {
            SearchResult::Found(idx) => idx,
            SearchResult::NotFound(_) => bail!(StorageError::NotFound),
        };

        let (num_cells, is_root, parent, next_leaf) = {
            let leaf = LeafNode::from_page(self.pager.page(leaf_page)?)?;
            (
                leaf.num_cells(),
                leaf.is_root(),
                leaf.parent(),
                leaf.next_leaf(),
            )
        };
        let was_max = idx + 1 == num_cells;

        if num_cells == 1 && is_root {
            // Last key in the tree: reset the root to an empty leaf.
            let page = self.pager.page_mut(leaf_page)?;
            LeafNodeMut::init(page, true, NULL_PAGE)?;
            return Ok(());
        }

        if num_cells == 1 {
            // The leaf empties: unlink it from the sibling chain, detach it
            // from its parent, and recycle the page. The predecessor must
            // be found while the parent still references this leaf.
            let pred = self.leaf_predecessor(leaf_page)?;
            if let Some(pred_page) = pred {
                let mut pred_leaf = LeafNodeMut::from_page(self.pager.page_mut(pred_page)?)?;
                pred_leaf.set_next_leaf(next_leaf);
            }
            self.remove_child(parent, leaf_page)?;
            self.pager.return_page(leaf_page);
            debug!(page = leaf_page, "empty leaf recycled");
            return Ok(());
        }

        {
            let mut leaf = LeafNodeMut::from_page(self.pager.page_mut(leaf_page)?)?;
            leaf.delete_cell(idx)?;
        }
        if was_max && !is_root {
            self.propagate_max_update(leaf_page)?;
        }
        Ok(())
    }

    // section: splits

    fn split_leaf(&mut self, page_num: u32, insert_idx: usize, new_cell: &[u8]) -> Result<()> {
        let (is_root, parent, old_next, mut cells) = {
            let leaf = LeafNode::from_page(self.pager.page(page_num)?)?;
            let mut cells: Vec<Vec<u8>> = Vec::with_capacity(leaf.num_cells() + 1);
            for i in 0..leaf.num_cells() {
                cells.push(leaf.cell_at(i)?.to_vec());
            }
            (leaf.is_root(), leaf.parent(), leaf.next_leaf(), cells)
        };
        cells.insert(insert_idx, new_cell.to_vec());

        let split_at = byte_balanced_split(&cells)?;
        let left_max = cell_key(&cells[split_at - 1])?;

        // The predecessor's next_leaf must be rewired to the left sibling;
        // find it while the parent still points at the page being split.
        let pred = if is_root {
            None
        } else {
            self.leaf_predecessor(page_num)?
        };

        let left_page = self.pager.allocate_page()?;
        let right_page = self.pager.allocate_page()?;
        let new_parent = if is_root { page_num } else { parent };
        debug!(
            old = page_num,
            left = left_page,
            right = right_page,
            cells = cells.len(),
            "leaf split"
        );

        {
            let page = self.pager.page_mut(left_page)?;
            let mut leaf = LeafNodeMut::init(page, false, new_parent)?;
            for (i, cell) in cells[..split_at].iter().enumerate() {
                leaf.insert_cell(i, cell)?;
            }
            leaf.set_next_leaf(right_page);
        }
        {
            let page = self.pager.page_mut(right_page)?;
            let mut leaf = LeafNodeMut::init(page, false, new_parent)?;
            for (i, cell) in cells[split_at..].iter().enumerate() {
                leaf.insert_cell(i, cell)?;
            }
            leaf.set_next_leaf(old_next);
        }

        if let Some(pred_page) = pred {
            let mut pred_leaf = LeafNodeMut::from_page(self.pager.page_mut(pred_page)?)?;
            pred_leaf.set_next_leaf(left_page);
        }

        if is_root {
            let page = self.pager.page_mut(page_num)?;
            let mut root = InternalNodeMut::init(page, true, NULL_PAGE, right_page)?;
            root.insert_entry(0, left_page, left_max)?;
            return Ok(());
        }

        self.internal_insert(parent, page_num, left_page, left_max, right_page)?;
        self.pager.return_page(page_num);
        Ok(())
    }

    /// Replaces `old_child` in `parent_page` with `left_page` (keyed by
    /// `left_key`) and `right_page`, splitting the parent if it is full.
    fn internal_insert(
        &mut self,
        parent_page: u32,
        old_child: u32,
        left_page: u32,
        left_key: i32,
        right_page: u32,
    ) -> Result<()> {
        let (pos, is_full) = {
            let node = InternalNode::from_page(self.pager.page(parent_page)?)?;
            (node.position_of_child(old_child)?, node.is_full())
        };
        let pos = pos.ok_or_else(|| {
            eyre::eyre!(StorageError::CorruptPage(format!(
                "node {} is not a child of its recorded parent {}",
                old_child, parent_page
            )))
        })?;

        if is_full {
            return self.split_internal(parent_page, old_child, left_page, left_key, right_page);
        }

        match pos {
            ChildPos::Inner(i) => {
                let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent_page)?)?;
                let old_key = node.key_at(i)?;
                node.set_entry(i, left_page, left_key)?;
                node.insert_entry(i + 1, right_page, old_key)?;
            }
            ChildPos::Right => {
                {
                    let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent_page)?)?;
                    let num_keys = node.num_keys();
                    node.insert_entry(num_keys, left_page, left_key)?;
                    node.set_right_child(right_page);
                }
                // The split may have introduced a new subtree maximum.
                self.propagate_max_update(parent_page)?;
            }
        }
        Ok(())
    }

    fn split_internal(
        &mut self,
        parent_page: u32,
        old_child: u32,
        left_page: u32,
        left_key: i32,
        right_page: u32,
    ) -> Result<()> {
        let (is_root, grandparent, mut entries) = {
            let node = InternalNode::from_page(self.pager.page(parent_page)?)?;
            let mut entries: Vec<(u32, Option<i32>)> = Vec::with_capacity(node.num_keys() + 2);
            for i in 0..node.num_keys() {
                entries.push((node.child_at(i)?, Some(node.key_at(i)?)));
            }
            entries.push((node.right_child(), None));
            (node.is_root(), node.parent(), entries)
        };

        let j = entries
            .iter()
            .position(|&(child, _)| child == old_child)
            .ok_or_else(|| {
                eyre::eyre!(StorageError::CorruptPage(format!(
                    "node {} is not a child of its recorded parent {}",
                    old_child, parent_page
                )))
            })?;
        let old_key = entries[j].1;
        entries[j] = (left_page, Some(left_key));
        entries.insert(j + 1, (right_page, old_key));

        let total = entries.len();
        let left_count = (total + 1) / 2;
        let left_node_key = entries[left_count - 1]
            .1
            .expect("only the last entry is keyless and it lands on the right split");

        let left_node = self.pager.allocate_page()?;
        let right_node = self.pager.allocate_page()?;
        let new_parent = if is_root { parent_page } else { grandparent };
        debug!(
            old = parent_page,
            left = left_node,
            right = right_node,
            children = total,
            "internal split"
        );

        {
            let page = self.pager.page_mut(left_node)?;
            let mut node =
                InternalNodeMut::init(page, false, new_parent, entries[left_count - 1].0)?;
            for (i, &(child, key)) in entries[..left_count - 1].iter().enumerate() {
                node.insert_entry(i, child, key.expect("inner entries carry keys"))?;
            }
        }
        {
            let page = self.pager.page_mut(right_node)?;
            let mut node =
                InternalNodeMut::init(page, false, new_parent, entries[total - 1].0)?;
            for (i, &(child, key)) in entries[left_count..total - 1].iter().enumerate() {
                node.insert_entry(i, child, key.expect("inner entries carry keys"))?;
            }
        }

        for &(child, _) in &entries[..left_count] {
            self.set_node_parent(child, left_node)?;
        }
        for &(child, _) in &entries[left_count..] {
            self.set_node_parent(child, right_node)?;
        }

        if is_root {
            let page = self.pager.page_mut(parent_page)?;
            let mut root = InternalNodeMut::init(page, true, NULL_PAGE, right_node)?;
            root.insert_entry(0, left_node, left_node_key)?;
            return Ok(());
        }

        self.internal_insert(grandparent, parent_page, left_node, left_node_key, right_node)?;
        self.pager.return_page(parent_page);
        Ok(())
    }

    // section: structural repair

    fn set_node_parent(&mut self, page_num: u32, parent: u32) -> Result<()> {
        let page = self.pager.page_mut(page_num)?;
        NodeHeader::from_page_mut(page)?.set_parent(parent);
        Ok(())
    }

    /// After `page_num`'s subtree maximum changed, rewrites the separator
    /// in the nearest ancestor that bounds this subtree with a key.
    fn propagate_max_update(&mut self, page_num: u32) -> Result<()> {
        let new_max = self.node_max_key(page_num)?;
        let mut current = page_num;
        loop {
            let (is_root, parent) = {
                let page = self.pager.page(current)?;
                let header = NodeHeader::from_page(page)?;
                (header.is_root(), header.parent())
            };
            if is_root {
                return Ok(());
            }

            let pos = {
                let node = InternalNode::from_page(self.pager.page(parent)?)?;
                node.position_of_child(current)?
            };
            match pos {
                Some(ChildPos::Inner(i)) => {
                    let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent)?)?;
                    node.set_key(i, new_max)?;
                    return Ok(());
                }
                Some(ChildPos::Right) => current = parent,
                None => bail!(StorageError::CorruptPage(format!(
                    "node {} is not a child of its recorded parent {}",
                    current, parent
                ))),
            }
        }
    }

    /// Maximum key in the subtree rooted at `page_num` (its right spine).
    fn node_max_key(&mut self, page_num: u32) -> Result<i32> {
        let mut current = page_num;
        loop {
            match self.node_type(current)? {
                NodeType::Leaf => {
                    let leaf = LeafNode::from_page(self.pager.page(current)?)?;
                    return leaf.max_key();
                }
                NodeType::Internal => {
                    let node = InternalNode::from_page(self.pager.page(current)?)?;
                    current = node.right_child();
                }
            }
        }
    }

    /// The leaf immediately before `page_num` in key order: ascend until
    /// the node is not its parent's first child, step left, then descend
    /// the right spine. `None` for the leftmost leaf.
    fn leaf_predecessor(&mut self, page_num: u32) -> Result<Option<u32>> {
        let mut current = page_num;
        loop {
            let (is_root, parent) = {
                let page = self.pager.page(current)?;
                let header = NodeHeader::from_page(page)?;
                (header.is_root(), header.parent())
            };
            if is_root {
                return Ok(None);
            }

            let (pos, num_keys) = {
                let node = InternalNode::from_page(self.pager.page(parent)?)?;
                (node.position_of_child(current)?, node.num_keys())
            };
            let index = match pos {
                Some(ChildPos::Inner(i)) => i,
                Some(ChildPos::Right) => num_keys,
                None => bail!(StorageError::CorruptPage(format!(
                    "node {} is not a child of its recorded parent {}",
                    current, parent
                ))),
            };

            if index == 0 {
                current = parent;
                continue;
            }

            let mut descend = {
                let node = InternalNode::from_page(self.pager.page(parent)?)?;
                node.child_at(index - 1)?
            };
            loop {
                match self.node_type(descend)? {
                    NodeType::Leaf => return Ok(Some(descend)),
                    NodeType::Internal => {
                        let node = InternalNode::from_page(self.pager.page(descend)?)?;
                        descend = node.right_child();
                    }
                }
            }
        }
    }

    /// Detaches `child_page` from `parent_page`, dissolving the parent if
    /// it becomes unary and recursing upward if it loses its last child.
    fn remove_child(&mut self, parent_page: u32, child_page: u32) -> Result<()> {
        let (pos, num_keys, is_root, grandparent) = {
            let node = InternalNode::from_page(self.pager.page(parent_page)?)?;
            (
                node.position_of_child(child_page)?,
                node.num_keys(),
                node.is_root(),
                node.parent(),
            )
        };
        let pos = pos.ok_or_else(|| {
            eyre::eyre!(StorageError::CorruptPage(format!(
                "node {} is not a child of its recorded parent {}",
                child_page, parent_page
            )))
        })?;

        match pos {
            ChildPos::Inner(i) => {
                let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent_page)?)?;
                node.remove_entry(i)?;
            }
            ChildPos::Right if num_keys > 0 => {
                // Promote the last inner child to right child; the parent's
                // maximum shrinks, so ancestors must be repaired.
                {
                    let mut node =
                        InternalNodeMut::from_page(self.pager.page_mut(parent_page)?)?;
                    let last = num_keys - 1;
                    let promoted = node.child_at(last)?;
                    node.remove_entry(last)?;
                    node.set_right_child(promoted);
                }
                self.propagate_max_update(parent_page)?;
            }
            ChildPos::Right => {
                // Zeroary: the parent lost its only child.
                debug!(page = parent_page, "zeroary internal node removed");
                if is_root {
                    let page = self.pager.page_mut(parent_page)?;
                    LeafNodeMut::init(page, true, NULL_PAGE)?;
                } else {
                    self.remove_child(grandparent, parent_page)?;
                    self.pager.return_page(parent_page);
                }
                return Ok(());
            }
        }

        let remaining = {
            let node = InternalNode::from_page(self.pager.page(parent_page)?)?;
            node.num_keys()
        };
        if remaining == 0 {
            self.dissolve_unary(parent_page)?;
        }
        Ok(())
    }

    /// Replaces a unary internal node (zero keys, right child only) with
    /// its single child.
    fn dissolve_unary(&mut self, page_num: u32) -> Result<()> {
        let (is_root, parent, child) = {
            let node = InternalNode::from_page(self.pager.page(page_num)?)?;
            (node.is_root(), node.parent(), node.right_child())
        };
        debug!(page = page_num, child, "unary internal node dissolved");

        if is_root {
            // The tree shrinks by one level; the root page must not move,
            // so the child's content is copied onto it.
            let content = self.pager.page(child)?.to_vec();
            let page = self.pager.page_mut(page_num)?;
            page.copy_from_slice(&content);
            let header = NodeHeader::from_page_mut(page)?;
            header.set_is_root(true);
            header.set_parent(NULL_PAGE);

            if self.node_type(page_num)? == NodeType::Internal {
                let children = {
                    let node = InternalNode::from_page(self.pager.page(page_num)?)?;
                    node.children()?
                };
                for grandchild in children {
                    self.set_node_parent(grandchild, page_num)?;
                }
            }
            self.pager.return_page(child);
            return Ok(());
        }

        let pos = {
            let node = InternalNode::from_page(self.pager.page(parent)?)?;
            node.position_of_child(page_num)?
        };
        match pos {
            Some(ChildPos::Inner(i)) => {
                let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent)?)?;
                let key = node.key_at(i)?;
                node.set_entry(i, child, key)?;
            }
            Some(ChildPos::Right) => {
                let mut node = InternalNodeMut::from_page(self.pager.page_mut(parent)?)?;
                node.set_right_child(child);
            }
            None => bail!(StorageError::CorruptPage(format!(
                "node {} is not a child of its recorded parent {}",
                page_num, parent
            ))),
        }
        self.set_node_parent(child, parent)?;
        self.pager.return_page(page_num);
        Ok(())
    }

    // section: introspection

    /// Number of levels from the root down to the leaves.
    pub fn height(&mut self) -> Result<usize> {
        let mut levels = 1;
        let mut current = self.root_page_num;
        while self.node_type(current)? == NodeType::Internal {
            let node = InternalNode::from_page(self.pager.page(current)?)?;
            current = if node.num_keys() > 0 {
                node.child_at(0)?
            } else {
                node.right_child()
            };
            levels += 1;
        }
        Ok(levels)
    }

    /// Every page in the tree, root first.
    pub fn pages(&mut self) -> Result<Vec<u32>> {
        let mut pages = vec![self.root_page_num];
        let mut i = 0;
        while i < pages.len() {
            let page_num = pages[i];
            i += 1;
            if self.node_type(page_num)? == NodeType::Internal {
                let node = InternalNode::from_page(self.pager.page(page_num)?)?;
                pages.extend(node.children()?);
            }
        }
        Ok(pages)
    }

    /// A level-by-level dump of the tree, for debugging and tests.
    pub fn render(&mut self) -> Result<String> {
        use std::fmt::Write;

        let mut out = String::new();
        let mut level: Vec<u32> = vec![self.root_page_num];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for &page_num in &level {
                match self.node_type(page_num)? {
                    NodeType::Leaf => {
                        let leaf = LeafNode::from_page(self.pager.page(page_num)?)?;
                        let keys: Vec<String> = (0..leaf.num_cells())
                            .map(|i| leaf.key_at(i).map(|k| k.to_string()))
                            .collect::<Result<_>>()?;
                        let _ = write!(out, "leaf[{}]({}) ", page_num, keys.join(","));
                    }
                    NodeType::Internal => {
                        let node = InternalNode::from_page(self.pager.page(page_num)?)?;
                        let keys: Vec<String> = (0..node.num_keys())
                            .map(|i| node.key_at(i).map(|k| k.to_string()))
                            .collect::<Result<_>>()?;
                        let _ = write!(out, "internal[{}]({}) ", page_num, keys.join(","));
                        next_level.extend(node.children()?);
                    }
                }
            }
            out.push('\n');
            level = next_level;
        }
        Ok(out)
    }

    // section: validation

    /// Walks the whole tree checking every structural invariant: header
    /// sanity, in-order keys within and across nodes, separator bounds,
    /// parent pointers, the sibling chain, cell-region disjointness, and
    /// exact free-space accounting.
    pub fn validate(&mut self) -> Result<()> {
        let mut leaves: Vec<(u32, u32)> = Vec::new();
        let mut last_key: Option<i32> = None;
        self.validate_node(
            self.root_page_num,
            None,
            None,
            NULL_PAGE,
            true,
            &mut leaves,
            &mut last_key,
        )?;

        for pair in leaves.windows(2) {
            let (page, next) = pair[0];
            let (following, _) = pair[1];
            if next != following {
                bail!(StorageError::InvariantViolation(format!(
                    "leaf {} links to {} but the next leaf in key order is {}",
                    page, next, following
                )));
            }
        }
        if let Some(&(last_page, next)) = leaves.last() {
            if next != NULL_PAGE {
                bail!(StorageError::InvariantViolation(format!(
                    "rightmost leaf {} links to {}",
                    last_page, next
                )));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_node(
        &mut self,
        page_num: u32,
        low_excl: Option<i32>,
        high_incl: Option<i32>,
        expected_parent: u32,
        expect_root: bool,
        leaves: &mut Vec<(u32, u32)>,
        last_key: &mut Option<i32>,
    ) -> Result<()> {
        let violation = |msg: String| {
            eyre::eyre!(StorageError::InvariantViolation(format!(
                "page {}: {}",
                page_num, msg
            )))
        };

        let (node_type, is_root, parent) = {
            let page = self.pager.page(page_num)?;
            let header = NodeHeader::from_page(page)?;
            (header.node_type()?, header.is_root(), header.parent())
        };
        if is_root != expect_root {
            return Err(violation(format!(
                "is_root is {} but the walk reached it as {}",
                is_root,
                if expect_root { "the root" } else { "a child" }
            )));
        }
        if parent != expected_parent {
            return Err(violation(format!(
                "parent pointer is {} but the walk came from {}",
                parent, expected_parent
            )));
        }

        match node_type {
            NodeType::Leaf => {
                self.validate_leaf(page_num, low_excl, high_incl, is_root, leaves, last_key)
            }
            NodeType::Internal => {
                let (num_keys, children_keys) = {
                    let node = InternalNode::from_page(self.pager.page(page_num)?)?;
                    let mut pairs = Vec::with_capacity(node.num_keys());
                    for i in 0..node.num_keys() {
                        pairs.push((node.child_at(i)?, node.key_at(i)?));
                    }
                    (node.num_keys(), pairs)
                };
                if num_keys == 0 {
                    return Err(violation("internal node has no keys".into()));
                }

                let mut lower = low_excl;
                for &(child, key) in &children_keys {
                    if let Some(low) = lower {
                        if key <= low {
                            return Err(violation(format!(
                                "separator {} is not above the lower bound {}",
                                key, low
                            )));
                        }
                    }
                    if let Some(high) = high_incl {
                        if key > high {
                            return Err(violation(format!(
                                "separator {} exceeds the upper bound {}",
                                key, high
                            )));
                        }
                    }
                    self.validate_node(
                        child,
                        lower,
                        Some(key),
                        page_num,
                        false,
                        leaves,
                        last_key,
                    )?;
                    lower = Some(key);
                }

                let right = {
                    let node = InternalNode::from_page(self.pager.page(page_num)?)?;
                    node.right_child()
                };
                self.validate_node(right, lower, high_incl, page_num, false, leaves, last_key)
            }
        }
    }

    fn validate_leaf(
        &mut self,
        page_num: u32,
        low_excl: Option<i32>,
        high_incl: Option<i32>,
        is_root: bool,
        leaves: &mut Vec<(u32, u32)>,
        last_key: &mut Option<i32>,
    ) -> Result<()> {
        let violation = |msg: String| {
            eyre::eyre!(StorageError::InvariantViolation(format!(
                "page {}: {}",
                page_num, msg
            )))
        };

        let leaf = LeafNode::from_page(self.pager.page(page_num)?)?;
        let num_cells = leaf.num_cells();
        if num_cells == 0 && !is_root {
            return Err(violation("non-root leaf has no cells".into()));
        }

        let cellptr_end = leaf.cellptr_end();
        let alloc_ptr = leaf.alloc_ptr();
        if cellptr_end > alloc_ptr || alloc_ptr > PAGE_SIZE {
            return Err(violation(format!(
                "cell pointers end at {} but alloc_ptr is {}",
                cellptr_end, alloc_ptr
            )));
        }

        let mut regions: Vec<(usize, usize)> = Vec::with_capacity(num_cells);
        let mut prev: Option<i32> = None;
        for i in 0..num_cells {
            let cell = leaf.cell_at(i)?;
            let key = cell_key(cell)?;

            if let Some(p) = prev {
                if key <= p {
                    return Err(violation(format!(
                        "cell {} key {} is not above its predecessor {}",
                        i, key, p
                    )));
                }
            }
            prev = Some(key);
            if let Some(low) = low_excl {
                if key <= low {
                    return Err(violation(format!(
                        "key {} is not above the lower bound {}",
                        key, low
                    )));
                }
            }
            if let Some(high) = high_incl {
                if key > high {
                    return Err(violation(format!(
                        "key {} exceeds the upper bound {}",
                        key, high
                    )));
                }
            }
            if let Some(global) = *last_key {
                if key <= global {
                    return Err(violation(format!(
                        "key {} is not above the previous leaf's {}",
                        key, global
                    )));
                }
            }
            *last_key = Some(key);

            let offset = leaf.cell_ptr(i)?;
            if offset < alloc_ptr {
                return Err(violation(format!(
                    "cell {} sits at {}, below alloc_ptr {}",
                    i, offset, alloc_ptr
                )));
            }
            regions.push((offset, cell.len()));
        }

        let blocks = leaf.free_blocks()?;
        let listed: usize = blocks.iter().map(|&(_, size)| size).sum();
        if listed != leaf.total_free_bytes() {
            return Err(violation(format!(
                "free list holds {} bytes but total_free_bytes says {}",
                listed,
                leaf.total_free_bytes()
            )));
        }
        for &(offset, size) in &blocks {
            if offset < alloc_ptr {
                return Err(violation(format!(
                    "free block at {} sits below alloc_ptr {}",
                    offset, alloc_ptr
                )));
            }
            regions.push((offset, size));
        }

        regions.sort_unstable();
        for pair in regions.windows(2) {
            let (a_off, a_len) = pair[0];
            let (b_off, _) = pair[1];
            if a_off + a_len > b_off {
                return Err(violation(format!(
                    "regions at {} (+{}) and {} overlap",
                    a_off, a_len, b_off
                )));
            }
        }

        leaves.push((page_num, leaf.next_leaf()));
        Ok(())
    }
}

/// Index at which to split a sorted run of cells so each side holds
/// roughly half the bytes (pointer slots included, the lower side taking
/// the extra) and both sides are guaranteed to fit a leaf.
fn byte_balanced_split(cells: &[Vec<u8>]) -> Result<usize> {
    ensure!(cells.len() >= 2, "cannot split {} cells", cells.len());

    let weights: Vec<usize> = cells
        .iter()
        .map(|c| c.len() + CELL_POINTER_SIZE)
        .collect();
    let total: usize = weights.iter().sum();
    let half = (total + 1) / 2;

    let mut split_at = 0;
    let mut left = 0;
    while split_at < cells.len() && left < half {
        left += weights[split_at];
        split_at += 1;
    }
    split_at = split_at.clamp(1, cells.len() - 1);

    let prefix = |k: usize| -> usize { weights[..k].iter().sum() };
    while prefix(split_at) > LEAF_CAPACITY && split_at > 1 {
        split_at -= 1;
    }
    while total - prefix(split_at) > LEAF_CAPACITY && split_at < cells.len() - 1 {
        split_at += 1;
    }
    ensure!(
        prefix(split_at) <= LEAF_CAPACITY && total - prefix(split_at) <= LEAF_CAPACITY,
        "cells cannot be split across two leaves"
    );
    Ok(split_at)
}
