//! # Node Headers and Page Layout
//!
//! Every node page begins with a 13-byte common header, followed by a
//! type-specific header. The structs here are the on-disk layout, read and
//! written in place through zerocopy.
//!
//! ## Common Header (bytes 0..13)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------
//! 0       1     node_type (1 = leaf, 2 = internal)
//! 1       1     is_root (0/1)
//! 2       4     parent page number (0 for the root)
//! 6       7     reserved
//! ```
//!
//! ## Leaf Header (bytes 13..29)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------
//! 13      2     num_cells
//! 15      2     alloc_ptr (first byte past the lowest allocated cell)
//! 17      2     free_list_head (in-page offset, 0 = empty)
//! 19      2     total_free_bytes (sum of free-list block sizes)
//! 21      4     next_leaf page number (0 = rightmost leaf)
//! 25      4     reserved
//! ```
//!
//! The cell-pointer array starts at byte 29 and grows up; cells grow down
//! from the page end. In-page offsets fit in u16 with 4KB pages; page
//! numbers are u32.
//!
//! ## Internal Header (bytes 13..21)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------
//! 13      2     num_keys
//! 15      2     reserved
//! 17      4     right_child page number
//! ```
//!
//! The packed `(child_page: u32, key: i32)` array starts at byte 21.
//! Internal cells are fixed 8-byte entries, so internal nodes need none of
//! the leaf's free-space machinery.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::StorageError;
use crate::storage::PAGE_SIZE;

pub const COMMON_HEADER_SIZE: usize = 13;
pub const LEAF_HEADER_SIZE: usize = 16;
pub const LEAF_CONTENT_START: usize = COMMON_HEADER_SIZE + LEAF_HEADER_SIZE;
pub const CELL_POINTER_SIZE: usize = 4;

pub const INTERNAL_HEADER_SIZE: usize = 8;
pub const INTERNAL_CONTENT_START: usize = COMMON_HEADER_SIZE + INTERNAL_HEADER_SIZE;
pub const INTERNAL_CELL_SIZE: usize = 8;
pub const INTERNAL_MAX_CELLS: usize = (PAGE_SIZE - INTERNAL_CONTENT_START) / INTERNAL_CELL_SIZE;

/// Bytes of a leaf usable for cell pointers and cells.
pub const LEAF_CAPACITY: usize = PAGE_SIZE - LEAF_CONTENT_START;

/// Largest cell a leaf accepts: at least two maximum cells plus their
/// pointers must fit on one page, which the split algorithm relies on.
pub const MAX_CELL_SIZE: usize = (LEAF_CAPACITY - 2 * CELL_POINTER_SIZE) / 2;

/// Free blocks smaller than this are not tracked in the intra-page free
/// list; compaction absorbs them.
pub const MIN_FREE_BLOCK: usize = 8;
pub const FREE_BLOCK_HEADER_SIZE: usize = 4;

/// A leaf is compacted when this much of it is on the free list and the
/// live payload has fallen under half capacity.
pub const COMPACTION_THRESHOLD: usize = PAGE_SIZE / 4;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf = 1,
    Internal = 2,
}

impl NodeType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(NodeType::Leaf),
            2 => Some(NodeType::Internal),
            _ => None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    node_type: u8,
    is_root: u8,
    parent: U32,
    reserved: [u8; 7],
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == COMMON_HEADER_SIZE);

impl NodeHeader {
    pub fn new(node_type: NodeType, is_root: bool, parent: u32) -> Self {
        Self {
            node_type: node_type as u8,
            is_root: is_root as u8,
            parent: U32::new(parent),
            reserved: [0u8; 7],
        }
    }

    pub fn from_page(page: &[u8]) -> Result<&Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::ref_from_bytes(&page[..COMMON_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    pub fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::mut_from_bytes(&mut page[..COMMON_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read NodeHeader: {:?}", e))
    }

    /// The node type, or `CorruptPage` if the byte is not a known type.
    pub fn node_type(&self) -> Result<NodeType> {
        NodeType::from_byte(self.node_type).ok_or_else(|| {
            eyre::eyre!(StorageError::CorruptPage(format!(
                "unknown node type byte {:#04x}",
                self.node_type
            )))
        })
    }

    /// True for a page that has never been initialized as a node.
    pub fn is_blank(&self) -> bool {
        self.node_type == 0
    }

    pub fn is_root(&self) -> bool {
        self.is_root != 0
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        self.is_root = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        self.parent.get()
    }

    pub fn set_parent(&mut self, page_num: u32) {
        self.parent = U32::new(page_num);
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafHeader {
    num_cells: U16,
    alloc_ptr: U16,
    free_list_head: U16,
    total_free_bytes: U16,
    next_leaf: U32,
    reserved: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<LeafHeader>() == LEAF_HEADER_SIZE);

impl LeafHeader {
    pub fn new() -> Self {
        Self {
            num_cells: U16::new(0),
            alloc_ptr: U16::new(PAGE_SIZE as u16),
            free_list_head: U16::new(0),
            total_free_bytes: U16::new(0),
            next_leaf: U32::new(0),
            reserved: [0u8; 4],
        }
    }

    pub fn from_page(page: &[u8]) -> Result<&Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::ref_from_bytes(&page[COMMON_HEADER_SIZE..LEAF_CONTENT_START])
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))
    }

    pub fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::mut_from_bytes(&mut page[COMMON_HEADER_SIZE..LEAF_CONTENT_START])
            .map_err(|e| eyre::eyre!("failed to read LeafHeader: {:?}", e))
    }

    pub fn num_cells(&self) -> u16 {
        self.num_cells.get()
    }

    pub fn set_num_cells(&mut self, n: u16) {
        self.num_cells = U16::new(n);
    }

    pub fn alloc_ptr(&self) -> u16 {
        self.alloc_ptr.get()
    }

    pub fn set_alloc_ptr(&mut self, offset: u16) {
        self.alloc_ptr = U16::new(offset);
    }

    pub fn free_list_head(&self) -> u16 {
        self.free_list_head.get()
    }

    pub fn set_free_list_head(&mut self, offset: u16) {
        self.free_list_head = U16::new(offset);
    }

    pub fn total_free_bytes(&self) -> u16 {
        self.total_free_bytes.get()
    }

    pub fn set_total_free_bytes(&mut self, bytes: u16) {
        self.total_free_bytes = U16::new(bytes);
    }

    pub fn next_leaf(&self) -> u32 {
        self.next_leaf.get()
    }

    pub fn set_next_leaf(&mut self, page_num: u32) {
        self.next_leaf = U32::new(page_num);
    }
}

impl Default for LeafHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct InternalHeader {
    num_keys: U16,
    reserved: [u8; 2],
    right_child: U32,
}

const _: () = assert!(std::mem::size_of::<InternalHeader>() == INTERNAL_HEADER_SIZE);

impl InternalHeader {
    pub fn new(right_child: u32) -> Self {
        Self {
            num_keys: U16::new(0),
            reserved: [0u8; 2],
            right_child: U32::new(right_child),
        }
    }

    pub fn from_page(page: &[u8]) -> Result<&Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::ref_from_bytes(&page[COMMON_HEADER_SIZE..INTERNAL_CONTENT_START])
            .map_err(|e| eyre::eyre!("failed to read InternalHeader: {:?}", e))
    }

    pub fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            page.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            page.len(),
            PAGE_SIZE
        );
        Self::mut_from_bytes(&mut page[COMMON_HEADER_SIZE..INTERNAL_CONTENT_START])
            .map_err(|e| eyre::eyre!("failed to read InternalHeader: {:?}", e))
    }

    pub fn num_keys(&self) -> u16 {
        self.num_keys.get()
    }

    pub fn set_num_keys(&mut self, n: u16) {
        self.num_keys = U16::new(n);
    }

    pub fn right_child(&self) -> u32 {
        self.right_child.get()
    }

    pub fn set_right_child(&mut self, page_num: u32) {
        self.right_child = U32::new(page_num);
    }
}
