//! # Leaf Node Pages
//!
//! Leaf pages store the actual cells. Within the page, from low to high
//! addresses:
//!
//! ```text
//! +-----------------------------+ 0
//! | common header (13B)         |
//! +-----------------------------+ 13
//! | leaf header (16B)           |
//! +-----------------------------+ 29
//! | cell-pointer array          |  4B entries, sorted by cell key
//! +-----------------------------+ cellptr_end
//! | unallocated gap             |
//! +-----------------------------+ alloc_ptr
//! | cells (+ free blocks)       |  cells laid down from the page end
//! +-----------------------------+ PAGE_SIZE
//! ```
//!
//! Cells are unordered in memory; only the pointer array is sorted. A new
//! cell is carved either from the intra-page free list (first fit, taken
//! from the block's high end) or from the gap by decrementing `alloc_ptr`.
//!
//! ## Intra-Page Free List
//!
//! Deleted cells become free blocks, chained from `free_list_head` through
//! the first four bytes of each block:
//!
//! ```text
//! block:  [ size: u16 | next_offset: u16 | ...dead bytes... ]
//! ```
//!
//! The list is unsorted; allocation is first-fit. Residues smaller than
//! `MIN_FREE_BLOCK` are dropped from the list and recovered by the next
//! compaction. `total_free_bytes` always equals the sum of listed block
//! sizes, which validation checks exactly.
//!
//! ## Compaction
//!
//! Compaction rewrites all live cells contiguously against the page end in
//! pointer order, resets `alloc_ptr`, and clears the free list. Running it
//! twice yields the same byte layout as running it once.
//!
//! `LeafNode` / `LeafNodeMut` borrow the page buffer; nothing here reads
//! or writes any other page.

use eyre::{bail, ensure, Result};

use crate::errors::StorageError;
use crate::records::{cell_key, cell_size};
use crate::storage::PAGE_SIZE;

use super::node::{
    LeafHeader, NodeHeader, NodeType, CELL_POINTER_SIZE, COMPACTION_THRESHOLD,
    FREE_BLOCK_HEADER_SIZE, LEAF_CAPACITY, LEAF_CONTENT_START, MAX_CELL_SIZE, MIN_FREE_BLOCK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

#[derive(Debug)]
pub struct LeafNode<'a> {
    data: &'a [u8],
}

pub struct LeafNodeMut<'a> {
    data: &'a mut [u8],
}

fn check_leaf(data: &[u8]) -> Result<()> {
    let header = NodeHeader::from_page(data)?;
    let node_type = header.node_type()?;
    if node_type != NodeType::Leaf {
        bail!(StorageError::CorruptPage(format!(
            "expected leaf node, found {:?}",
            node_type
        )));
    }
    Ok(())
}

impl<'a> LeafNode<'a> {
    pub fn from_page(data: &'a [u8]) -> Result<Self> {
        check_leaf(data)?;
        Ok(Self { data })
    }

    fn header(&self) -> &NodeHeader {
        NodeHeader::from_page(self.data).expect("validated in from_page")
    }

    fn leaf_header(&self) -> &LeafHeader {
        LeafHeader::from_page(self.data).expect("validated in from_page")
    }

    pub fn is_root(&self) -> bool {
        self.header().is_root()
    }

    pub fn parent(&self) -> u32 {
        self.header().parent()
    }

    pub fn num_cells(&self) -> usize {
        self.leaf_header().num_cells() as usize
    }

    pub fn alloc_ptr(&self) -> usize {
        self.leaf_header().alloc_ptr() as usize
    }

    pub fn free_list_head(&self) -> usize {
        self.leaf_header().free_list_head() as usize
    }

    pub fn total_free_bytes(&self) -> usize {
        self.leaf_header().total_free_bytes() as usize
    }

    pub fn next_leaf(&self) -> u32 {
        self.leaf_header().next_leaf()
    }

    /// End of the cell-pointer array.
    pub fn cellptr_end(&self) -> usize {
        LEAF_CONTENT_START + self.num_cells() * CELL_POINTER_SIZE
    }

    /// Bytes of unallocated gap between the pointer array and the cells.
    pub fn alloc_gap(&self) -> usize {
        self.alloc_ptr().saturating_sub(self.cellptr_end())
    }

    pub fn cell_ptr(&self, index: usize) -> Result<usize> {
        ensure!(
            index < self.num_cells(),
            "cell index {} out of bounds (num_cells={})",
            index,
            self.num_cells()
        );
        let at = LEAF_CONTENT_START + index * CELL_POINTER_SIZE;
        let offset =
            u32::from_le_bytes(self.data[at..at + 4].try_into().expect("4-byte slice")) as usize;
        ensure!(
            offset >= LEAF_CONTENT_START && offset + 8 <= PAGE_SIZE,
            StorageError::CorruptPage(format!("cell pointer {} points at {}", index, offset))
        );
        Ok(offset)
    }

    pub fn cell_at(&self, index: usize) -> Result<&'a [u8]> {
        let offset = self.cell_ptr(index)?;
        let size = cell_size(&self.data[offset..])?;
        ensure!(
            offset + size <= PAGE_SIZE,
            StorageError::CorruptPage(format!(
                "cell at {} extends {} bytes past the page end",
                offset,
                offset + size - PAGE_SIZE
            ))
        );
        Ok(&self.data[offset..offset + size])
    }

    pub fn key_at(&self, index: usize) -> Result<i32> {
        cell_key(self.cell_at(index)?)
    }

    /// Binary search over the cell-pointer array.
    pub fn find_key(&self, key: i32) -> Result<SearchResult> {
        let mut left = 0usize;
        let mut right = self.num_cells();

        while left < right {
            let mid = left + (right - left) / 2;
            let mid_key = self.key_at(mid)?;
            match key.cmp(&mid_key) {
                std::cmp::Ordering::Equal => return Ok(SearchResult::Found(mid)),
                std::cmp::Ordering::Less => right = mid,
                std::cmp::Ordering::Greater => left = mid + 1,
            }
        }
        Ok(SearchResult::NotFound(left))
    }

    pub fn max_key(&self) -> Result<i32> {
        ensure!(self.num_cells() > 0, "max_key on an empty leaf");
        self.key_at(self.num_cells() - 1)
    }

    /// All `(offset, size)` blocks reachable from the free-list head.
    pub fn free_blocks(&self) -> Result<Vec<(usize, usize)>> {
        let mut blocks = Vec::new();
        let mut offset = self.free_list_head();
        let limit = PAGE_SIZE / MIN_FREE_BLOCK + 1;

        while offset != 0 {
            ensure!(
                blocks.len() < limit,
                StorageError::CorruptPage("free list does not terminate".into())
            );
            ensure!(
                offset >= LEAF_CONTENT_START && offset + FREE_BLOCK_HEADER_SIZE <= PAGE_SIZE,
                StorageError::CorruptPage(format!("free block offset {} out of range", offset))
            );
            let size = u16::from_le_bytes(
                self.data[offset..offset + 2].try_into().expect("2-byte slice"),
            ) as usize;
            let next = u16::from_le_bytes(
                self.data[offset + 2..offset + 4]
                    .try_into()
                    .expect("2-byte slice"),
            ) as usize;
            ensure!(
                size >= FREE_BLOCK_HEADER_SIZE && offset + size <= PAGE_SIZE,
                StorageError::CorruptPage(format!(
                    "free block at {} has bad size {}",
                    offset, size
                ))
            );
            blocks.push((offset, size));
            offset = next;
        }
        Ok(blocks)
    }

    /// Live bytes: cells plus their pointer slots.
    pub fn payload_bytes(&self) -> Result<usize> {
        let mut total = self.num_cells() * CELL_POINTER_SIZE;
        for i in 0..self.num_cells() {
            total += cell_size(&self.data[self.cell_ptr(i)?..])?;
        }
        Ok(total)
    }
}

impl<'a> LeafNodeMut<'a> {
    pub fn from_page(data: &'a mut [u8]) -> Result<Self> {
        check_leaf(data)?;
        Ok(Self { data })
    }

    /// Initializes the page as an empty leaf, overwriting whatever was
    /// there (recycled pages carry stale content).
    pub fn init(data: &'a mut [u8], is_root: bool, parent: u32) -> Result<Self> {
        ensure!(
            data.len() == PAGE_SIZE,
            "invalid page size: {} != {}",
            data.len(),
            PAGE_SIZE
        );
        use zerocopy::IntoBytes;
        data[..super::node::COMMON_HEADER_SIZE]
            .copy_from_slice(NodeHeader::new(NodeType::Leaf, is_root, parent).as_bytes());
        data[super::node::COMMON_HEADER_SIZE..LEAF_CONTENT_START]
            .copy_from_slice(LeafHeader::new().as_bytes());
        Ok(Self { data })
    }

    pub fn as_ref(&self) -> LeafNode<'_> {
        LeafNode { data: self.data }
    }

    fn leaf_header_mut(&mut self) -> &mut LeafHeader {
        LeafHeader::from_page_mut(self.data).expect("validated in from_page/init")
    }

    pub fn num_cells(&self) -> usize {
        self.as_ref().num_cells()
    }

    pub fn next_leaf(&self) -> u32 {
        self.as_ref().next_leaf()
    }

    pub fn set_next_leaf(&mut self, page_num: u32) {
        self.leaf_header_mut().set_next_leaf(page_num);
    }

    pub fn set_parent(&mut self, page_num: u32) {
        NodeHeader::from_page_mut(self.data)
            .expect("validated in from_page/init")
            .set_parent(page_num);
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        NodeHeader::from_page_mut(self.data)
            .expect("validated in from_page/init")
            .set_is_root(is_root);
    }

    pub fn find_key(&self, key: i32) -> Result<SearchResult> {
        self.as_ref().find_key(key)
    }

    pub fn key_at(&self, index: usize) -> Result<i32> {
        self.as_ref().key_at(index)
    }

    /// Whether a cell of `need` bytes can be placed without splitting,
    /// mirroring the allocation ladder of `insert_cell` exactly.
    pub fn can_fit(&self, need: usize) -> Result<bool> {
        let view = self.as_ref();
        let gap = view.alloc_gap();

        if gap >= CELL_POINTER_SIZE && self.find_free_block(need)?.is_some() {
            return Ok(true);
        }
        if gap >= need + CELL_POINTER_SIZE {
            return Ok(true);
        }
        Ok(view.total_free_bytes() + gap >= need + CELL_POINTER_SIZE)
    }

    /// First free block of at least `need` bytes: `(prev_offset, offset,
    /// size)` with `prev_offset == 0` for the head.
    fn find_free_block(&self, need: usize) -> Result<Option<(usize, usize, usize)>> {
        let view = self.as_ref();
        let mut prev = 0usize;
        for (offset, size) in view.free_blocks()? {
            if size >= need {
                return Ok(Some((prev, offset, size)));
            }
            prev = offset;
        }
        Ok(None)
    }

    fn read_block(&self, offset: usize) -> (usize, usize) {
        let size = u16::from_le_bytes(
            self.data[offset..offset + 2].try_into().expect("2-byte slice"),
        ) as usize;
        let next = u16::from_le_bytes(
            self.data[offset + 2..offset + 4]
                .try_into()
                .expect("2-byte slice"),
        ) as usize;
        (size, next)
    }

    fn write_block(&mut self, offset: usize, size: usize, next: usize) {
        self.data[offset..offset + 2].copy_from_slice(&(size as u16).to_le_bytes());
        self.data[offset + 2..offset + 4].copy_from_slice(&(next as u16).to_le_bytes());
    }

    /// Places `cell` and splices its pointer in at `index`. The caller has
    /// already established key order and checked `can_fit`.
    pub fn insert_cell(&mut self, index: usize, cell: &[u8]) -> Result<()> {
        let need = cell.len();
        ensure!(
            need <= MAX_CELL_SIZE,
            StorageError::TooLarge {
                size: need,
                max: MAX_CELL_SIZE
            }
        );
        let num_cells = self.num_cells();
        ensure!(
            index <= num_cells,
            "insert index {} out of bounds (num_cells={})",
            index,
            num_cells
        );

        let gap = self.as_ref().alloc_gap();

        let cell_offset = if gap >= CELL_POINTER_SIZE {
            match self.find_free_block(need)? {
                Some((prev, block, size)) => {
                    let cell_offset = block + size - need;
                    let residual = size - need;
                    let (_, next) = self.read_block(block);
                    if residual >= MIN_FREE_BLOCK {
                        self.write_block(block, residual, next);
                        let total = self.as_ref().total_free_bytes() - need;
                        self.leaf_header_mut().set_total_free_bytes(total as u16);
                    } else {
                        if prev == 0 {
                            self.leaf_header_mut().set_free_list_head(next as u16);
                        } else {
                            let (prev_size, _) = self.read_block(prev);
                            self.write_block(prev, prev_size, next);
                        }
                        let total = self.as_ref().total_free_bytes() - size;
                        self.leaf_header_mut().set_total_free_bytes(total as u16);
                    }
                    Some(cell_offset)
                }
                None => None,
            }
        } else {
            None
        };

        let cell_offset = match cell_offset {
            Some(offset) => offset,
            None => {
                let mut gap = self.as_ref().alloc_gap();
                if gap < need + CELL_POINTER_SIZE {
                    let reclaimable = self.as_ref().total_free_bytes() + gap;
                    ensure!(
                        reclaimable >= need + CELL_POINTER_SIZE,
                        "leaf cannot fit {} bytes (gap {}, free {})",
                        need,
                        gap,
                        self.as_ref().total_free_bytes()
                    );
                    self.compact()?;
                    gap = self.as_ref().alloc_gap();
                    ensure!(
                        gap >= need + CELL_POINTER_SIZE,
                        StorageError::CorruptPage(
                            "compaction reclaimed less space than accounted".into()
                        )
                    );
                }
                let offset = self.as_ref().alloc_ptr() - need;
                self.leaf_header_mut().set_alloc_ptr(offset as u16);
                offset
            }
        };

        self.data[cell_offset..cell_offset + need].copy_from_slice(cell);

        for i in (index..num_cells).rev() {
            let src = LEAF_CONTENT_START + i * CELL_POINTER_SIZE;
            let dst = src + CELL_POINTER_SIZE;
            self.data.copy_within(src..src + CELL_POINTER_SIZE, dst);
        }
        let at = LEAF_CONTENT_START + index * CELL_POINTER_SIZE;
        self.data[at..at + 4].copy_from_slice(&(cell_offset as u32).to_le_bytes());
        self.leaf_header_mut().set_num_cells(num_cells as u16 + 1);

        Ok(())
    }

    /// Removes the cell at `index`, pushing its region onto the free list.
    /// Compacts when the fragmentation threshold is crossed on an
    /// under-half-full leaf.
    pub fn delete_cell(&mut self, index: usize) -> Result<()> {
        let num_cells = self.num_cells();
        ensure!(
            index < num_cells,
            "delete index {} out of bounds (num_cells={})",
            index,
            num_cells
        );

        let offset = self.as_ref().cell_ptr(index)?;
        let size = cell_size(&self.data[offset..])?;

        for i in index..num_cells - 1 {
            let src = LEAF_CONTENT_START + (i + 1) * CELL_POINTER_SIZE;
            let dst = LEAF_CONTENT_START + i * CELL_POINTER_SIZE;
            self.data.copy_within(src..src + CELL_POINTER_SIZE, dst);
        }
        self.leaf_header_mut().set_num_cells(num_cells as u16 - 1);

        let head = self.as_ref().free_list_head();
        self.write_block(offset, size, head);
        self.leaf_header_mut().set_free_list_head(offset as u16);
        let total = self.as_ref().total_free_bytes() + size;
        self.leaf_header_mut().set_total_free_bytes(total as u16);

        if self.should_compact()? {
            self.compact()?;
        }
        Ok(())
    }

    fn should_compact(&self) -> Result<bool> {
        let view = self.as_ref();
        Ok(view.total_free_bytes() > COMPACTION_THRESHOLD
            && view.payload_bytes()? < LEAF_CAPACITY / 2)
    }

    /// Rewrites all live cells contiguously against the page end, clearing
    /// the free list. Idempotent.
    pub fn compact(&mut self) -> Result<()> {
        let num_cells = self.num_cells();
        let mut cells: Vec<Vec<u8>> = Vec::with_capacity(num_cells);
        for i in 0..num_cells {
            cells.push(self.as_ref().cell_at(i)?.to_vec());
        }

        let mut write_at = PAGE_SIZE;
        for (i, cell) in cells.iter().enumerate() {
            write_at -= cell.len();
            self.data[write_at..write_at + cell.len()].copy_from_slice(cell);
            let at = LEAF_CONTENT_START + i * CELL_POINTER_SIZE;
            self.data[at..at + 4].copy_from_slice(&(write_at as u32).to_le_bytes());
        }

        let header = self.leaf_header_mut();
        header.set_alloc_ptr(write_at as u16);
        header.set_free_list_head(0);
        header.set_total_free_bytes(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::make_cell;

    fn make_page() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    fn cell(key: i32, len: usize) -> Vec<u8> {
        make_cell(key, &vec![key as u8; len])
    }

    fn insert_sorted(leaf: &mut LeafNodeMut<'_>, key: i32, len: usize) {
        let pos = match leaf.find_key(key).unwrap() {
            SearchResult::Found(_) => panic!("duplicate key {} in test setup", key),
            SearchResult::NotFound(pos) => pos,
        };
        leaf.insert_cell(pos, &cell(key, len)).unwrap();
    }

    #[test]
    fn init_produces_empty_leaf() {
        let mut page = make_page();
        let leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        let view = leaf.as_ref();

        assert_eq!(view.num_cells(), 0);
        assert_eq!(view.alloc_ptr(), PAGE_SIZE);
        assert_eq!(view.total_free_bytes(), 0);
        assert!(view.is_root());
    }

    #[test]
    fn from_page_rejects_non_leaf() {
        let page = make_page();
        let result = LeafNode::from_page(&page);

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::CorruptPage(_))
        ));
    }

    #[test]
    fn cells_stay_sorted_by_key() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();

        for key in [30, 10, 20, 5, 25] {
            insert_sorted(&mut leaf, key, 16);
        }

        let view = leaf.as_ref();
        let keys: Vec<i32> = (0..view.num_cells())
            .map(|i| view.key_at(i).unwrap())
            .collect();
        assert_eq!(keys, vec![5, 10, 20, 25, 30]);
    }

    #[test]
    fn find_key_hits_and_misses() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in [10, 20, 30] {
            insert_sorted(&mut leaf, key, 8);
        }

        assert_eq!(leaf.find_key(10).unwrap(), SearchResult::Found(0));
        assert_eq!(leaf.find_key(30).unwrap(), SearchResult::Found(2));
        assert_eq!(leaf.find_key(5).unwrap(), SearchResult::NotFound(0));
        assert_eq!(leaf.find_key(25).unwrap(), SearchResult::NotFound(2));
        assert_eq!(leaf.find_key(99).unwrap(), SearchResult::NotFound(3));
    }

    #[test]
    fn delete_pushes_region_onto_free_list() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in [1, 2, 3] {
            insert_sorted(&mut leaf, key, 32);
        }
        let freed_size = cell(2, 32).len();

        leaf.delete_cell(1).unwrap();

        let view = leaf.as_ref();
        assert_eq!(view.num_cells(), 2);
        assert_eq!(view.total_free_bytes(), freed_size);
        assert_eq!(view.free_blocks().unwrap().len(), 1);
        assert_eq!(view.key_at(0).unwrap(), 1);
        assert_eq!(view.key_at(1).unwrap(), 3);
    }

    #[test]
    fn insert_reuses_free_list_block() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in [1, 2, 3] {
            insert_sorted(&mut leaf, key, 64);
        }
        leaf.delete_cell(1).unwrap();
        let alloc_before = leaf.as_ref().alloc_ptr();

        // Same size as the freed cell: the block is consumed whole.
        insert_sorted(&mut leaf, 2, 64);

        let view = leaf.as_ref();
        assert_eq!(view.alloc_ptr(), alloc_before);
        assert_eq!(view.total_free_bytes(), 0);
        assert!(view.free_blocks().unwrap().is_empty());
    }

    #[test]
    fn free_block_residual_stays_listed() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in [1, 2, 3] {
            insert_sorted(&mut leaf, key, 100);
        }
        let big = cell(2, 100).len();
        leaf.delete_cell(1).unwrap();

        let small = cell(2, 40).len();
        insert_sorted(&mut leaf, 2, 40);

        let view = leaf.as_ref();
        let blocks = view.free_blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].1, big - small);
        assert_eq!(view.total_free_bytes(), big - small);
    }

    #[test]
    fn tiny_residual_is_dropped_from_list() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in [1, 2, 3] {
            insert_sorted(&mut leaf, key, 50);
        }
        leaf.delete_cell(1).unwrap();

        // 4 bytes smaller: residual under MIN_FREE_BLOCK leaks until
        // compaction.
        insert_sorted(&mut leaf, 2, 46);

        let view = leaf.as_ref();
        assert!(view.free_blocks().unwrap().is_empty());
        assert_eq!(view.total_free_bytes(), 0);
    }

    #[test]
    fn compaction_is_idempotent() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in 0..20 {
            insert_sorted(&mut leaf, key, 40);
        }
        for _ in 0..5 {
            leaf.delete_cell(3).unwrap();
        }

        leaf.compact().unwrap();
        let once = page.clone();

        let mut leaf = LeafNodeMut::from_page(&mut page).unwrap();
        leaf.compact().unwrap();

        assert_eq!(page, once);
    }

    #[test]
    fn compaction_resets_free_accounting() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in 0..10 {
            insert_sorted(&mut leaf, key, 60);
        }
        leaf.delete_cell(0).unwrap();
        leaf.delete_cell(0).unwrap();

        leaf.compact().unwrap();

        let view = leaf.as_ref();
        assert_eq!(view.total_free_bytes(), 0);
        assert_eq!(view.free_list_head(), 0);
        assert_eq!(
            view.alloc_ptr(),
            PAGE_SIZE - view.payload_bytes().unwrap() + view.num_cells() * CELL_POINTER_SIZE
        );
    }

    #[test]
    fn insert_compacts_when_gap_fragmented() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();

        // Fill the page with 30 cells of 128 bytes.
        let mut key = 0;
        while leaf.can_fit(cell(key, 120).len()).unwrap() {
            insert_sorted(&mut leaf, key, 120);
            key += 1;
        }
        // Free two non-adjacent small cells, then ask for one bigger than
        // any single block but smaller than the combined free space.
        leaf.delete_cell(0).unwrap();
        leaf.delete_cell(3).unwrap();

        let need = cell(1000, 180).len();
        assert!(leaf.can_fit(need).unwrap());
        insert_sorted(&mut leaf, 1000, 180);

        let last = leaf.num_cells() - 1;
        assert_eq!(leaf.find_key(1000).unwrap(), SearchResult::Found(last));
    }

    #[test]
    fn oversized_cell_rejected() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();

        let result = leaf.insert_cell(0, &vec![0u8; MAX_CELL_SIZE + 1]);

        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::TooLarge { .. })
        ));
    }

    #[test]
    fn payload_and_free_accounting_cover_the_page() {
        let mut page = make_page();
        let mut leaf = LeafNodeMut::init(&mut page, true, 0).unwrap();
        for key in 0..12 {
            insert_sorted(&mut leaf, key, 80);
        }
        leaf.delete_cell(2).unwrap();
        leaf.delete_cell(7).unwrap();

        let view = leaf.as_ref();
        let free: usize = view.free_blocks().unwrap().iter().map(|&(_, s)| s).sum();
        assert_eq!(free, view.total_free_bytes());
    }
}
