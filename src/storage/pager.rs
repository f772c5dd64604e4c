//! # Pager
//!
//! The pager turns the database file into a map from page number to a
//! cached, mutable page buffer. It owns every buffer for the process
//! lifetime; the tree only ever borrows.
//!
//! ## Page Allocation
//!
//! Free pages come from three sources, tried in order:
//!
//! 1. the in-memory list of pages returned during this session,
//! 2. the on-disk free-page list persisted by a previous session,
//! 3. the end of the file (growing it by one zero page).
//!
//! The on-disk free-page list is a singly-linked list threaded through the
//! free pages themselves: bytes 0..4 of a free page hold the next free page
//! number (0 terminates), and the list head lives in the file header.
//!
//! ## Close Protocol
//!
//! ```text
//! 1. Trim returned pages that sit at the end of the file (truncate).
//! 2. Chain the remaining returned pages onto the on-disk free list.
//! 3. Write the file header with the new free-list head.
//! 4. Flush every cached page, truncate, sync, release the lock.
//! ```
//!
//! Trailing free pages are therefore given back to the filesystem while
//! interior holes stay tracked for reuse, so dropping and recreating a
//! table converges to the same file size instead of growing forever.

use eyre::{ensure, Result};
use hashbrown::HashMap;
use tracing::debug;

use super::{DbFile, FileHeader, NULL_PAGE, PAGE_SIZE};

type PageBuf = Box<[u8; PAGE_SIZE]>;

fn zeroed_page() -> PageBuf {
    Box::new([0u8; PAGE_SIZE])
}

#[derive(Debug)]
pub struct Pager {
    file: DbFile,
    pages: HashMap<u32, PageBuf>,
    /// Pages the file logically contains, including any grown this session.
    num_pages: u32,
    /// Pages the file physically contained at open time.
    num_pages_on_disk: u32,
    /// Pages returned by the tree this session, candidates for reuse.
    returned_pages: Vec<u32>,
    /// Head of the on-disk free-page list loaded from the file header.
    free_list_head: u32,
}

impl Pager {
    /// Opens the backing file (taking its exclusive lock). A brand-new
    /// file is stamped with a file header on page 0 and room for the
    /// catalog root on page 1.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let file = DbFile::open(path)?;
        let num_pages_on_disk = file.page_count()?;

        let mut pager = Self {
            file,
            pages: HashMap::new(),
            num_pages: num_pages_on_disk,
            num_pages_on_disk,
            returned_pages: Vec::new(),
            free_list_head: NULL_PAGE,
        };

        if num_pages_on_disk == 0 {
            let header_page = pager.page_mut(0)?;
            FileHeader::new().write_to(header_page)?;
            // Reserve page 1 for the catalog root; the tree initializes it.
            pager.page_mut(1)?;
            debug!(path = %pager.file.path().display(), "created new database file");
        } else {
            let header_page = pager.page(0)?;
            let header = FileHeader::from_bytes(header_page)?;
            pager.free_list_head = header.free_list_head();
            debug!(
                path = %pager.file.path().display(),
                pages = num_pages_on_disk,
                free_head = pager.free_list_head,
                "opened database file"
            );
        }

        Ok(pager)
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Loads `page_num` into the cache if it is not already there.
    /// Requesting exactly `num_pages` grows the file by one zero page.
    fn ensure_cached(&mut self, page_num: u32) -> Result<()> {
        ensure!(
            page_num <= self.num_pages,
            "page {} out of bounds (num_pages={})",
            page_num,
            self.num_pages
        );

        if self.pages.contains_key(&page_num) {
            return Ok(());
        }

        let mut buf = zeroed_page();
        if page_num < self.num_pages_on_disk {
            self.file.read_page(page_num, buf.as_mut_slice())?;
        }
        self.pages.insert(page_num, buf);

        if page_num == self.num_pages {
            self.num_pages += 1;
        }
        Ok(())
    }

    pub fn page(&mut self, page_num: u32) -> Result<&[u8]> {
        self.ensure_cached(page_num)?;
        Ok(self.pages[&page_num].as_slice())
    }

    pub fn page_mut(&mut self, page_num: u32) -> Result<&mut [u8]> {
        self.ensure_cached(page_num)?;
        Ok(self
            .pages
            .get_mut(&page_num)
            .expect("page cached by ensure_cached")
            .as_mut_slice())
    }

    /// Hands out a page for a new node: a page returned this session, else
    /// the head of the on-disk free list, else a fresh page at the end of
    /// the file. The buffer may hold stale content; callers initialize it.
    pub fn allocate_page(&mut self) -> Result<u32> {
        if let Some(page_num) = self.returned_pages.pop() {
            debug!(page = page_num, "reusing returned page");
            return Ok(page_num);
        }

        if self.free_list_head != NULL_PAGE {
            let head = self.free_list_head;
            let page = self.page(head)?;
            let next = u32::from_le_bytes(page[0..4].try_into().expect("4-byte slice"));
            self.free_list_head = next;
            debug!(page = head, next_head = next, "popped on-disk free page");
            return Ok(head);
        }

        let page_num = self.num_pages;
        self.ensure_cached(page_num)?;
        Ok(page_num)
    }

    /// Returns `page_num` to the pager for recycling.
    pub fn return_page(&mut self, page_num: u32) {
        debug_assert!(
            !self.returned_pages.contains(&page_num),
            "page {} returned twice",
            page_num
        );
        debug!(page = page_num, "page returned to pager");
        self.returned_pages.push(page_num);
    }

    /// Walks the on-disk free-page list (plus this session's returned
    /// pages). Used by validation and page-accounting checks.
    pub fn free_pages(&mut self) -> Result<Vec<u32>> {
        let mut free = self.returned_pages.clone();
        let mut head = self.free_list_head;
        while head != NULL_PAGE {
            free.push(head);
            let page = self.page(head)?;
            head = u32::from_le_bytes(page[0..4].try_into().expect("4-byte slice"));
        }
        Ok(free)
    }

    /// Flushes everything and releases the file lock. Trailing returned
    /// pages are truncated off; the rest are chained into the on-disk
    /// free-page list whose head is stored in the file header.
    pub fn close(mut self) -> Result<()> {
        self.returned_pages.sort_unstable();
        while let Some(&last) = self.returned_pages.last() {
            if last + 1 != self.num_pages {
                break;
            }
            self.returned_pages.pop();
            self.pages.remove(&last);
            self.num_pages -= 1;
        }

        let mut head = self.free_list_head;
        while let Some(page_num) = self.returned_pages.pop() {
            let page = self.page_mut(page_num)?;
            page[0..4].copy_from_slice(&head.to_le_bytes());
            head = page_num;
        }

        let mut header = FileHeader::new();
        header.set_free_list_head(head);
        header.write_to(self.page_mut(0)?)?;

        for (&page_num, buf) in self.pages.iter() {
            if page_num < self.num_pages {
                self.file.write_page(page_num, buf.as_slice())?;
            }
        }
        self.file.truncate(self.num_pages)?;
        self.file.sync()?;
        debug!(pages = self.num_pages, free_head = head, "database closed");
        Ok(())
    }
}
