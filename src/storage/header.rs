//! # File Header
//!
//! Page 0 of every database file begins with a fixed 100-byte header. Only
//! the first 24 bytes carry data today; the rest is reserved zeros and the
//! remainder of the page is unused.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----------------------------------------------
//! 0       16    magic: b"learndb v1" + NUL padding
//! 16      4     free-page-list head (0 = empty)
//! 20      4     catalog root page number (always 1)
//! 24      76    reserved zeros
//! ```
//!
//! All multi-byte fields are little-endian, read and written through
//! zerocopy so the struct layout *is* the on-disk layout.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::StorageError;
use crate::storage::CATALOG_ROOT_PAGE;

pub const MAGIC: &[u8; 16] = b"learndb v1\0\0\0\0\0\0";
pub const FILE_HEADER_SIZE: usize = 100;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FileHeader {
    magic: [u8; 16],
    free_list_head: U32,
    catalog_root: U32,
    reserved: [u8; 76],
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    pub fn new() -> Self {
        Self {
            magic: *MAGIC,
            free_list_head: U32::new(0),
            catalog_root: U32::new(CATALOG_ROOT_PAGE),
            reserved: [0u8; 76],
        }
    }

    /// Parses and sanity-checks the header from the start of page 0.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            data.len(),
            FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&data[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))?;

        if &header.magic != MAGIC {
            eyre::bail!(StorageError::CorruptPage(
                "file header magic mismatch; not a learndb v1 database".into()
            ));
        }
        if header.catalog_root.get() != CATALOG_ROOT_PAGE {
            eyre::bail!(StorageError::CorruptPage(format!(
                "file header names catalog root page {}, expected {}",
                header.catalog_root.get(),
                CATALOG_ROOT_PAGE
            )));
        }

        Ok(header)
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            data.len(),
            FILE_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse FileHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= FILE_HEADER_SIZE,
            "buffer too small for FileHeader: {} < {}",
            data.len(),
            FILE_HEADER_SIZE
        );

        data[..FILE_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn free_list_head(&self) -> u32 {
        self.free_list_head.get()
    }

    pub fn set_free_list_head(&mut self, page_num: u32) {
        self.free_list_head = U32::new(page_num);
    }

    pub fn catalog_root(&self) -> u32 {
        self.catalog_root.get()
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_size_is_100_bytes() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 100);
    }

    #[test]
    fn new_header_round_trips() {
        let header = FileHeader::new();
        let mut page = [0u8; 256];

        header.write_to(&mut page).unwrap();
        let read = FileHeader::from_bytes(&page).unwrap();

        assert_eq!(read.free_list_head(), 0);
        assert_eq!(read.catalog_root(), CATALOG_ROOT_PAGE);
    }

    #[test]
    fn bad_magic_is_corrupt_page() {
        let mut page = [0u8; 256];
        FileHeader::new().write_to(&mut page).unwrap();
        page[0] = b'X';

        let result = FileHeader::from_bytes(&page);

        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err().downcast_ref::<StorageError>(),
            Some(StorageError::CorruptPage(_))
        ));
    }

    #[test]
    fn free_list_head_is_mutable_in_place() {
        let mut page = [0u8; 256];
        FileHeader::new().write_to(&mut page).unwrap();

        FileHeader::from_bytes_mut(&mut page)
            .unwrap()
            .set_free_list_head(42);

        assert_eq!(FileHeader::from_bytes(&page).unwrap().free_list_head(), 42);
    }
}
