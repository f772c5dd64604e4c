//! # Database File Wrapper
//!
//! `DbFile` owns the backing file and the OS-level exclusive lock on it.
//! It reads and writes whole pages at page-aligned offsets and knows
//! nothing about what the pages contain.
//!
//! ## Locking
//!
//! The lock is an advisory `flock(LOCK_EX | LOCK_NB)` taken at open and
//! held until the file is closed. Multiple processes may open the file,
//! but only one obtains the lock; the others fail fast instead of
//! corrupting each other's writes. The filesystem must support advisory
//! exclusive locks.
//!
//! ## Failure Model
//!
//! Read and write errors are fatal: they propagate to the caller with the
//! path and page number attached, and nothing is retried. A file whose
//! length is not a whole number of pages is reported as corrupt before any
//! page is served.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use eyre::{bail, ensure, Result, WrapErr};

use crate::errors::StorageError;

use super::PAGE_SIZE;

#[derive(Debug)]
pub struct DbFile {
    file: File,
    path: PathBuf,
}

impl DbFile {
    /// Opens (creating if absent) the database file and takes the
    /// exclusive lock. Fails if another process holds the lock.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        // SAFETY: flock on an owned, open fd is always memory-safe; the only
        // failure modes are reported through the return value. LOCK_NB makes
        // contention an immediate error instead of a hang.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                bail!(
                    "another process holds the lock on database file '{}'",
                    path.display()
                );
            }
            return Err(err).wrap_err_with(|| format!("failed to lock '{}'", path.display()));
        }

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        if len % PAGE_SIZE as u64 != 0 {
            bail!(StorageError::CorruptPage(format!(
                "database file '{}' size {} is not a multiple of page size {}",
                path.display(),
                len,
                PAGE_SIZE
            )));
        }

        Ok(Self { file, path })
    }

    /// Number of whole pages currently in the file.
    pub fn page_count(&self) -> Result<u32> {
        let len = self
            .file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    pub fn read_page(&self, page_num: u32, buf: &mut [u8]) -> Result<()> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "read buffer is {} bytes, expected {}",
            buf.len(),
            PAGE_SIZE
        );
        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file.read_exact_at(buf, offset).wrap_err_with(|| {
            format!(
                "failed to read page {} of '{}'",
                page_num,
                self.path.display()
            )
        })
    }

    pub fn write_page(&self, page_num: u32, buf: &[u8]) -> Result<()> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "write buffer is {} bytes, expected {}",
            buf.len(),
            PAGE_SIZE
        );
        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file.write_all_at(buf, offset).wrap_err_with(|| {
            format!(
                "failed to write page {} of '{}'",
                page_num,
                self.path.display()
            )
        })
    }

    /// Truncates the file down to `page_count` whole pages.
    pub fn truncate(&self, page_count: u32) -> Result<()> {
        let len = page_count as u64 * PAGE_SIZE as u64;
        self.file
            .set_len(len)
            .wrap_err_with(|| format!("failed to truncate '{}'", self.path.display()))
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .wrap_err_with(|| format!("failed to sync '{}'", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DbFile {
    fn drop(&mut self) {
        // SAFETY: unlocking an owned fd cannot fault; the kernel also
        // releases the lock when the fd closes, so failure is ignorable.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
