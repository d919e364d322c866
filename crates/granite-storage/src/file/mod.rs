//! Disk manager: synchronous page-granular file I/O.
//!
//! The disk manager owns the database file and offers exactly two data
//! operations: read a page slot and write a page slot. Pages are addressed by
//! `page_id * PAGE_SIZE`. A `Mutex` serializes file access; callers hold no
//! other I/O path into the file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;

use granite_common::constants::PAGE_SIZE;
use granite_common::types::PageId;

/// Result type for disk operations.
pub type DiskResult<T> = Result<T, DiskError>;

/// Errors that can occur during disk I/O.
#[derive(Debug, Error)]
pub enum DiskError {
    /// I/O error from the underlying file.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: std::io::Error,
    },

    /// Operation on an invalid page ID.
    #[error("invalid page ID: {page_id}")]
    InvalidPageId {
        /// The offending page id.
        page_id: PageId,
    },
}

/// The disk manager handles all reads and writes of database pages.
pub struct DiskManager {
    /// The database file, serialized behind a mutex.
    db_file: Mutex<File>,
    /// Path of the database file.
    path: PathBuf,
}

impl DiskManager {
    /// Opens (creating if necessary) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> DiskResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self {
            db_file: Mutex::new(file),
            path,
        })
    }

    /// Returns the path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the page slot for `page_id` into `buf`.
    ///
    /// A read past the end of the file, or a short read, zero-fills the
    /// remainder: a page that was allocated but never flushed reads back as
    /// zeroes.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> DiskResult<()> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId { page_id });
        }
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        let offset = page_offset(page_id);
        let mut file = self.db_file.lock();

        let file_len = file.metadata()?.len();
        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            match file.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read < buf.len() {
            buf[read..].fill(0);
        }
        Ok(())
    }

    /// Writes `buf` to the page slot for `page_id` and flushes the file.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> DiskResult<()> {
        if !page_id.is_valid() {
            return Err(DiskError::InvalidPageId { page_id });
        }
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        let offset = page_offset(page_id);
        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()?;
        Ok(())
    }

    /// Flushes any buffered file state to the OS.
    pub fn sync(&self) -> DiskResult<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }

    /// Returns the current size of the database file in bytes.
    pub fn file_size(&self) -> DiskResult<u64> {
        Ok(self.db_file.lock().metadata()?.len())
    }
}

impl std::fmt::Debug for DiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskManager").field("path", &self.path).finish()
    }
}

/// Byte offset of a page slot in the database file.
#[inline]
fn page_offset(page_id: PageId) -> u64 {
    page_id.as_u32() as u64 * PAGE_SIZE as u64
}
