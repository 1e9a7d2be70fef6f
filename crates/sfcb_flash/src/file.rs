//! File-backed flash image.

use crate::error::FlashResult;
use crate::flash::{check_alignment, check_bounds, FlashArea, ERASED_BYTE};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A flash image stored in a regular file.
///
/// The file holds the raw content of the area, byte for byte, so an image
/// can be dumped from a device or flashed back onto one. Programming
/// follows NOR semantics (bits are only cleared) and erase writes `0xFF`.
///
/// # Durability
///
/// Every write and erase is followed by `File::flush()`. Call
/// [`FileFlash::sync`] to force the data to disk.
///
/// # Thread Safety
///
/// This device is thread-safe and can be shared across threads.
/// Internal locking serializes file access.
///
/// # Example
///
/// ```no_run
/// use sfcb_flash::{FileFlash, FlashArea};
/// use std::path::Path;
///
/// let flash = FileFlash::create(Path::new("flash.img"), 16 * 1024, 4).unwrap();
/// flash.write(0, &[0x12, 0x34, 0x56, 0x78]).unwrap();
/// flash.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: RwLock<File>,
    size: u32,
    align: u32,
}

impl FileFlash {
    /// Creates a new image of `size` erased bytes, replacing any existing
    /// file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn create(path: &Path, size: u32, align: u32) -> FlashResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(&vec![ERASED_BYTE; size as usize])?;
        file.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size,
            align: align.max(1),
        })
    }

    /// Opens an existing image. The area size is the file length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path, align: u32) -> FlashResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let size = u32::try_from(len).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("flash image of {len} bytes exceeds the 32-bit address space"),
            )
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size,
            align: align.max(1),
        })
    }

    /// Returns the path to the image file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the image to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> FlashResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }
}

impl FlashArea for FileFlash {
    fn read(&self, offset: u32, buf: &mut [u8]) -> FlashResult<()> {
        check_bounds(offset, buf.len(), self.size)?;
        if buf.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&self, offset: u32, data: &[u8]) -> FlashResult<()> {
        check_bounds(offset, data.len(), self.size)?;
        check_alignment(offset, data.len(), self.align)?;
        if data.is_empty() {
            return Ok(());
        }

        let mut file = self.file.write();
        let mut current = vec![0u8; data.len()];
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.read_exact(&mut current)?;
        for (cell, byte) in current.iter_mut().zip(data) {
            *cell &= *byte;
        }

        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.write_all(&current)?;
        file.flush()?;
        Ok(())
    }

    fn erase(&self, offset: u32, len: u32) -> FlashResult<()> {
        check_bounds(offset, len as usize, self.size)?;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.write_all(&vec![ERASED_BYTE; len as usize])?;
        file.flush()?;
        Ok(())
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn align(&self) -> u32 {
        self.align
    }
}
