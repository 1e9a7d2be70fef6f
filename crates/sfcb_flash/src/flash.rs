//! Flash area trait definition.

use crate::error::{FlashError, FlashResult};

/// Value of every byte of freshly erased flash.
pub const ERASED_BYTE: u8 = 0xFF;

/// A byte-addressable flash area.
///
/// Offsets are relative to the start of the area. The area has no notion of
/// the store's sectors; the caller supplies the erase geometry and is
/// responsible for erasing whole erase units.
///
/// # Invariants
///
/// - `read` returns what was last programmed, or `0xFF` for erased bytes
/// - `write` only clears bits; writing over programmed data ANDs it
/// - `erase` restores `0xFF` over the whole range
/// - Implementations must be `Send + Sync`; lookups read concurrently with
///   a single writer
///
/// # Implementors
///
/// - [`super::RamFlash`] - For tests
/// - [`super::FileFlash`] - For flash images on disk
pub trait FlashArea: Send + Sync {
    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range leaves the area or the device fails.
    fn read(&self, offset: u32, buf: &mut [u8]) -> FlashResult<()>;

    /// Programs `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The range leaves the area
    /// - `offset` or `data.len()` is not a multiple of [`FlashArea::align`]
    /// - The device fails
    fn write(&self, offset: u32, data: &[u8]) -> FlashResult<()>;

    /// Erases `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range leaves the area or the device fails.
    fn erase(&self, offset: u32, len: u32) -> FlashResult<()>;

    /// Returns the size of the area in bytes.
    fn size(&self) -> u32;

    /// Returns the write block size (minimum program granularity) in bytes.
    fn align(&self) -> u32;
}

impl<T: FlashArea + ?Sized> FlashArea for std::sync::Arc<T> {
    fn read(&self, offset: u32, buf: &mut [u8]) -> FlashResult<()> {
        (**self).read(offset, buf)
    }

    fn write(&self, offset: u32, data: &[u8]) -> FlashResult<()> {
        (**self).write(offset, data)
    }

    fn erase(&self, offset: u32, len: u32) -> FlashResult<()> {
        (**self).erase(offset, len)
    }

    fn size(&self) -> u32 {
        (**self).size()
    }

    fn align(&self) -> u32 {
        (**self).align()
    }
}

/// Checks that `offset..offset + len` lies inside an area of `size` bytes.
pub(crate) fn check_bounds(offset: u32, len: usize, size: u32) -> FlashResult<()> {
    let end = u64::from(offset) + len as u64;
    if end > u64::from(size) {
        return Err(FlashError::OutOfBounds { offset, len, size });
    }
    Ok(())
}

/// Checks that a program operation respects the write block size.
pub(crate) fn check_alignment(offset: u32, len: usize, align: u32) -> FlashResult<()> {
    if align > 1 && (offset % align != 0 || len % align as usize != 0) {
        return Err(FlashError::Misaligned { offset, len, align });
    }
    Ok(())
}
