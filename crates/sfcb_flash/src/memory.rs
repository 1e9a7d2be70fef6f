//! In-memory flash simulator.

use crate::error::{FlashError, FlashResult};
use crate::flash::{check_alignment, check_bounds, FlashArea, ERASED_BYTE};
use parking_lot::RwLock;

/// An in-memory NOR flash simulator.
///
/// The simulator is suitable for:
/// - Unit and integration tests
/// - Host tooling that manipulates flash images in memory
///
/// It models NOR semantics: erase units reset to `0xFF`, programming ANDs
/// the new bytes into the old ones, and writes must respect the write block
/// size. Erase counts are tracked per erase unit so wear can be inspected.
///
/// # Thread Safety
///
/// This device is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use sfcb_flash::{FlashArea, RamFlash};
///
/// let flash = RamFlash::new(1024, 2, 1);
/// assert_eq!(flash.size(), 2048);
/// flash.write(10, &[0x0F]).unwrap();
/// flash.write(10, &[0xF1]).unwrap();
/// assert_eq!(flash.data()[10], 0x01);
/// ```
#[derive(Debug)]
pub struct RamFlash {
    data: RwLock<Vec<u8>>,
    erase_counts: RwLock<Vec<u32>>,
    erase_size: u32,
    align: u32,
}

impl RamFlash {
    /// Creates a fully erased device of `erase_count` units of
    /// `erase_size` bytes with the given write block size.
    #[must_use]
    pub fn new(erase_size: u32, erase_count: u32, align: u32) -> Self {
        let size = erase_size as usize * erase_count as usize;
        Self {
            data: RwLock::new(vec![ERASED_BYTE; size]),
            erase_counts: RwLock::new(vec![0; erase_count as usize]),
            erase_size,
            align: align.max(1),
        }
    }

    /// Creates a device with pre-existing content.
    ///
    /// Useful for testing recovery scenarios. The length of `data` must be a
    /// multiple of `erase_size`.
    #[must_use]
    pub fn with_data(data: Vec<u8>, erase_size: u32, align: u32) -> Self {
        let units = data.len() / erase_size.max(1) as usize;
        Self {
            data: RwLock::new(data),
            erase_counts: RwLock::new(vec![0; units]),
            erase_size,
            align: align.max(1),
        }
    }

    /// Returns a copy of the whole device content.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Returns how many times each erase unit has been erased.
    #[must_use]
    pub fn erase_counts(&self) -> Vec<u32> {
        self.erase_counts.read().clone()
    }

    /// Overwrites bytes without NOR semantics or alignment checks.
    ///
    /// Intended for corrupting images in tests.
    ///
    /// # Panics
    ///
    /// Panics if the range is outside the device.
    pub fn poke(&self, offset: u32, bytes: &[u8]) {
        let start = offset as usize;
        self.data.write()[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl FlashArea for RamFlash {
    fn read(&self, offset: u32, buf: &mut [u8]) -> FlashResult<()> {
        let data = self.data.read();
        check_bounds(offset, buf.len(), data.len() as u32)?;
        let start = offset as usize;
        buf.copy_from_slice(&data[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, offset: u32, bytes: &[u8]) -> FlashResult<()> {
        let mut data = self.data.write();
        check_bounds(offset, bytes.len(), data.len() as u32)?;
        check_alignment(offset, bytes.len(), self.align)?;
        let start = offset as usize;
        for (cell, byte) in data[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }

    fn erase(&self, offset: u32, len: u32) -> FlashResult<()> {
        let mut data = self.data.write();
        check_bounds(offset, len as usize, data.len() as u32)?;
        if offset % self.erase_size != 0 || len % self.erase_size != 0 {
            return Err(FlashError::Misaligned {
                offset,
                len: len as usize,
                align: self.erase_size,
            });
        }

        let start = offset as usize;
        data[start..start + len as usize].fill(ERASED_BYTE);

        let mut counts = self.erase_counts.write();
        let first = (offset / self.erase_size) as usize;
        let units = (len / self.erase_size) as usize;
        for count in counts.iter_mut().skip(first).take(units) {
            *count += 1;
        }
        Ok(())
    }

    fn size(&self) -> u32 {
        self.data.read().len() as u32
    }

    fn align(&self) -> u32 {
        self.align
    }
}
