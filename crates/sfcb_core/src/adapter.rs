//! Sector-aware access to the flash area.
//!
//! Every access made by the store goes through [`SectorFlash`], which
//! refuses requests that would span two sectors before touching the device.

use crate::error::{SfcbError, SfcbResult};
use crate::layout::Layout;
use crate::record::CRC16;
use sfcb_flash::{FlashArea, ERASED_BYTE};

/// Chunk size used when streaming record bytes (CRC and relocation).
pub const MOVE_BLOCK_SIZE: u32 = 32;

/// A flash area bound to the store's sector layout.
#[derive(Debug)]
pub struct SectorFlash<F> {
    flash: F,
    layout: Layout,
}

impl<F: FlashArea> SectorFlash<F> {
    /// Binds `flash` to `layout`.
    pub fn new(flash: F, layout: Layout) -> Self {
        Self { flash, layout }
    }

    /// Returns the underlying device.
    pub fn device(&self) -> &F {
        &self.flash
    }

    /// Consumes the adapter and returns the device.
    pub fn into_device(self) -> F {
        self.flash
    }

    /// Returns the layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn check_range(&self, offset: u32, len: usize) -> SfcbResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| SfcbError::invalid_arguments(format!("access of {len} bytes")))?;
        let end = u64::from(offset) + u64::from(len);
        if end > u64::from(self.layout.area_size()) {
            return Err(SfcbError::invalid_arguments(format!(
                "access {offset:#x}+{len} leaves the {} byte area",
                self.layout.area_size()
            )));
        }
        if self.layout.crosses_sector(offset, len) {
            return Err(SfcbError::invalid_arguments(format!(
                "access {offset:#x}+{len} crosses a sector boundary"
            )));
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::InvalidArguments`] if the range spans two
    /// sectors or leaves the area, and [`SfcbError::Flash`] if the device
    /// fails.
    pub fn read(&self, offset: u32, buf: &mut [u8]) -> SfcbResult<()> {
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.flash.read(offset, buf)?;
        Ok(())
    }

    /// Programs `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`SectorFlash::read`], and [`SfcbError::InvalidArguments`]
    /// if `offset` or the length is not write-block aligned.
    pub fn write(&self, offset: u32, data: &[u8]) -> SfcbResult<()> {
        self.check_range(offset, data.len())?;
        let align = self.layout.write_block_size();
        if align > 1 && (offset % align != 0 || data.len() % align as usize != 0) {
            return Err(SfcbError::invalid_arguments(format!(
                "write {offset:#x}+{} is not aligned to {align} bytes",
                data.len()
            )));
        }
        if data.is_empty() {
            return Ok(());
        }
        self.flash.write(offset, data)?;
        Ok(())
    }

    /// Programs `data` at `offset`, padding the tail with `0xFF` up to the
    /// write block size.
    ///
    /// # Errors
    ///
    /// Same as [`SectorFlash::write`].
    pub fn write_padded(&self, offset: u32, data: &[u8]) -> SfcbResult<()> {
        let padded_len = self.layout.len_in_flash(data.len() as u32) as usize;
        if padded_len == data.len() {
            return self.write(offset, data);
        }
        let mut buf = vec![ERASED_BYTE; padded_len];
        buf[..data.len()].copy_from_slice(data);
        self.write(offset, &buf)
    }

    /// Erases `len` bytes at `offset`; both must be sector aligned.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::InvalidArguments`] for a partial sector and
    /// [`SfcbError::Flash`] if the device fails.
    pub fn erase(&self, offset: u32, len: u32) -> SfcbResult<()> {
        let end = u64::from(offset) + u64::from(len);
        if self.layout.sector_offset(offset) != 0
            || self.layout.sector_offset(len) != 0
            || end > u64::from(self.layout.area_size())
        {
            return Err(SfcbError::invalid_arguments(format!(
                "erase {offset:#x}+{len} is not a whole number of sectors"
            )));
        }
        self.flash.erase(offset, len)?;
        Ok(())
    }

    /// Erases sector `index`.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::Flash`] if the device fails.
    pub fn erase_sector(&self, index: u32) -> SfcbResult<()> {
        self.erase(self.layout.sector_addr(index), self.layout.sector_size())
    }

    /// Computes the CRC16 of `len` bytes at `offset`, reading in chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is invalid or a read fails.
    pub fn crc16(&self, offset: u32, len: u32) -> SfcbResult<u16> {
        self.check_range(offset, len as usize)?;
        let mut digest = CRC16.digest();
        let mut buf = [0u8; MOVE_BLOCK_SIZE as usize];
        let mut done = 0;
        while done < len {
            let chunk = (len - done).min(MOVE_BLOCK_SIZE) as usize;
            self.read(offset + done, &mut buf[..chunk])?;
            digest.update(&buf[..chunk]);
            done += chunk as u32;
        }
        Ok(digest.finalize())
    }

    /// Copies `len` bytes from `src` to `dst` in write-block aligned chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if either range is invalid or the device fails.
    pub fn copy(&self, src: u32, dst: u32, len: u32) -> SfcbResult<()> {
        let block = self.layout.len_in_flash(MOVE_BLOCK_SIZE);
        let mut buf = vec![0u8; block as usize];
        let mut done = 0;
        while done < len {
            let chunk = (len - done).min(block) as usize;
            self.read(src + done, &mut buf[..chunk])?;
            self.write(dst + done, &buf[..chunk])?;
            done += chunk as u32;
        }
        Ok(())
    }

    /// Returns true if any byte of sector `index` is programmed.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::Flash`] if a read fails.
    pub fn sector_is_used(&self, index: u32) -> SfcbResult<bool> {
        let base = self.layout.sector_addr(index);
        let mut buf = [0u8; 256];
        let mut done = 0;
        while done < self.layout.sector_size() {
            let chunk = (self.layout.sector_size() - done).min(buf.len() as u32) as usize;
            self.read(base + done, &mut buf[..chunk])?;
            if buf[..chunk].iter().any(|&b| b != ERASED_BYTE) {
                return Ok(true);
            }
            done += chunk as u32;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::compute_crc16;
    use sfcb_flash::RamFlash;
    use std::sync::Arc;

    fn adapter(wbs: u32) -> (Arc<RamFlash>, SectorFlash<Arc<RamFlash>>) {
        let flash = Arc::new(RamFlash::new(256, 4, wbs));
        let adapter = SectorFlash::new(Arc::clone(&flash), Layout::new(256, 4, wbs));
        (flash, adapter)
    }

    #[test]
    fn cross_sector_read_rejected_without_io() {
        let (_, adapter) = adapter(4);
        let mut buf = [0x11u8; 8];
        let result = adapter.read(252, &mut buf);
        assert!(matches!(result, Err(SfcbError::InvalidArguments { .. })));
        assert_eq!(buf, [0x11; 8]);
    }

    #[test]
    fn cross_sector_write_rejected_without_io() {
        let (flash, adapter) = adapter(4);
        let result = adapter.write(252, &[0u8; 8]);
        assert!(matches!(result, Err(SfcbError::InvalidArguments { .. })));
        assert!(flash.data().iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn misaligned_write_rejected() {
        let (_, adapter) = adapter(4);
        assert!(matches!(
            adapter.write(2, &[0u8; 4]),
            Err(SfcbError::InvalidArguments { .. })
        ));
        assert!(adapter.write(4, &[0u8; 3]).is_err());
    }

    #[test]
    fn read_past_area_rejected() {
        let (_, adapter) = adapter(1);
        let mut buf = [0u8; 4];
        assert!(adapter.read(1024, &mut buf).is_err());
    }

    #[test]
    fn write_padded_fills_with_erased_bytes() {
        let (flash, adapter) = adapter(8);
        adapter.write_padded(16, &[1, 2, 3]).unwrap();
        assert_eq!(&flash.data()[16..24], &[1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn crc_over_chunks() {
        let (_, adapter) = adapter(1);
        let payload: Vec<u8> = (0..100u8).collect();
        adapter.write(40, &payload).unwrap();
        assert_eq!(adapter.crc16(40, 100).unwrap(), compute_crc16(&payload));
    }

    #[test]
    fn copy_moves_bytes_between_sectors() {
        let (flash, adapter) = adapter(4);
        let payload: Vec<u8> = (0..72u8).collect();
        adapter.write(8, &payload).unwrap();
        adapter.copy(8, 256 + 8, 72).unwrap();
        assert_eq!(&flash.data()[264..336], payload.as_slice());
    }

    #[test]
    fn erase_sector_and_usage() {
        let (_, adapter) = adapter(4);
        assert!(!adapter.sector_is_used(1).unwrap());
        adapter.write(256 + 200, &[0u8; 4]).unwrap();
        assert!(adapter.sector_is_used(1).unwrap());
        adapter.erase_sector(1).unwrap();
        assert!(!adapter.sector_is_used(1).unwrap());
    }

    #[test]
    fn partial_erase_rejected() {
        let (_, adapter) = adapter(4);
        assert!(matches!(
            adapter.erase(16, 256),
            Err(SfcbError::InvalidArguments { .. })
        ));
    }
}
