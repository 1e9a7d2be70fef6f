//! Addressing and padding arithmetic.
//!
//! All functions here are pure. Addresses are offsets into the flash area;
//! sector `i` spans `i * sector_size .. (i + 1) * sector_size`.
//!
//! ```text
//! sector:  | sector header | record | record | ... | end marker / erased |
//! record:  | data header | payload (padded) | seal |
//! ```
//!
//! Every structure is padded to the write block size on its own, so the
//! footprint of a record is the sum of three independently aligned parts.

use crate::record::{DATA_HEADER_SIZE, SEAL_SIZE, SECTOR_HEADER_SIZE};
use crate::types::Entry;

/// Sector geometry and write granularity of a mounted store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    sector_size: u32,
    sector_count: u32,
    write_block_size: u32,
}

impl Layout {
    /// Creates a layout. The values are not validated here; see
    /// [`crate::SfcbConfig::validate`].
    #[must_use]
    pub const fn new(sector_size: u32, sector_count: u32, write_block_size: u32) -> Self {
        Self {
            sector_size,
            sector_count,
            write_block_size,
        }
    }

    /// Size of one sector.
    #[must_use]
    pub const fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Number of sectors.
    #[must_use]
    pub const fn sector_count(&self) -> u32 {
        self.sector_count
    }

    /// Minimum write granularity.
    #[must_use]
    pub const fn write_block_size(&self) -> u32 {
        self.write_block_size
    }

    /// Bytes covered by all sectors.
    #[must_use]
    pub const fn area_size(&self) -> u32 {
        self.sector_size * self.sector_count
    }

    /// Rounds `len` up to a multiple of the write block size.
    #[must_use]
    pub const fn len_in_flash(&self, len: u32) -> u32 {
        if self.write_block_size <= 1 {
            len
        } else {
            len.div_ceil(self.write_block_size) * self.write_block_size
        }
    }

    /// On-flash size of a sector header.
    #[must_use]
    pub const fn sector_header_len(&self) -> u32 {
        self.len_in_flash(SECTOR_HEADER_SIZE as u32)
    }

    /// On-flash size of a data header.
    #[must_use]
    pub const fn data_header_len(&self) -> u32 {
        self.len_in_flash(DATA_HEADER_SIZE as u32)
    }

    /// On-flash size of a seal.
    #[must_use]
    pub const fn seal_len(&self) -> u32 {
        self.len_in_flash(SEAL_SIZE as u32)
    }

    /// Header plus seal, the footprint of a record with no payload.
    #[must_use]
    pub const fn record_overhead(&self) -> u32 {
        self.data_header_len() + self.seal_len()
    }

    /// Total footprint of a record with a `len` byte payload.
    #[must_use]
    pub const fn entry_len_in_flash(&self, len: u32) -> u32 {
        self.len_in_flash(len) + self.record_overhead()
    }

    /// Largest payload an empty sector can take while keeping room for the
    /// end marker.
    #[must_use]
    pub const fn max_entry_len(&self) -> u32 {
        let usable = self
            .sector_size
            .saturating_sub(self.sector_header_len())
            .saturating_sub(2 * self.record_overhead());
        if usable > u16::MAX as u32 {
            // the largest u16 that is still write-block aligned
            (u16::MAX as u32 / self.write_block_size) * self.write_block_size
        } else {
            usable
        }
    }

    /// Address of the data header of `entry`.
    #[must_use]
    pub const fn head_addr_in_flash(&self, entry: &Entry) -> u32 {
        entry.data_addr - self.data_header_len()
    }

    /// Address of the seal of `entry`.
    #[must_use]
    pub const fn slt_addr_in_flash(&self, entry: &Entry) -> u32 {
        entry.data_addr + self.len_in_flash(entry.len as u32)
    }

    /// Address of the record following `entry`.
    #[must_use]
    pub const fn next_head_addr(&self, entry: &Entry) -> u32 {
        self.slt_addr_in_flash(entry) + self.seal_len()
    }

    /// Advances `addr` by `step`, wrapping once at the end of the area.
    #[must_use]
    pub const fn addr_advance(&self, addr: u32, step: u32) -> u32 {
        let next = addr + step;
        if next >= self.area_size() {
            next - self.area_size()
        } else {
            next
        }
    }

    /// Index of the sector containing `addr`.
    #[must_use]
    pub const fn sector_index(&self, addr: u32) -> u32 {
        addr / self.sector_size
    }

    /// Start address of sector `index`.
    #[must_use]
    pub const fn sector_addr(&self, index: u32) -> u32 {
        index * self.sector_size
    }

    /// Offset of `addr` inside its sector.
    #[must_use]
    pub const fn sector_offset(&self, addr: u32) -> u32 {
        addr & (self.sector_size - 1)
    }

    /// First address past the sector containing `addr`.
    #[must_use]
    pub const fn sector_end(&self, addr: u32) -> u32 {
        addr - self.sector_offset(addr) + self.sector_size
    }

    /// Address of the first record slot of sector `index`.
    #[must_use]
    pub const fn data_start(&self, index: u32) -> u32 {
        self.sector_addr(index) + self.sector_header_len()
    }

    /// Index of the sector after `index`, circularly.
    #[must_use]
    pub const fn next_sector(&self, index: u32) -> u32 {
        self.sector_index(self.addr_advance(self.sector_addr(index), self.sector_size))
    }

    /// Returns true if `offset..offset + len` spans two sectors.
    #[must_use]
    pub const fn crosses_sector(&self, offset: u32, len: u32) -> bool {
        len > 0 && self.sector_index(offset) != self.sector_index(offset + len - 1)
    }
}
