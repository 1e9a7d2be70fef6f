//! Core type definitions for the store.

use std::fmt;

/// Id of an erased (never written) data header.
pub const ID_EMPTY: u16 = 0xFFFF;

/// Id of the marker that closes a sector.
pub const ID_SECTOR_END: u16 = 0xFFFE;

/// Returns true if `id` is reserved for framing and cannot name an entry.
#[must_use]
pub const fn is_reserved_id(id: u16) -> bool {
    id == ID_EMPTY || id == ID_SECTOR_END
}

/// Returns true if sector generation `a` is newer than `b`.
///
/// Generations wrap at 2^16. `a` is newer when the forward distance from
/// `b` to `a` is between 1 and `0x7FFF`.
#[must_use]
pub const fn sector_id_gt(a: u16, b: u16) -> bool {
    let distance = a.wrapping_sub(b);
    distance != 0 && distance <= 0x7FFF
}

/// Locator of one stored record.
///
/// An entry is built by the caller before [`crate::Sfcb::append`] or
/// returned by a lookup. It does not own the payload; `data_addr` points at
/// the payload inside the flash area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Entry {
    /// Key of the record.
    pub id: u16,
    /// Area offset of the first payload byte.
    pub data_addr: u32,
    /// Logical payload length in bytes.
    pub len: u16,
}

impl Entry {
    /// Creates an entry for appending `len` bytes under `id`.
    #[must_use]
    pub const fn new(id: u16, len: u16) -> Self {
        Self {
            id,
            data_addr: 0,
            len,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry {:#06x} @ {:#x} ({} bytes)",
            self.id, self.data_addr, self.len
        )
    }
}
