//! On-flash structures.
//!
//! ## Sector Header
//!
//! ```text
//! | magic (4) | id (2) | pad (2) |
//! ```
//!
//! ## Record
//!
//! ```text
//! | id (2) | len (2) | payload (len, padded) | crc16 (2) | pad (2) |
//! ```
//!
//! All integers are little-endian. The header and the seal are each padded
//! with `0xFF` to the write block size. A sealed record has a zero pad
//! field; an erased seal reads `0xFFFF`.

use crate::types::{ID_EMPTY, ID_SECTOR_END};
use crc::{Crc, CRC_16_KERMIT};
use sfcb_flash::ERASED_BYTE;

/// Encoded size of a sector header.
pub const SECTOR_HEADER_SIZE: usize = 8;

/// Encoded size of a data header.
pub const DATA_HEADER_SIZE: usize = 4;

/// Encoded size of a seal.
pub const SEAL_SIZE: usize = 4;

/// CRC16-CCITT (reflected 0x1021 polynomial, zero seed) used for seals.
pub const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

/// Computes the seal checksum of a payload.
#[must_use]
pub fn compute_crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Header at the start of every sector of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorHeader {
    /// Store magic.
    pub magic: u32,
    /// Sector generation.
    pub id: u16,
}

impl SectorHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; SECTOR_HEADER_SIZE] {
        let mut buf = [0u8; SECTOR_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.id.to_le_bytes());
        buf
    }

    /// Decodes a header.
    #[must_use]
    pub fn decode(buf: &[u8; SECTOR_HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            id: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

/// Role of a sector, derived from its header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorState {
    /// Header is erased; the sector can be initialized.
    Blank,
    /// Header belongs to something else.
    Foreign,
    /// Sector belongs to the store, with its generation.
    Active(u16),
}

impl SectorState {
    /// Classifies raw header bytes against the store magic.
    #[must_use]
    pub fn classify(raw: &[u8; SECTOR_HEADER_SIZE], magic: u32) -> Self {
        let header = SectorHeader::decode(raw);
        if header.magic == magic {
            Self::Active(header.id)
        } else if raw.iter().all(|&b| b == ERASED_BYTE) {
            Self::Blank
        } else {
            Self::Foreign
        }
    }

    /// Returns true for [`SectorState::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Header in front of each record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    /// Record id, or one of the reserved ids.
    pub id: u16,
    /// Logical payload length.
    pub len: u16,
}

impl DataHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; DATA_HEADER_SIZE] {
        let mut buf = [0u8; DATA_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.id.to_le_bytes());
        buf[2..4].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    /// Decodes a header.
    #[must_use]
    pub fn decode(buf: &[u8; DATA_HEADER_SIZE]) -> Self {
        Self {
            id: u16::from_le_bytes([buf[0], buf[1]]),
            len: u16::from_le_bytes([buf[2], buf[3]]),
        }
    }

    /// Creates a sector end marker spanning `len` payload bytes.
    #[must_use]
    pub const fn sector_end(len: u16) -> Self {
        Self {
            id: ID_SECTOR_END,
            len,
        }
    }

    /// Returns true if the header was never written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.id == ID_EMPTY
    }

    /// Returns true if the header closes its sector.
    #[must_use]
    pub const fn is_sector_end(&self) -> bool {
        self.id == ID_SECTOR_END
    }
}

/// Trailer sealing a record payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seal {
    /// CRC16 of the payload.
    pub crc: u16,
    /// Whether the seal was written (an erased seal reads as unsealed).
    pub sealed: bool,
}

impl Seal {
    /// Creates a written seal.
    #[must_use]
    pub const fn new(crc: u16) -> Self {
        Self { crc, sealed: true }
    }

    /// Encodes the seal.
    #[must_use]
    pub fn encode(&self) -> [u8; SEAL_SIZE] {
        let mut buf = [ERASED_BYTE; SEAL_SIZE];
        buf[0..2].copy_from_slice(&self.crc.to_le_bytes());
        if self.sealed {
            buf[2..4].copy_from_slice(&0u16.to_le_bytes());
        }
        buf
    }

    /// Decodes a seal.
    #[must_use]
    pub fn decode(buf: &[u8; SEAL_SIZE]) -> Self {
        Self {
            crc: u16::from_le_bytes([buf[0], buf[1]]),
            sealed: u16::from_le_bytes([buf[2], buf[3]]) == 0,
        }
    }
}
