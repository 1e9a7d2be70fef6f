//! # SFCB Core
//!
//! The Simple Flash Circular Buffer: a log-structured key/value append
//! store for raw flash.
//!
//! This crate provides:
//! - Two-phase append (reserve and write header, then seal with a CRC16)
//! - Lookups of the oldest and newest record for a 16-bit id
//! - Sector rotation with optional garbage collection of the oldest sector
//! - Mount-time recovery from power loss during rotation or collection
//!
//! ## On-Flash Layout
//!
//! ```text
//! sector: [magic u32 | id u16 | pad u16] record record ... [end marker] 0xFF..
//! record: [id u16 | len u16] payload [crc16 u16 | pad u16]
//! ```
//!
//! All integers are little-endian. Headers, payloads and seals are each
//! padded with `0xFF` to the write block size of the device. Sectors are
//! chained by their generation id; the oldest active sector is the entry
//! sector and every walk starts there.
//!
//! ## Design Principles
//!
//! - Appends never modify programmed bytes; a newer record for the same id
//!   supersedes the older one
//! - After any record there is room for one more header and seal, so a
//!   sector can always be closed with an end marker
//! - One writer at a time; lookups take no lock
//!
//! ## Example
//!
//! ```rust
//! use sfcb_core::{Entry, Sfcb, SfcbConfig};
//! use sfcb_flash::RamFlash;
//!
//! let store = Sfcb::mount(RamFlash::new(4096, 4, 4), SfcbConfig::default()).unwrap();
//!
//! let mut entry = Entry::new(0x12, 3);
//! store.append(&mut entry).unwrap();
//! store.write_payload(&entry, b"abc").unwrap();
//! store.append_close(&entry).unwrap();
//!
//! let found = store.get_last_entry(0x12).unwrap();
//! store.check_crc(&found).unwrap();
//! assert_eq!(store.read_entry(&found).unwrap(), b"abc");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod error;
mod layout;
mod record;
mod store;
mod types;

pub use adapter::{SectorFlash, MOVE_BLOCK_SIZE};
pub use config::{SfcbConfig, DEFAULT_MAGIC, MAX_SECTOR_SIZE};
pub use error::{SfcbError, SfcbResult};
pub use layout::Layout;
pub use record::{
    compute_crc16, DataHeader, Seal, SectorHeader, SectorState, DATA_HEADER_SIZE, SEAL_SIZE,
    SECTOR_HEADER_SIZE,
};
pub use store::{EntryIter, Sfcb};
pub use types::{is_reserved_id, sector_id_gt, Entry, ID_EMPTY, ID_SECTOR_END};

/// Current crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
