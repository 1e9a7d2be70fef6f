//! # SFCB Flash
//!
//! Flash area abstraction for the Simple Flash Circular Buffer.
//!
//! This crate is the lowest layer of the store. A flash area is an
//! **opaque, byte-addressable erase/program device** - it knows nothing
//! about sector headers, records or seals.
//!
//! ## Device Model
//!
//! - Erased flash reads as `0xFF`
//! - Programming can only clear bits (new = old & data)
//! - Erase works on whole erase units and restores `0xFF`
//! - Writes must respect the device's write block size ([`FlashArea::align`])
//!
//! ## Available Devices
//!
//! - [`RamFlash`] - In-memory NOR simulator for tests and host tooling
//! - [`FileFlash`] - Flash image stored in a regular file
//!
//! ## Example
//!
//! ```rust
//! use sfcb_flash::{FlashArea, RamFlash};
//!
//! let flash = RamFlash::new(4096, 4, 4);
//! flash.write(0, b"abcd").unwrap();
//! let mut buf = [0u8; 4];
//! flash.read(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"abcd");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod flash;
mod memory;

pub use error::{FlashError, FlashResult};
pub use file::FileFlash;
pub use flash::{FlashArea, ERASED_BYTE};
pub use memory::RamFlash;
