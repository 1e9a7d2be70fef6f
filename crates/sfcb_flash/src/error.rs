//! Error types for flash operations.

use std::io;
use thiserror::Error;

/// Result type for flash operations.
pub type FlashResult<T> = Result<T, FlashError>;

/// Errors that can occur while accessing a flash area.
#[derive(Debug, Error)]
pub enum FlashError {
    /// An I/O error occurred in the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The access extends beyond the end of the area.
    #[error("access out of bounds: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested offset.
        offset: u32,
        /// The requested length.
        len: usize,
        /// The size of the area.
        size: u32,
    },

    /// The access does not respect the device alignment.
    #[error("misaligned access: offset {offset}, len {len}, alignment {align}")]
    Misaligned {
        /// The requested offset.
        offset: u32,
        /// The requested length.
        len: usize,
        /// The required alignment.
        align: u32,
    },

    /// The device reported a failure.
    #[error("device failure: {0}")]
    Device(String),
}

impl FlashError {
    /// Creates a device failure error.
    pub fn device(message: impl Into<String>) -> Self {
        Self::Device(message.into())
    }
}
