//! Error types for the SFCB store.

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations.
pub type SfcbResult<T> = Result<T, SfcbError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum SfcbError {
    /// The flash device failed to read, program or erase.
    #[error("flash error: {0}")]
    Flash(#[from] sfcb_flash::FlashError),

    /// The caller passed arguments the store cannot act on.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the problem.
        message: String,
    },

    /// The open sector cannot hold the requested data.
    #[error("no space left in the current sector")]
    NoSpace,

    /// No entry with the id exists in the sector chain.
    #[error("entry {id:#06x} not found")]
    NotFound {
        /// The id that was searched for.
        id: u16,
    },

    /// The seal of an entry does not match its payload.
    #[error("checksum mismatch: stored {expected:04x}, computed {actual:04x}")]
    ChecksumMismatch {
        /// Checksum stored in the seal.
        expected: u16,
        /// Checksum computed over the payload.
        actual: u16,
    },

    /// The store configuration does not fit the flash area.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The store lock could not be acquired in time.
    #[error("timed out after {timeout:?} waiting for the store lock")]
    Timeout {
        /// The configured lock timeout.
        timeout: Duration,
    },

    /// Record framing on flash is malformed.
    #[error("corrupted record at {addr:#x}: {message}")]
    Corrupted {
        /// Address of the offending header.
        addr: u32,
        /// Description of the corruption.
        message: String,
    },
}

impl SfcbError {
    /// Creates an invalid arguments error.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(addr: u32, message: impl Into<String>) -> Self {
        Self::Corrupted {
            addr,
            message: message.into(),
        }
    }

    /// Returns true for [`SfcbError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
