//! # SFCB Testkit
//!
//! Test utilities for SFCB.
//!
//! This crate provides:
//! - Fixtures for stores on RAM flash and on image files
//! - Power-cut fault injection for crash recovery tests
//! - Property-based test generators using proptest
//! - A seeded churn harness with a model of the expected values
//!
//! ## Usage
//!
//! ```rust
//! use sfcb_testkit::prelude::*;
//!
//! with_store(Geometry::SMALL, true, |store| {
//!     store.write_entry(1, b"hello").unwrap();
//!     assert_eq!(read_last(store, 1).unwrap(), b"hello");
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
