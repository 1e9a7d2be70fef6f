//! Verify command implementation.

use super::inspect::{collect_entries, EntryInfo};
use super::{open_store, CommandResult};
use crate::GeometryArgs;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records whose seal verifies.
    pub valid_records: usize,
    /// Unsealed records that a newer copy supersedes.
    pub stale_unsealed: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Classifies the records of a chain.
    pub fn from_entries(entries: &[EntryInfo]) -> Self {
        let mut result = Self::default();
        for entry in entries {
            result.records_checked += 1;
            if entry.sealed {
                result.valid_records += 1;
            } else if entry.superseded {
                result.stale_unsealed += 1;
            } else {
                result.errors.push(format!(
                    "newest copy of id {:#06x} at {:#x} is not sealed",
                    entry.id, entry.data_addr
                ));
            }
        }
        result
    }

    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, geometry: &GeometryArgs) -> CommandResult {
    println!("Verifying image at {:?}", path);
    println!();

    let store = open_store(path, geometry)?;
    let result = VerifyResult::from_entries(&collect_entries(&store)?);

    println!("  Records checked: {}", result.records_checked);
    println!("  Valid:           {}", result.valid_records);
    if result.stale_unsealed > 0 {
        println!("  Stale unsealed:  {}", result.stale_unsealed);
    }
    for error in &result.errors {
        println!("  ERROR: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Image verification passed");
        Ok(())
    } else {
        println!("✗ Image verification failed");
        Err("Verification failed".into())
    }
}
