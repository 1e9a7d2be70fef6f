//! Churn testing for SFCB.
//!
//! Drives a store through many random writes and rotations while tracking
//! the expected newest value of every id, then checks the store against
//! that model.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sfcb_core::{Sfcb, SfcbError, SfcbResult};
use sfcb_flash::FlashArea;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Configuration for a churn run.
#[derive(Debug, Clone)]
pub struct ChurnConfig {
    /// Seed for the random generator; runs are reproducible.
    pub seed: u64,
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of distinct ids written.
    pub distinct_ids: u16,
    /// Largest payload in bytes.
    pub max_len: usize,
    /// Chance in percent that an operation is a rotation.
    pub rotate_percent: u32,
    /// Verify the whole model after every operation.
    pub verify_each_step: bool,
}

impl Default for ChurnConfig {
    fn default() -> Self {
        Self {
            seed: 0x5FCB,
            operations: 2_000,
            distinct_ids: 8,
            max_len: 48,
            rotate_percent: 10,
            verify_each_step: false,
        }
    }
}

/// Result of a churn run.
#[derive(Debug, Clone, Default)]
pub struct ChurnReport {
    /// Values written.
    pub writes: usize,
    /// Explicit rotations.
    pub rotations: usize,
    /// Lookups whose value differed from the model.
    pub mismatches: usize,
    /// Lookups whose seal did not verify.
    pub checksum_failures: usize,
    /// Ids missing from the store. Only possible without GC.
    pub lost: usize,
    /// Total duration.
    pub duration: Duration,
}

impl ChurnReport {
    /// True when every lookup matched the model.
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0 && self.checksum_failures == 0
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Writes: {}", self.writes);
        println!("Rotations: {}", self.rotations);
        println!("Mismatches: {}", self.mismatches);
        println!("Checksum failures: {}", self.checksum_failures);
        println!("Lost ids: {}", self.lost);
        println!("Duration: {:?}", self.duration);
    }
}

/// Expected newest value of every id written so far.
#[derive(Debug, Clone, Default)]
pub struct Model {
    values: BTreeMap<u16, Vec<u8>>,
}

impl Model {
    /// Records a write.
    pub fn write(&mut self, id: u16, data: &[u8]) {
        self.values.insert(id, data.to_vec());
    }

    /// Expected value of `id`.
    pub fn get(&self, id: u16) -> Option<&[u8]> {
        self.values.get(&id).map(Vec::as_slice)
    }

    /// Number of ids written.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compares every id against `store`, adding the outcome to `report`.
    ///
    /// With GC a missing id is a mismatch; without it, erased history is
    /// counted as lost.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than a missing id or a bad
    /// seal.
    pub fn verify<F: FlashArea>(
        &self,
        store: &Sfcb<F>,
        report: &mut ChurnReport,
    ) -> SfcbResult<()> {
        for (&id, expected) in &self.values {
            let entry = match store.get_last_entry(id) {
                Ok(entry) => entry,
                Err(SfcbError::NotFound { .. }) if !store.config().gc => {
                    report.lost += 1;
                    continue;
                }
                Err(SfcbError::NotFound { .. }) => {
                    report.mismatches += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match store.check_crc(&entry) {
                Ok(()) => {}
                Err(SfcbError::ChecksumMismatch { .. }) => {
                    report.checksum_failures += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
            if store.read_entry(&entry)? != *expected {
                report.mismatches += 1;
            }
        }
        Ok(())
    }
}

/// Runs a seeded random workload against `store`.
///
/// # Errors
///
/// Returns the first store error other than a lookup mismatch.
pub fn run_churn<F: FlashArea>(
    store: &Sfcb<F>,
    config: &ChurnConfig,
) -> SfcbResult<(ChurnReport, Model)> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut model = Model::default();
    let mut report = ChurnReport::default();
    let start = Instant::now();

    for _ in 0..config.operations {
        if rng.gen_range(0..100) < config.rotate_percent {
            store.rotate()?;
            report.rotations += 1;
        } else {
            let id = rng.gen_range(0..config.distinct_ids.max(1));
            let len = rng.gen_range(1..=config.max_len.max(1));
            let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            store.write_entry(id, &data)?;
            model.write(id, &data);
            report.writes += 1;
        }
        if config.verify_each_step {
            model.verify(store, &mut report)?;
        }
    }

    if !config.verify_each_step {
        model.verify(store, &mut report)?;
    }
    report.duration = start.elapsed();
    Ok((report, model))
}
