//! Power-cut fault injection.
//!
//! [`PowerCutFlash`] wraps a device and lets a fixed number of program or
//! erase operations through before "losing power": the failing operation
//! and every mutation after it are rejected with [`FlashError::Device`]
//! and leave the device untouched. Reads keep working so the test can
//! inspect what survived.
//!
//! ## Usage
//!
//! ```rust
//! use sfcb_flash::{FlashArea, RamFlash};
//! use sfcb_testkit::PowerCutFlash;
//!
//! let flash = PowerCutFlash::new(RamFlash::new(256, 2, 4));
//! flash.cut_after(1);
//! assert!(flash.write(0, b"abcd").is_ok());
//! assert!(flash.write(4, b"efgh").is_err());
//! assert!(flash.tripped());
//! ```

use sfcb_flash::{FlashArea, FlashError, FlashResult};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const DISARMED: usize = usize::MAX;

/// Which operations count towards the power-cut budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOn {
    /// Writes and erases.
    AnyMutation,
    /// Erases only; writes always pass until the cut.
    Erase,
}

/// A flash device that loses power after a set number of operations.
#[derive(Debug)]
pub struct PowerCutFlash<F> {
    inner: F,
    budget: AtomicUsize,
    erase_only: AtomicBool,
    tripped: AtomicBool,
    mutations: AtomicUsize,
}

impl<F: FlashArea> PowerCutFlash<F> {
    /// Wraps `inner` with no cut armed.
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            budget: AtomicUsize::new(DISARMED),
            erase_only: AtomicBool::new(false),
            tripped: AtomicBool::new(false),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Lets `ops` more writes or erases through, then cuts power.
    pub fn cut_after(&self, ops: usize) {
        self.arm(ops, CutOn::AnyMutation);
    }

    /// Lets `ops` more operations of the given kind through, then cuts
    /// power.
    pub fn arm(&self, ops: usize, on: CutOn) {
        self.erase_only.store(on == CutOn::Erase, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
        self.budget.store(ops, Ordering::SeqCst);
    }

    /// Restores power and disarms the cut.
    pub fn restore(&self) {
        self.budget.store(DISARMED, Ordering::SeqCst);
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// True once power has been cut.
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Number of writes and erases that reached the device.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// The wrapped device.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Unwraps the device.
    pub fn into_inner(self) -> F {
        self.inner
    }

    fn consume(&self, is_erase: bool) -> FlashResult<()> {
        if self.tripped() {
            return Err(FlashError::device("power lost"));
        }
        if !is_erase && self.erase_only.load(Ordering::SeqCst) {
            return Ok(());
        }
        let budget = self.budget.load(Ordering::SeqCst);
        if budget == DISARMED {
            return Ok(());
        }
        if budget == 0 {
            self.tripped.store(true, Ordering::SeqCst);
            return Err(FlashError::device("power cut"));
        }
        self.budget.store(budget - 1, Ordering::SeqCst);
        Ok(())
    }
}

impl<F: FlashArea> FlashArea for PowerCutFlash<F> {
    fn read(&self, offset: u32, buf: &mut [u8]) -> FlashResult<()> {
        self.inner.read(offset, buf)
    }

    fn write(&self, offset: u32, data: &[u8]) -> FlashResult<()> {
        self.consume(false)?;
        self.inner.write(offset, data)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn erase(&self, offset: u32, len: u32) -> FlashResult<()> {
        self.consume(true)?;
        self.inner.erase(offset, len)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn size(&self) -> u32 {
        self.inner.size()
    }

    fn align(&self) -> u32 {
        self.inner.align()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfcb_flash::RamFlash;

    #[test]
    fn test_disarmed_passes_through() {
        let flash = PowerCutFlash::new(RamFlash::new(64, 2, 4));
        flash.write(0, b"abcd").unwrap();
        flash.erase(0, 64).unwrap();
        assert_eq!(flash.mutations(), 2);
        assert!(!flash.tripped());
    }

    #[test]
    fn test_cut_rejects_and_leaves_device_untouched() {
        let flash = PowerCutFlash::new(RamFlash::new(64, 2, 4));
        flash.cut_after(0);
        assert!(matches!(
            flash.write(0, b"abcd"),
            Err(FlashError::Device(_))
        ));
        assert!(flash.inner().data().iter().all(|&b| b == 0xFF));

        assert!(flash.write(0, b"abcd").is_err());
        flash.restore();
        flash.write(0, b"abcd").unwrap();
    }

    #[test]
    fn test_erase_only_cut() {
        let flash = PowerCutFlash::new(RamFlash::new(64, 2, 4));
        flash.arm(0, CutOn::Erase);
        flash.write(0, b"abcd").unwrap();
        assert!(flash.erase(0, 64).is_err());
        assert!(flash.write(4, b"efgh").is_err());
        assert_eq!(&flash.inner().data()[..4], b"abcd");
    }
}
