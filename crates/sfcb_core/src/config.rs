//! Store configuration.

use crate::error::{SfcbError, SfcbResult};
use crate::layout::Layout;
use std::time::Duration;

/// Default store magic, `"SFCB"` in ASCII.
pub const DEFAULT_MAGIC: u32 = 0x5346_4342;

/// Largest supported sector size. Record lengths are stored as `u16`.
pub const MAX_SECTOR_SIZE: u32 = 64 * 1024;

/// Configuration for mounting a store on a flash area.
///
/// Flash geometry is not discovered; the sector layout comes from here and
/// the write block size from [`sfcb_flash::FlashArea::align`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SfcbConfig {
    /// Value identifying this store's sectors.
    pub magic: u32,

    /// Size of one erase unit in bytes. Must be a power of two.
    pub sector_size: u32,

    /// Number of sectors used by the store.
    pub sector_count: u32,

    /// Whether rotation keeps a free sector and relocates live entries.
    pub gc: bool,

    /// How long writers wait for the store lock (`None` = forever).
    pub lock_timeout: Option<Duration>,
}

impl Default for SfcbConfig {
    fn default() -> Self {
        Self {
            magic: DEFAULT_MAGIC,
            sector_size: 4096,
            sector_count: 4,
            gc: true,
            lock_timeout: None,
        }
    }
}

impl SfcbConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store magic.
    #[must_use]
    pub const fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    /// Sets the sector size.
    #[must_use]
    pub const fn sector_size(mut self, size: u32) -> Self {
        self.sector_size = size;
        self
    }

    /// Sets the number of sectors.
    #[must_use]
    pub const fn sector_count(mut self, count: u32) -> Self {
        self.sector_count = count;
        self
    }

    /// Enables or disables garbage collection.
    #[must_use]
    pub const fn gc(mut self, enabled: bool) -> Self {
        self.gc = enabled;
        self
    }

    /// Sets the writer lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Total number of bytes the store occupies.
    #[must_use]
    pub fn area_size(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sector_count)
    }

    /// Checks the configuration against a flash area.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::InvalidConfig`] if:
    /// - `sector_size` is not a power of two or exceeds [`MAX_SECTOR_SIZE`]
    /// - `sector_count` is below 2 with GC, or 0 without
    /// - `write_block_size` is not a power of two no larger than a sector
    /// - the sectors do not fit in `flash_size`
    /// - a sector cannot hold its header, one entry and an end marker
    /// - `magic` reads like erased flash
    pub fn validate(&self, write_block_size: u32, flash_size: u32) -> SfcbResult<()> {
        if !self.sector_size.is_power_of_two() {
            return Err(SfcbError::invalid_config(format!(
                "sector size {} is not a power of two",
                self.sector_size
            )));
        }
        if self.sector_size > MAX_SECTOR_SIZE {
            return Err(SfcbError::invalid_config(format!(
                "sector size {} exceeds {MAX_SECTOR_SIZE}",
                self.sector_size
            )));
        }

        let min_sectors = if self.gc { 2 } else { 1 };
        if self.sector_count < min_sectors {
            return Err(SfcbError::invalid_config(format!(
                "{} sector(s) configured, at least {min_sectors} required{}",
                self.sector_count,
                if self.gc { " with garbage collection" } else { "" }
            )));
        }

        if write_block_size == 0
            || !write_block_size.is_power_of_two()
            || write_block_size > self.sector_size
        {
            return Err(SfcbError::invalid_config(format!(
                "write block size {write_block_size} does not fit sector size {}",
                self.sector_size
            )));
        }

        if self.area_size() > u64::from(flash_size) {
            return Err(SfcbError::invalid_config(format!(
                "{} sectors of {} bytes exceed the {flash_size} byte flash area",
                self.sector_count, self.sector_size
            )));
        }

        if self.magic == u32::MAX {
            return Err(SfcbError::invalid_config(
                "magic 0xffffffff is indistinguishable from erased flash",
            ));
        }

        let layout = Layout::new(self.sector_size, self.sector_count, write_block_size);
        if layout.max_entry_len() == 0 {
            return Err(SfcbError::invalid_config(format!(
                "sector size {} leaves no room for entries",
                self.sector_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SfcbConfig::default();
        assert_eq!(config.magic, DEFAULT_MAGIC);
        assert_eq!(config.sector_size, 4096);
        assert!(config.gc);
        assert!(config.lock_timeout.is_none());
        assert!(config.validate(4, 16 * 1024).is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = SfcbConfig::new()
            .magic(0xCAFE_F00D)
            .sector_size(1024)
            .sector_count(8)
            .gc(false)
            .lock_timeout(Some(Duration::from_millis(5)));

        assert_eq!(config.magic, 0xCAFE_F00D);
        assert_eq!(config.sector_size, 1024);
        assert_eq!(config.sector_count, 8);
        assert!(!config.gc);
        assert_eq!(config.lock_timeout, Some(Duration::from_millis(5)));
        assert_eq!(config.area_size(), 8192);
    }

    #[test]
    fn rejects_non_power_of_two_sector() {
        let config = SfcbConfig::new().sector_size(3000);
        assert!(matches!(
            config.validate(4, 1 << 20),
            Err(SfcbError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_oversized_sector() {
        let config = SfcbConfig::new().sector_size(128 * 1024).sector_count(2);
        assert!(config.validate(4, 1 << 20).is_err());
    }

    #[test]
    fn gc_needs_two_sectors() {
        let config = SfcbConfig::new().sector_count(1);
        assert!(config.validate(4, 4096).is_err());
        assert!(config.gc(false).validate(4, 4096).is_ok());
    }

    #[test]
    fn rejects_zero_sectors_without_gc() {
        let config = SfcbConfig::new().gc(false).sector_count(0);
        assert!(config.validate(4, 4096).is_err());
    }

    #[test]
    fn rejects_area_larger_than_flash() {
        let config = SfcbConfig::new();
        assert!(config.validate(4, 4096 * 3).is_err());
    }

    #[test]
    fn rejects_bad_write_block_size() {
        let config = SfcbConfig::new();
        assert!(config.validate(0, 1 << 20).is_err());
        assert!(config.validate(6, 1 << 20).is_err());
        assert!(config.validate(8192, 1 << 20).is_err());
    }

    #[test]
    fn rejects_erased_magic() {
        let config = SfcbConfig::new().magic(u32::MAX);
        assert!(config.validate(4, 1 << 20).is_err());
    }

    #[test]
    fn rejects_sector_too_small_for_entries() {
        let config = SfcbConfig::new().sector_size(32).sector_count(2);
        assert!(config.validate(8, 64).is_err());
        assert!(config.validate(1, 64).is_ok());
    }
}
