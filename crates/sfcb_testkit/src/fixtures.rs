//! Test fixtures and store helpers.
//!
//! Provides convenience functions for mounting stores on simulated flash
//! and for remounting them after a simulated reset.

use sfcb_core::{Sfcb, SfcbConfig};
use sfcb_flash::{FileFlash, RamFlash};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Geometry of a simulated flash area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Sector (erase unit) size in bytes.
    pub sector_size: u32,
    /// Number of sectors.
    pub sector_count: u32,
    /// Write block size of the device.
    pub write_block_size: u32,
}

impl Geometry {
    /// Small sectors that fill up after a handful of records.
    pub const SMALL: Self = Self {
        sector_size: 256,
        sector_count: 4,
        write_block_size: 4,
    };

    /// The default production layout: four 4 KiB sectors.
    pub const DEFAULT: Self = Self {
        sector_size: 4096,
        sector_count: 4,
        write_block_size: 4,
    };

    /// A fresh, fully erased RAM device of this geometry.
    pub fn ram(&self) -> Arc<RamFlash> {
        Arc::new(RamFlash::new(
            self.sector_size,
            self.sector_count,
            self.write_block_size,
        ))
    }

    /// A store configuration matching this geometry.
    pub fn config(&self, gc: bool) -> SfcbConfig {
        SfcbConfig::new()
            .sector_size(self.sector_size)
            .sector_count(self.sector_count)
            .gc(gc)
    }
}

/// A store mounted on RAM flash, with a handle kept on the device.
pub struct TestStore {
    /// The mounted store.
    pub store: Sfcb<Arc<RamFlash>>,
    /// The device, shared with the store.
    pub flash: Arc<RamFlash>,
    /// The configuration the store was mounted with.
    pub config: SfcbConfig,
}

impl TestStore {
    /// Mounts a store on a fresh device.
    pub fn new(geometry: Geometry, gc: bool) -> Self {
        Self::mount(geometry.ram(), geometry.config(gc))
    }

    /// Mounts a store on an existing device.
    pub fn mount(flash: Arc<RamFlash>, config: SfcbConfig) -> Self {
        let store = Sfcb::mount(Arc::clone(&flash), config).expect("Failed to mount store");
        Self {
            store,
            flash,
            config,
        }
    }

    /// Drops the store and mounts a new one on the same device, as after a
    /// reset.
    pub fn remount(self) -> Self {
        let Self { store, flash, config } = self;
        drop(store);
        Self::mount(flash, config)
    }

    /// Mounts a store on a copy of the current device content.
    pub fn snapshot(&self) -> Self {
        let flash = Arc::new(RamFlash::with_data(
            self.flash.data(),
            self.config.sector_size,
            self.store.layout().write_block_size(),
        ));
        Self::mount(flash, self.config)
    }
}

impl std::ops::Deref for TestStore {
    type Target = Sfcb<Arc<RamFlash>>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A flash image file in a temporary directory.
pub struct TestImage {
    /// Path of the image file.
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TestImage {
    /// Creates an erased image of the given geometry.
    pub fn new(geometry: Geometry) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("flash.img");
        FileFlash::create(
            &path,
            geometry.sector_size * geometry.sector_count,
            geometry.write_block_size,
        )
        .expect("Failed to create flash image");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Opens the image and mounts a store on it.
    pub fn mount(&self, geometry: Geometry, gc: bool) -> Sfcb<FileFlash> {
        let flash =
            FileFlash::open(&self.path, geometry.write_block_size).expect("Failed to open image");
        Sfcb::mount(flash, geometry.config(gc)).expect("Failed to mount store")
    }
}

/// Runs a test with a store on fresh RAM flash.
///
/// # Example
///
/// ```rust
/// use sfcb_testkit::{with_store, Geometry};
///
/// with_store(Geometry::SMALL, true, |store| {
///     store.write_entry(1, b"value").unwrap();
/// });
/// ```
pub fn with_store<F, R>(geometry: Geometry, gc: bool, f: F) -> R
where
    F: FnOnce(&Sfcb<Arc<RamFlash>>) -> R,
{
    let test_store = TestStore::new(geometry, gc);
    f(&test_store.store)
}

/// Reads back the newest value of `id`, checking its seal.
pub fn read_last(store: &Sfcb<impl sfcb_flash::FlashArea>, id: u16) -> Option<Vec<u8>> {
    let entry = store.get_last_entry(id).ok()?;
    store.check_crc(&entry).ok()?;
    store.read_entry(&entry).ok()
}
