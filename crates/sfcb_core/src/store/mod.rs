//! The mounted store.
//!
//! [`Sfcb`] owns a flash area for its whole mount lifetime. Mutating
//! operations (append, append_close, rotate, clear) are serialized by one
//! writer lock; lookups run without it and only observe `entry_sector`
//! through an atomic that is written under the lock.
//!
//! ## Mount
//!
//! 1. Validate the configuration against the flash area
//! 2. Classify every sector header; the oldest active generation is the
//!    entry sector, the newest seeds the generation counter
//! 3. With no active sector, erase used sectors and initialize sector 0
//! 4. Walk the chain to the first erased header: that is the write cursor
//! 5. Repair a rotation cut short by power loss
//! 6. With GC enabled and every sector active, finish the interrupted
//!    collection of the entry sector and erase it
//!
//! Recovery is a deterministic replay of the interrupted step, never a
//! rollback.

mod append;
mod iter;
mod lookup;
mod rotate;

pub use iter::EntryIter;

use crate::adapter::SectorFlash;
use crate::config::SfcbConfig;
use crate::error::{SfcbError, SfcbResult};
use crate::layout::Layout;
use crate::record::{SectorHeader, SectorState, SECTOR_HEADER_SIZE};
use crate::types::sector_id_gt;
use lookup::ChainEnd;
use parking_lot::{Mutex, MutexGuard};
use sfcb_flash::{FlashArea, ERASED_BYTE};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Writer-side bookkeeping, guarded by the store lock.
#[derive(Debug)]
pub(crate) struct WriteState {
    /// Generation of the most recently initialized sector.
    pub(crate) sector_id: u16,
    /// Address of the next free record slot.
    pub(crate) write_location: u32,
}

/// Result of classifying every sector at mount.
#[derive(Debug, Default)]
struct ChainScan {
    active: u32,
    oldest: Option<(u32, u16)>,
    newest: Option<u16>,
}

/// A key/value append store mounted on a flash area.
///
/// ## Example
///
/// ```rust
/// use sfcb_core::{Sfcb, SfcbConfig};
/// use sfcb_flash::RamFlash;
///
/// let store = Sfcb::mount(RamFlash::new(4096, 4, 4), SfcbConfig::default()).unwrap();
/// store.write_entry(1, b"hello").unwrap();
/// let entry = store.get_last_entry(1).unwrap();
/// assert_eq!(store.read_entry(&entry).unwrap(), b"hello");
/// ```
pub struct Sfcb<F: FlashArea> {
    flash: SectorFlash<F>,
    config: SfcbConfig,
    entry_sector: AtomicU32,
    state: Mutex<WriteState>,
}

impl<F: FlashArea> Sfcb<F> {
    /// Mounts the store on `flash`.
    ///
    /// Formats the area if no sector carries the configured magic, and
    /// resumes a rotation or garbage collection interrupted by power loss.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration does not fit the flash area
    /// - A flash operation fails
    /// - Record framing on flash is malformed
    pub fn mount(flash: F, config: SfcbConfig) -> SfcbResult<Self> {
        config.validate(flash.align(), flash.size())?;
        let layout = Layout::new(config.sector_size, config.sector_count, flash.align());

        let store = Self {
            flash: SectorFlash::new(flash, layout),
            config,
            entry_sector: AtomicU32::new(0),
            state: Mutex::new(WriteState {
                sector_id: 0,
                write_location: layout.data_start(0),
            }),
        };

        {
            let mut state = store.state.lock();
            store.bootstrap(&mut state)?;
        }
        Ok(store)
    }

    fn bootstrap(&self, state: &mut WriteState) -> SfcbResult<()> {
        let layout = *self.layout();
        let scan = self.scan_sectors()?;
        let mut active = scan.active;

        match scan.oldest {
            Some((index, _)) => {
                self.set_entry_sector(index);
                state.sector_id = scan.newest.unwrap_or_default();
            }
            None => {
                info!(
                    sectors = layout.sector_count(),
                    magic = self.config.magic,
                    "no store sectors found, formatting area"
                );
                for index in 0..layout.sector_count() {
                    if self.flash.sector_is_used(index)? {
                        debug!(sector = index, "erasing used sector");
                        self.flash.erase_sector(index)?;
                    }
                }
                self.set_entry_sector(0);
                self.sector_init(state, 0)?;
                active = 1;
            }
        }

        match self.locate_write_cursor(self.entry_sector())? {
            ChainEnd::Empty(head) => state.write_location = head,
            ChainEnd::Unclaimed(sector) => {
                warn!(sector, "chain ends in an unclaimed sector, initializing it");
                if self.sector_state(sector)? != SectorState::Blank {
                    self.flash.erase_sector(sector)?;
                }
                self.sector_init(state, sector)?;
                active += 1;
            }
            ChainEnd::Wrapped(sector) => {
                warn!(sector, "chain wrapped onto its oldest sector, completing rotation");
                self.set_entry_sector(layout.next_sector(sector));
                self.flash.erase_sector(sector)?;
                self.sector_init(state, sector)?;
            }
        }

        if self.config.gc && active == layout.sector_count() {
            let doomed = self.entry_sector();
            warn!(
                sector = doomed,
                "every sector is active, resuming interrupted garbage collection"
            );
            self.set_entry_sector(layout.next_sector(doomed));
            self.gc(state, doomed)?;
            self.flash.erase_sector(doomed)?;
        }

        info!(
            entry_sector = self.entry_sector(),
            write_location = state.write_location,
            sector_id = state.sector_id,
            "store mounted"
        );
        Ok(())
    }

    fn scan_sectors(&self) -> SfcbResult<ChainScan> {
        (0..self.layout().sector_count()).try_fold(ChainScan::default(), |mut scan, index| {
            if let SectorState::Active(id) = self.sector_state(index)? {
                scan.active += 1;
                match scan.oldest {
                    Some((_, oldest)) if !sector_id_gt(oldest, id) => {}
                    _ => scan.oldest = Some((index, id)),
                }
                match scan.newest {
                    Some(newest) if !sector_id_gt(id, newest) => {}
                    _ => scan.newest = Some(id),
                }
            }
            Ok(scan)
        })
    }

    /// Reads the header of the sector containing `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is outside the area or the read fails.
    pub fn sector_header_get(&self, offset: u32) -> SfcbResult<SectorHeader> {
        let raw = self.read_sector_header(self.layout().sector_index(offset))?;
        Ok(SectorHeader::decode(&raw))
    }

    fn read_sector_header(&self, index: u32) -> SfcbResult<[u8; SECTOR_HEADER_SIZE]> {
        if index >= self.layout().sector_count() {
            return Err(SfcbError::invalid_arguments(format!(
                "sector {index} is outside the store"
            )));
        }
        let mut raw = [0u8; SECTOR_HEADER_SIZE];
        self.flash.read(self.layout().sector_addr(index), &mut raw)?;
        Ok(raw)
    }

    /// Classifies sector `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read.
    pub fn sector_state(&self, index: u32) -> SfcbResult<SectorState> {
        let raw = self.read_sector_header(index)?;
        Ok(SectorState::classify(&raw, self.config.magic))
    }

    /// Classifies every sector of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a header cannot be read.
    pub fn sector_states(&self) -> SfcbResult<Vec<SectorState>> {
        (0..self.layout().sector_count())
            .map(|index| self.sector_state(index))
            .collect()
    }

    /// Returns true if any byte of the sector containing `offset` is
    /// programmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the sector cannot be read.
    pub fn sector_is_used(&self, offset: u32) -> SfcbResult<bool> {
        self.flash.sector_is_used(self.layout().sector_index(offset))
    }

    /// Claims erased sector `index` with the next generation and moves the
    /// write cursor to its first record slot.
    pub(crate) fn sector_init(&self, state: &mut WriteState, index: u32) -> SfcbResult<()> {
        let raw = self.read_sector_header(index)?;
        if raw.iter().any(|&b| b != ERASED_BYTE) {
            warn!(sector = index, "refusing to initialize a sector that is not erased");
            return Err(SfcbError::NoSpace);
        }

        let id = state.sector_id.wrapping_add(1);
        let header = SectorHeader {
            magic: self.config.magic,
            id,
        };
        self.flash
            .write_padded(self.layout().sector_addr(index), &header.encode())?;

        state.sector_id = id;
        state.write_location = self.layout().data_start(index);
        debug!(sector = index, id, "sector initialized");
        Ok(())
    }

    fn lock(&self) -> SfcbResult<MutexGuard<'_, WriteState>> {
        match self.config.lock_timeout {
            Some(timeout) => self
                .state
                .try_lock_for(timeout)
                .ok_or(SfcbError::Timeout { timeout }),
            None => Ok(self.state.lock()),
        }
    }

    pub(crate) fn set_entry_sector(&self, index: u32) {
        self.entry_sector.store(index, Ordering::Release);
    }

    /// Index of the oldest sector of the chain.
    pub fn entry_sector(&self) -> u32 {
        self.entry_sector.load(Ordering::Acquire)
    }

    /// Address of the next free record slot.
    ///
    /// Waits for a running writer, up to the configured lock timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::Timeout`] if the lock is not acquired in time.
    pub fn write_location(&self) -> SfcbResult<u32> {
        Ok(self.lock()?.write_location)
    }

    /// Generation of the most recently initialized sector.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::Timeout`] if the lock is not acquired in time.
    pub fn sector_id(&self) -> SfcbResult<u16> {
        Ok(self.lock()?.sector_id)
    }

    /// The sector layout of the mounted store.
    pub fn layout(&self) -> &Layout {
        self.flash.layout()
    }

    /// The configuration the store was mounted with.
    pub fn config(&self) -> &SfcbConfig {
        &self.config
    }

    /// The sector-checked flash adapter.
    pub fn adapter(&self) -> &SectorFlash<F> {
        &self.flash
    }

    /// The underlying flash device.
    pub fn flash(&self) -> &F {
        self.flash.device()
    }

    /// Unmounts the store and returns the flash device.
    pub fn into_flash(self) -> F {
        self.flash.into_device()
    }

    /// Reads flash bytes at `offset`; the range must stay in one sector.
    ///
    /// # Errors
    ///
    /// See [`SectorFlash::read`].
    pub fn flash_read(&self, offset: u32, buf: &mut [u8]) -> SfcbResult<()> {
        self.flash.read(offset, buf)
    }

    /// Programs flash bytes at `offset`; the range must stay in one sector
    /// and be write-block aligned.
    ///
    /// # Errors
    ///
    /// See [`SectorFlash::write`].
    pub fn flash_write(&self, offset: u32, data: &[u8]) -> SfcbResult<()> {
        self.flash.write(offset, data)
    }

    /// Erases whole sectors at `offset`.
    ///
    /// Only sectors outside the chain, from the entry sector to the open
    /// sector, may be erased.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::InvalidArguments`] if the range covers a sector
    /// of the chain, a timeout if the lock is not acquired, or see
    /// [`SectorFlash::erase`].
    pub fn flash_erase(&self, offset: u32, len: u32) -> SfcbResult<()> {
        let state = self.lock()?;
        if len > 0 {
            let layout = self.layout();
            let first = layout.sector_index(offset);
            let last = layout.sector_index(offset.saturating_add(len - 1));
            let mut chain = self.chain_sectors(&state);
            if let Some(index) = chain.find(|i| (first..=last).contains(i)) {
                return Err(SfcbError::invalid_arguments(format!(
                    "sector {index} belongs to the store chain"
                )));
            }
        }
        self.flash.erase(offset, len)
    }

    /// Sector indices of the chain, entry sector first.
    fn chain_sectors(&self, state: &WriteState) -> impl Iterator<Item = u32> + '_ {
        let layout = *self.layout();
        let open = layout.sector_index(state.write_location);
        let mut next = Some(self.entry_sector());
        std::iter::from_fn(move || {
            let index = next?;
            next = (index != open).then(|| layout.next_sector(index));
            Some(index)
        })
    }
}

impl<F: FlashArea> std::fmt::Debug for Sfcb<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sfcb")
            .field("config", &self.config)
            .field("layout", self.layout())
            .field("entry_sector", &self.entry_sector())
            .finish_non_exhaustive()
    }
}
