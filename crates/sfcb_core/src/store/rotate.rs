//! Sector rotation and garbage collection.
//!
//! ## Rotation
//!
//! ```text
//! APPENDING(S) -> end marker -> ADVANCING(S+1)
//!   -> [no gc] erase S+1 if it is the entry sector
//!   -> init S+1
//!   -> [gc] if S+2 is the entry sector: collect S+2, erase S+2
//!   -> APPENDING(S+1)
//! ```
//!
//! With GC one sector is always kept erased. Before the oldest sector is
//! erased, every record in it whose id has no sealed copy in the rest of
//! the chain is copied verbatim to the write cursor.
//!
//! ## Failure
//!
//! A flash error aborts the operation where it stands. Mount finishes the
//! interrupted step: a sealed sector with no successor gets one, and an
//! area where every sector is active has its entry sector collected and
//! erased again. Collection is idempotent because a record already copied
//! is found sealed in the surviving chain and skipped; a copy torn by the
//! power cut has no seal and is made again.

use super::{Sfcb, WriteState};
use crate::error::{SfcbError, SfcbResult};
use crate::record::DataHeader;
use crate::types::Entry;
use sfcb_flash::FlashArea;
use tracing::{debug, info};

impl<F: FlashArea> Sfcb<F> {
    /// Closes the open sector and moves the write cursor to the next one,
    /// reclaiming the oldest sector when needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out, a flash operation fails, or
    /// relocated records do not fit ([`SfcbError::NoSpace`]).
    pub fn rotate(&self) -> SfcbResult<()> {
        let mut state = self.lock()?;
        self.rotate_locked(&mut state)
    }

    fn rotate_locked(&self, state: &mut WriteState) -> SfcbResult<()> {
        let layout = *self.layout();
        let location = state.write_location;

        let fill = layout.sector_end(location) - location - layout.record_overhead();
        let marker = DataHeader::sector_end(u16::try_from(fill).map_err(|_| {
            SfcbError::corrupted(location, format!("end marker of {fill} bytes"))
        })?);
        self.flash.write_padded(location, &marker.encode())?;

        let current = layout.sector_index(location);
        let next = layout.next_sector(current);

        if !self.config.gc && next == self.entry_sector() {
            self.set_entry_sector(layout.next_sector(next));
            debug!(sector = next, "erasing oldest sector for reuse");
            self.flash.erase_sector(next)?;
        }

        self.sector_init(state, next)?;

        if self.config.gc {
            let after = layout.next_sector(next);
            if after == self.entry_sector() {
                self.set_entry_sector(layout.next_sector(after));
                self.gc(state, after)?;
                self.flash.erase_sector(after)?;
            }
        }

        debug!(
            from = current,
            to = next,
            entry_sector = self.entry_sector(),
            "rotated"
        );
        Ok(())
    }

    /// Relocates records of sector `index` that have no copy elsewhere in
    /// the chain. The entry sector must already point past `index`.
    pub(crate) fn gc(&self, state: &mut WriteState, index: u32) -> SfcbResult<()> {
        let layout = *self.layout();
        let records = self.sector_records(index)?;
        let mut moved = 0usize;

        for (pos, (head, header)) in records.iter().enumerate() {
            // a later copy in the same sector supersedes this one
            if records[pos + 1..].iter().any(|(_, later)| later.id == header.id) {
                continue;
            }
            // a torn copy left by an interrupted collection does not count
            if self.has_intact_copy(header.id)? {
                continue;
            }

            // prefer the newest copy whose seal verifies
            let (head, header) = self
                .newest_sealed_copy(&records[..=pos])?
                .unwrap_or((*head, *header));

            let footprint = layout.entry_len_in_flash(u32::from(header.len));
            let remaining = layout.sector_end(state.write_location) - state.write_location;
            if footprint + layout.record_overhead() > remaining {
                return Err(SfcbError::NoSpace);
            }

            self.flash.copy(head, state.write_location, footprint)?;
            state.write_location = layout.addr_advance(state.write_location, footprint);
            moved += 1;
        }

        debug!(
            sector = index,
            records = records.len(),
            moved,
            "garbage collected sector"
        );
        Ok(())
    }

    /// Picks the newest copy of the last record's id in `records` whose
    /// seal verifies.
    fn newest_sealed_copy(
        &self,
        records: &[(u32, DataHeader)],
    ) -> SfcbResult<Option<(u32, DataHeader)>> {
        let Some((_, last)) = records.last() else {
            return Ok(None);
        };
        let data_header_len = self.layout().data_header_len();
        for &(head, header) in records.iter().rev().filter(|(_, h)| h.id == last.id) {
            let entry = Entry {
                id: header.id,
                data_addr: head + data_header_len,
                len: header.len,
            };
            match self.check_crc(&entry) {
                Ok(()) => return Ok(Some((head, header))),
                Err(SfcbError::ChecksumMismatch { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Erases every sector and starts a fresh chain in sector 0.
    ///
    /// The handle stays mounted and usable; no re-mount is needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or a flash operation fails.
    pub fn clear(&self) -> SfcbResult<()> {
        let mut state = self.lock()?;
        for index in 0..self.layout().sector_count() {
            self.flash.erase_sector(index)?;
        }
        self.set_entry_sector(0);
        self.sector_init(&mut state, 0)?;
        info!("store cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::record::SectorState;
    use crate::{Entry, Sfcb, SfcbConfig, SfcbError};
    use sfcb_flash::RamFlash;
    use std::sync::Arc;

    fn store(sectors: u32, gc: bool) -> Sfcb<Arc<RamFlash>> {
        let flash = Arc::new(RamFlash::new(256, sectors, 4));
        Sfcb::mount(
            flash,
            SfcbConfig::new().sector_size(256).sector_count(sectors).gc(gc),
        )
        .unwrap()
    }

    #[test]
    fn rotate_writes_marker_and_inits_next() {
        let store = store(4, true);
        store.write_entry(1, b"one").unwrap();
        store.rotate().unwrap();

        assert_eq!(store.write_location().unwrap(), 256 + 8);
        assert_eq!(store.sector_state(1).unwrap(), SectorState::Active(2));
        let records = store.sector_records(0).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn gc_keeps_one_sector_free() {
        let store = store(4, true);
        for round in 0..3u8 {
            store.write_entry(u16::from(round), &[round; 8]).unwrap();
            store.rotate().unwrap();
        }

        // sector 0 was collected when sector 3 opened
        assert_eq!(store.entry_sector(), 1);
        assert_eq!(store.sector_state(0).unwrap(), SectorState::Blank);
        let entry = store.get_last_entry(0).unwrap();
        assert_eq!(store.layout().sector_index(entry.data_addr), 3);
        assert_eq!(store.read_entry(&entry).unwrap(), vec![0u8; 8]);
        store.check_crc(&entry).unwrap();
    }

    #[test]
    fn gc_skips_records_with_newer_copies() {
        let store = store(3, true);
        store.write_entry(1, b"stale").unwrap();
        store.rotate().unwrap();
        store.write_entry(1, b"fresh").unwrap();
        let before = store.write_location().unwrap();
        store.rotate().unwrap();

        // sector 0 collected into sector 2; its only record was superseded
        assert_eq!(store.write_location().unwrap(), 512 + 8);
        assert_eq!(store.entry_sector(), 1);
        let entry = store.get_last_entry(1).unwrap();
        assert_eq!(store.read_entry(&entry).unwrap(), b"fresh");
        assert!(before < 512);
    }

    #[test]
    fn gc_moves_only_newest_copy_within_sector() {
        let store = store(2, true);
        store.write_entry(7, b"v1").unwrap();
        store.write_entry(7, b"v2").unwrap();
        store.write_entry(8, b"other").unwrap();
        store.rotate().unwrap();

        let first = store.get_first_entry(7).unwrap();
        let last = store.get_last_entry(7).unwrap();
        assert_eq!(first, last);
        assert_eq!(store.read_entry(&last).unwrap(), b"v2");
        assert_eq!(store.get_last_entry(8).unwrap().len, 5);
        assert_eq!(store.entries().count(), 2);
    }

    #[test]
    fn gc_relocates_past_unsealed_copy() {
        let store = store(3, true);
        store.write_entry(1, b"old").unwrap();
        store.rotate().unwrap();
        // a newer copy whose write never completed
        let mut torn = Entry::new(1, 3);
        store.append(&mut torn).unwrap();
        store.rotate().unwrap();

        let last = store.get_last_entry(1).unwrap();
        assert_eq!(store.layout().sector_index(last.data_addr), 2);
        store.check_crc(&last).unwrap();
        assert_eq!(store.read_entry(&last).unwrap(), b"old");
    }

    #[test]
    fn gc_keeps_sealed_copy_over_later_torn_copy() {
        let store = store(3, true);
        store.write_entry(1, b"good").unwrap();
        // a later copy in the same sector that was never sealed
        let mut torn = Entry::new(1, 4);
        store.append(&mut torn).unwrap();
        store.rotate().unwrap();
        store.rotate().unwrap();

        assert_eq!(store.entry_sector(), 1);
        let last = store.get_last_entry(1).unwrap();
        assert_eq!(store.layout().sector_index(last.data_addr), 2);
        store.check_crc(&last).unwrap();
        assert_eq!(store.read_entry(&last).unwrap(), b"good");
    }

    #[test]
    fn gc_moves_torn_copy_when_nothing_is_sealed() {
        let store = store(3, true);
        let mut torn = Entry::new(1, 4);
        store.append(&mut torn).unwrap();
        store.rotate().unwrap();
        store.rotate().unwrap();

        let last = store.get_last_entry(1).unwrap();
        assert_eq!(store.layout().sector_index(last.data_addr), 2);
        assert!(matches!(
            store.check_crc(&last),
            Err(SfcbError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn no_gc_wrap_erases_oldest() {
        let store = store(2, false);
        store.write_entry(1, b"lost").unwrap();
        store.rotate().unwrap();
        store.write_entry(2, b"kept").unwrap();
        store.rotate().unwrap();

        assert_eq!(store.entry_sector(), 1);
        assert!(store.get_last_entry(1).unwrap_err().is_not_found());
        assert_eq!(store.read_entry(&store.get_last_entry(2).unwrap()).unwrap(), b"kept");
        assert_eq!(store.flash().erase_counts(), vec![1, 0]);
    }

    #[test]
    fn single_sector_without_gc() {
        let store = store(1, false);
        store.write_entry(1, b"a").unwrap();
        store.rotate().unwrap();
        assert_eq!(store.entry_sector(), 0);
        assert_eq!(store.write_location().unwrap(), 8);
        assert!(store.get_last_entry(1).is_err());
    }

    #[test]
    fn clear_restarts_chain() {
        let store = store(4, true);
        store.write_entry(1, b"a").unwrap();
        store.rotate().unwrap();
        store.write_entry(2, b"b").unwrap();
        store.clear().unwrap();

        assert_eq!(store.entry_sector(), 0);
        assert_eq!(store.write_location().unwrap(), 8);
        assert!(store.get_last_entry(1).is_err());
        assert!(store.get_last_entry(2).is_err());
        store.write_entry(3, b"c").unwrap();
        assert_eq!(store.get_last_entry(3).unwrap().len, 1);
    }
}
