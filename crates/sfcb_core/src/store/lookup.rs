//! Entry walker and lookups.
//!
//! The chain is read strictly forward from the entry sector. Inside a
//! sector, records follow each other back to back; an end marker sends the
//! walk to the next sector; an erased header ends the chain. Because the
//! walk only moves forward, the last match seen is the newest copy.

use super::Sfcb;
use crate::error::{SfcbError, SfcbResult};
use crate::record::{DataHeader, DATA_HEADER_SIZE};
use crate::types::{is_reserved_id, Entry};
use sfcb_flash::FlashArea;

/// Where a walk of the chain stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainEnd {
    /// An erased header at this address.
    Empty(u32),
    /// An end marker led into this sector, which is not part of the store.
    Unclaimed(u32),
    /// An end marker led back into the first sector of the walk.
    Wrapped(u32),
}

/// One step of a chain walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChainStep {
    /// A user record with its header address.
    Record { head: u32, header: DataHeader },
    /// The chain ended.
    End(ChainEnd),
}

impl<F: FlashArea> Sfcb<F> {
    pub(crate) fn read_data_header(&self, head: u32) -> SfcbResult<DataHeader> {
        let mut raw = [0u8; DATA_HEADER_SIZE];
        self.flash.read(head, &mut raw)?;
        Ok(DataHeader::decode(&raw))
    }

    /// Rejects user records that would not leave room for an end marker.
    fn check_record(&self, head: u32, header: &DataHeader) -> SfcbResult<()> {
        let layout = self.layout();
        let end = u64::from(head)
            + u64::from(layout.entry_len_in_flash(u32::from(header.len)))
            + u64::from(layout.record_overhead());
        if end > u64::from(layout.sector_end(head)) {
            return Err(SfcbError::corrupted(
                head,
                format!(
                    "record {:#06x} of {} bytes overruns its sector",
                    header.id, header.len
                ),
            ));
        }
        Ok(())
    }

    /// Reads the record at `head`, following end markers, for a walk that
    /// began in sector `start`.
    pub(crate) fn chain_step(&self, mut head: u32, start: u32) -> SfcbResult<ChainStep> {
        let layout = *self.layout();
        loop {
            let header = self.read_data_header(head)?;
            if header.is_empty() {
                return Ok(ChainStep::End(ChainEnd::Empty(head)));
            }
            if header.is_sector_end() {
                let next = layout.next_sector(layout.sector_index(head));
                if next == start {
                    return Ok(ChainStep::End(ChainEnd::Wrapped(next)));
                }
                if !self.sector_state(next)?.is_active() {
                    return Ok(ChainStep::End(ChainEnd::Unclaimed(next)));
                }
                head = layout.data_start(next);
                continue;
            }
            self.check_record(head, &header)?;
            return Ok(ChainStep::Record { head, header });
        }
    }

    /// Walks the whole chain from sector `start` to where it ends.
    pub(crate) fn locate_write_cursor(&self, start: u32) -> SfcbResult<ChainEnd> {
        let layout = *self.layout();
        let mut head = layout.data_start(start);
        loop {
            match self.chain_step(head, start)? {
                ChainStep::Record { head: at, header } => {
                    head = at + layout.entry_len_in_flash(u32::from(header.len));
                }
                ChainStep::End(end) => return Ok(end),
            }
        }
    }

    /// Lists the user records of one sector, without following its end
    /// marker.
    pub(crate) fn sector_records(&self, index: u32) -> SfcbResult<Vec<(u32, DataHeader)>> {
        let layout = *self.layout();
        let mut head = layout.data_start(index);
        let mut records = Vec::new();
        loop {
            let header = self.read_data_header(head)?;
            if header.is_empty() || header.is_sector_end() {
                return Ok(records);
            }
            self.check_record(head, &header)?;
            records.push((head, header));
            head += layout.entry_len_in_flash(u32::from(header.len));
        }
    }

    /// Positions `entry` on the first record of the entry sector.
    ///
    /// The id is kept; the length is reset.
    pub fn set_start_entry(&self, entry: &mut Entry) {
        let layout = self.layout();
        entry.data_addr = layout.data_start(self.entry_sector()) + layout.data_header_len();
        entry.len = 0;
    }

    /// Finds the next record with `entry.id`, starting with the record
    /// `entry` is positioned on.
    ///
    /// On success `entry.data_addr` and `entry.len` describe the match.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::NotFound`] when the chain ends without a match,
    /// [`SfcbError::InvalidArguments`] for a reserved id or a position
    /// outside the area, and [`SfcbError::Corrupted`] for malformed framing.
    pub fn walk_entry(&self, entry: &mut Entry) -> SfcbResult<()> {
        if is_reserved_id(entry.id) {
            return Err(SfcbError::invalid_arguments(format!(
                "id {:#06x} is reserved",
                entry.id
            )));
        }
        let layout = *self.layout();
        if entry.data_addr < layout.data_header_len() {
            return Err(SfcbError::invalid_arguments(format!(
                "entry position {:#x} precedes the area",
                entry.data_addr
            )));
        }

        let start = self.entry_sector();
        let mut head = layout.head_addr_in_flash(entry);
        loop {
            match self.chain_step(head, start)? {
                ChainStep::Record { head: at, header } if header.id == entry.id => {
                    entry.data_addr = at + layout.data_header_len();
                    entry.len = header.len;
                    return Ok(());
                }
                ChainStep::Record { head: at, header } => {
                    head = at + layout.entry_len_in_flash(u32::from(header.len));
                }
                ChainStep::End(_) => return Err(SfcbError::NotFound { id: entry.id }),
            }
        }
    }

    /// Finds the oldest surviving record with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::NotFound`] if no record has the id.
    pub fn get_first_entry(&self, id: u16) -> SfcbResult<Entry> {
        let mut entry = Entry::new(id, 0);
        self.set_start_entry(&mut entry);
        self.walk_entry(&mut entry)?;
        Ok(entry)
    }

    /// Returns true if the chain holds a copy of `id` whose seal verifies.
    pub(crate) fn has_intact_copy(&self, id: u16) -> SfcbResult<bool> {
        let layout = *self.layout();
        let mut cursor = Entry::new(id, 0);
        self.set_start_entry(&mut cursor);
        loop {
            match self.walk_entry(&mut cursor) {
                Ok(()) => {}
                Err(SfcbError::NotFound { .. }) => return Ok(false),
                Err(e) => return Err(e),
            }
            match self.check_crc(&cursor) {
                Ok(()) => return Ok(true),
                Err(SfcbError::ChecksumMismatch { .. }) => {}
                Err(e) => return Err(e),
            }
            cursor.data_addr = layout.next_head_addr(&cursor) + layout.data_header_len();
        }
    }

    /// Finds the newest record with `id`. This is the read path.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::NotFound`] if no record has the id.
    pub fn get_last_entry(&self, id: u16) -> SfcbResult<Entry> {
        let mut latest = self.get_first_entry(id)?;
        let layout = *self.layout();
        loop {
            let mut cursor = latest;
            cursor.data_addr = layout.next_head_addr(&latest) + layout.data_header_len();
            match self.walk_entry(&mut cursor) {
                Ok(()) => latest = cursor,
                Err(SfcbError::NotFound { .. }) => return Ok(latest),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DataHeader;
    use crate::SfcbConfig;
    use sfcb_flash::RamFlash;
    use std::sync::Arc;

    fn store() -> Sfcb<Arc<RamFlash>> {
        let flash = Arc::new(RamFlash::new(256, 4, 4));
        Sfcb::mount(flash, SfcbConfig::new().sector_size(256).sector_count(4)).unwrap()
    }

    #[test]
    fn lookup_missing_id() {
        let store = store();
        assert!(matches!(
            store.get_last_entry(42),
            Err(SfcbError::NotFound { id: 42 })
        ));
    }

    #[test]
    fn first_and_last_copies() {
        let store = store();
        store.write_entry(1, b"old").unwrap();
        store.write_entry(2, b"other").unwrap();
        store.write_entry(1, b"new!").unwrap();

        let first = store.get_first_entry(1).unwrap();
        let last = store.get_last_entry(1).unwrap();
        assert_eq!(store.read_entry(&first).unwrap(), b"old");
        assert_eq!(store.read_entry(&last).unwrap(), b"new!");
        assert_eq!(last.len, 4);
    }

    #[test]
    fn lookup_follows_sector_end() {
        let store = store();
        store.write_entry(1, b"first").unwrap();
        store.rotate().unwrap();
        store.write_entry(1, b"second").unwrap();
        store.rotate().unwrap();
        store.write_entry(3, b"third").unwrap();

        let last = store.get_last_entry(1).unwrap();
        assert_eq!(store.layout().sector_index(last.data_addr), 1);
        assert_eq!(store.read_entry(&last).unwrap(), b"second");
        assert_eq!(store.get_first_entry(3).unwrap().len, 5);
    }

    #[test]
    fn walk_continues_from_position() {
        let store = store();
        let a = store.write_entry(5, b"a").unwrap();
        store.write_entry(5, b"b").unwrap();

        let mut cursor = Entry::new(5, 0);
        store.set_start_entry(&mut cursor);
        store.walk_entry(&mut cursor).unwrap();
        assert_eq!(cursor, a);

        cursor.data_addr = store.layout().next_head_addr(&cursor) + 4;
        store.walk_entry(&mut cursor).unwrap();
        assert_eq!(store.read_entry(&cursor).unwrap(), b"b");

        cursor.data_addr = store.layout().next_head_addr(&cursor) + 4;
        assert!(store.walk_entry(&mut cursor).unwrap_err().is_not_found());
    }

    #[test]
    fn walk_rejects_reserved_id() {
        let store = store();
        let mut entry = Entry::new(crate::types::ID_EMPTY, 0);
        store.set_start_entry(&mut entry);
        assert!(matches!(
            store.walk_entry(&mut entry),
            Err(SfcbError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn overrunning_record_is_corruption() {
        let store = store();
        let location = store.write_location().unwrap();
        store
            .adapter()
            .write(location, &DataHeader { id: 9, len: 4000 }.encode())
            .unwrap();

        assert!(matches!(
            store.get_first_entry(9),
            Err(SfcbError::Corrupted { .. })
        ));
    }

    #[test]
    fn sector_records_stop_at_marker() {
        let store = store();
        store.write_entry(1, b"x").unwrap();
        store.write_entry(2, b"y").unwrap();
        store.rotate().unwrap();
        store.write_entry(3, b"z").unwrap();

        let ids: Vec<u16> = store
            .sector_records(0)
            .unwrap()
            .iter()
            .map(|(_, h)| h.id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn cursor_lands_on_first_erased_header() {
        let store = store();
        store.write_entry(1, b"abc").unwrap();
        assert_eq!(
            store.locate_write_cursor(0).unwrap(),
            ChainEnd::Empty(store.write_location().unwrap())
        );
    }
}
