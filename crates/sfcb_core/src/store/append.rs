//! Append engine.
//!
//! Appending is a two-phase protocol:
//!
//! 1. [`Sfcb::append`] reserves space and writes the data header
//! 2. The caller programs the payload at `entry.data_addr`
//! 3. [`Sfcb::append_close`] seals the payload with its CRC16
//!
//! The header always lands before the payload and the seal, so a reader
//! racing a writer sees either no record or a complete header.

use super::Sfcb;
use crate::error::{SfcbError, SfcbResult};
use crate::record::{DataHeader, Seal, SEAL_SIZE};
use crate::types::{is_reserved_id, Entry};
use sfcb_flash::FlashArea;
use tracing::debug;

impl<F: FlashArea> Sfcb<F> {
    fn check_appendable(&self, entry: &Entry) -> SfcbResult<()> {
        if is_reserved_id(entry.id) {
            return Err(SfcbError::invalid_arguments(format!(
                "id {:#06x} is reserved",
                entry.id
            )));
        }
        if entry.len == 0 {
            return Err(SfcbError::invalid_arguments("entry length must be positive"));
        }
        let max = self.layout().max_entry_len();
        if u32::from(entry.len) > max {
            return Err(SfcbError::invalid_arguments(format!(
                "entry of {} bytes exceeds the {max} byte sector capacity",
                entry.len
            )));
        }
        Ok(())
    }

    /// Reserves space for `entry` and writes its data header.
    ///
    /// On success `entry.data_addr` points at the reserved payload area.
    /// The payload is not written; program it with
    /// [`Sfcb::write_payload`] (or [`Sfcb::flash_write`]) and then call
    /// [`Sfcb::append_close`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The id is reserved, the length is zero or larger than a sector
    ///   can hold ([`SfcbError::InvalidArguments`])
    /// - The open sector cannot fit the record plus one more header and
    ///   seal ([`SfcbError::NoSpace`]); rotate and retry
    /// - The store lock times out or the flash fails
    pub fn append(&self, entry: &mut Entry) -> SfcbResult<()> {
        self.check_appendable(entry)?;
        let mut state = self.lock()?;
        let layout = *self.layout();

        let footprint = layout.entry_len_in_flash(u32::from(entry.len));
        let remaining = layout.sector_end(state.write_location) - state.write_location;
        if footprint + layout.record_overhead() > remaining {
            return Err(SfcbError::NoSpace);
        }

        let header = DataHeader {
            id: entry.id,
            len: entry.len,
        };
        self.flash.write_padded(state.write_location, &header.encode())?;

        entry.data_addr = state.write_location + layout.data_header_len();
        state.write_location = layout.addr_advance(state.write_location, footprint);
        Ok(())
    }

    /// Programs the payload of an appended entry.
    ///
    /// The tail is padded with `0xFF` to the write block size.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::InvalidArguments`] if `data` does not match
    /// `entry.len`, or a flash error.
    pub fn write_payload(&self, entry: &Entry, data: &[u8]) -> SfcbResult<()> {
        if data.len() != usize::from(entry.len) {
            return Err(SfcbError::invalid_arguments(format!(
                "payload of {} bytes for an entry of {} bytes",
                data.len(),
                entry.len
            )));
        }
        self.flash.write_padded(entry.data_addr, data)
    }

    /// Seals an appended entry with the CRC16 of its payload.
    ///
    /// Call exactly once per successful [`Sfcb::append`], after the payload
    /// has been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or the flash fails.
    pub fn append_close(&self, entry: &Entry) -> SfcbResult<()> {
        let _state = self.lock()?;
        let crc = self.flash.crc16(entry.data_addr, u32::from(entry.len))?;
        let seal = Seal::new(crc);
        self.flash
            .write_padded(self.layout().slt_addr_in_flash(entry), &seal.encode())
    }

    /// Verifies the seal of `entry` against its payload.
    ///
    /// # Errors
    ///
    /// Returns [`SfcbError::ChecksumMismatch`] if the seal is missing or
    /// does not match, or a flash error.
    pub fn check_crc(&self, entry: &Entry) -> SfcbResult<()> {
        let actual = self.flash.crc16(entry.data_addr, u32::from(entry.len))?;
        let mut raw = [0u8; SEAL_SIZE];
        self.flash
            .read(self.layout().slt_addr_in_flash(entry), &mut raw)?;
        let seal = Seal::decode(&raw);

        if !seal.sealed || seal.crc != actual {
            return Err(SfcbError::ChecksumMismatch {
                expected: seal.crc,
                actual,
            });
        }
        Ok(())
    }

    /// Reads the payload of `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not address a valid range.
    pub fn read_entry(&self, entry: &Entry) -> SfcbResult<Vec<u8>> {
        let mut buf = vec![0u8; usize::from(entry.len)];
        self.flash.read(entry.data_addr, &mut buf)?;
        Ok(buf)
    }

    /// Appends, writes and seals `data` under `id` in one call.
    ///
    /// If the open sector is full the store is rotated once and the append
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; [`SfcbError::NoSpace`] after a
    /// rotation means garbage collection could not free room.
    pub fn write_entry(&self, id: u16, data: &[u8]) -> SfcbResult<Entry> {
        let len = u16::try_from(data.len()).map_err(|_| {
            SfcbError::invalid_arguments(format!("payload of {} bytes", data.len()))
        })?;
        let mut entry = Entry::new(id, len);

        match self.append(&mut entry) {
            Err(SfcbError::NoSpace) => {
                debug!(id, len, "sector full, rotating before append");
                self.rotate()?;
                self.append(&mut entry)?;
            }
            other => other?,
        }

        self.write_payload(&entry, data)?;
        self.append_close(&entry)?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SfcbError;
    use crate::types::{Entry, ID_EMPTY, ID_SECTOR_END};
    use crate::{Sfcb, SfcbConfig};
    use sfcb_flash::RamFlash;
    use std::sync::Arc;

    fn store(wbs: u32) -> Sfcb<Arc<RamFlash>> {
        let flash = Arc::new(RamFlash::new(256, 4, wbs));
        Sfcb::mount(flash, SfcbConfig::new().sector_size(256).sector_count(4)).unwrap()
    }

    #[test]
    fn append_reserves_and_advances() {
        let store = store(4);
        let start = store.write_location().unwrap();
        let mut entry = Entry::new(7, 10);
        store.append(&mut entry).unwrap();

        assert_eq!(entry.data_addr, start + 4);
        assert_eq!(
            store.write_location().unwrap(),
            start + store.layout().entry_len_in_flash(10)
        );
    }

    #[test]
    fn append_write_close_roundtrip() {
        let store = store(4);
        let mut entry = Entry::new(1, 10);
        store.append(&mut entry).unwrap();
        store.write_payload(&entry, b"0123456789").unwrap();
        store.append_close(&entry).unwrap();

        store.check_crc(&entry).unwrap();
        assert_eq!(store.read_entry(&entry).unwrap(), b"0123456789");
    }

    #[test]
    fn unsealed_entry_fails_crc() {
        let store = store(4);
        let mut entry = Entry::new(1, 4);
        store.append(&mut entry).unwrap();
        store.write_payload(&entry, b"abcd").unwrap();

        assert!(matches!(
            store.check_crc(&entry),
            Err(SfcbError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let store = store(1);
        let entry = store.write_entry(5, b"payload").unwrap();
        store.flash().poke(entry.data_addr + 2, b"X");

        assert!(matches!(
            store.check_crc(&entry),
            Err(SfcbError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn append_rejects_reserved_ids_and_empty() {
        let store = store(4);
        for id in [ID_EMPTY, ID_SECTOR_END] {
            let mut entry = Entry::new(id, 4);
            assert!(matches!(
                store.append(&mut entry),
                Err(SfcbError::InvalidArguments { .. })
            ));
        }
        let mut entry = Entry::new(3, 0);
        assert!(store.append(&mut entry).is_err());
    }

    #[test]
    fn append_rejects_entries_larger_than_a_sector() {
        let store = store(4);
        let mut entry = Entry::new(3, 250);
        assert!(matches!(
            store.append(&mut entry),
            Err(SfcbError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn append_reports_no_space_with_headroom() {
        let store = store(4);
        let max = store.layout().max_entry_len() as u16;
        let mut big = Entry::new(1, max);
        store.append(&mut big).unwrap();

        let mut entry = Entry::new(2, 1);
        assert!(matches!(store.append(&mut entry), Err(SfcbError::NoSpace)));
        // the end marker still fits
        let location = store.write_location().unwrap();
        let left = store.layout().sector_end(location) - location;
        assert_eq!(left, store.layout().record_overhead());
    }

    #[test]
    fn write_payload_length_must_match() {
        let store = store(4);
        let mut entry = Entry::new(1, 4);
        store.append(&mut entry).unwrap();
        assert!(store.write_payload(&entry, b"abc").is_err());
    }

    #[test]
    fn write_entry_rotates_when_full() {
        let store = store(4);
        let max = store.layout().max_entry_len() as usize;
        store.write_entry(1, &vec![0xAB; max]).unwrap();
        let entry = store.write_entry(2, b"next").unwrap();

        assert_eq!(store.layout().sector_index(entry.data_addr), 1);
        assert_eq!(store.read_entry(&entry).unwrap(), b"next");
    }
}
