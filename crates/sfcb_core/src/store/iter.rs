//! Iteration over every record of the chain.

use super::lookup::ChainStep;
use super::Sfcb;
use crate::error::SfcbResult;
use crate::types::Entry;
use sfcb_flash::FlashArea;

/// Iterator over all records from the oldest to the newest.
///
/// Superseded copies are yielded too; the last record seen for an id is its
/// current value. The iterator stops after the first error.
pub struct EntryIter<'a, F: FlashArea> {
    store: &'a Sfcb<F>,
    head: u32,
    start: u32,
    done: bool,
}

impl<'a, F: FlashArea> EntryIter<'a, F> {
    fn new(store: &'a Sfcb<F>) -> Self {
        let start = store.entry_sector();
        Self {
            store,
            head: store.layout().data_start(start),
            start,
            done: false,
        }
    }
}

impl<F: FlashArea> Iterator for EntryIter<'_, F> {
    type Item = SfcbResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let layout = *self.store.layout();
        match self.store.chain_step(self.head, self.start) {
            Ok(ChainStep::Record { head, header }) => {
                self.head = head + layout.entry_len_in_flash(u32::from(header.len));
                Some(Ok(Entry {
                    id: header.id,
                    data_addr: head + layout.data_header_len(),
                    len: header.len,
                }))
            }
            Ok(ChainStep::End(_)) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<F: FlashArea> std::iter::FusedIterator for EntryIter<'_, F> {}

impl<F: FlashArea> Sfcb<F> {
    /// Iterates every record of the chain, oldest first.
    pub fn entries(&self) -> EntryIter<'_, F> {
        EntryIter::new(self)
    }
}
