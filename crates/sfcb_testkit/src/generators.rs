//! Property-based test generators using proptest.
//!
//! Provides strategies for generating store geometries, ids and payloads
//! that respect the store's limits.

use crate::fixtures::Geometry;
use proptest::prelude::*;
use sfcb_core::{Layout, ID_SECTOR_END};

/// Strategy for generating user ids (never a reserved id).
pub fn user_id_strategy() -> impl Strategy<Value = u16> {
    0..ID_SECTOR_END
}

/// Strategy for ids drawn from a small recurring set, so that later
/// writes supersede earlier ones.
pub fn recurring_id_strategy(distinct: u16) -> impl Strategy<Value = u16> {
    0..distinct.max(1)
}

/// Strategy for payloads of `1..=max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max_len.max(1))
}

/// Strategy for flash geometries small enough to rotate often.
pub fn geometry_strategy() -> impl Strategy<Value = Geometry> {
    (
        prop::sample::select(vec![128u32, 256, 512, 1024]),
        2u32..=8,
        prop::sample::select(vec![1u32, 2, 4, 8, 16]),
    )
        .prop_map(|(sector_size, sector_count, write_block_size)| Geometry {
            sector_size,
            sector_count,
            write_block_size,
        })
}

/// Strategy for payload lengths valid for `geometry`.
pub fn entry_len_strategy(geometry: Geometry) -> impl Strategy<Value = u16> {
    let layout = Layout::new(
        geometry.sector_size,
        geometry.sector_count,
        geometry.write_block_size,
    );
    let max = u16::try_from(layout.max_entry_len()).unwrap_or(u16::MAX);
    1..=max.max(1)
}

/// One step of a generated workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Write a value.
    Write {
        /// Record id.
        id: u16,
        /// Payload.
        data: Vec<u8>,
    },
    /// Close the open sector.
    Rotate,
}

/// Strategy for workloads over `distinct` ids with payloads up to
/// `max_len` bytes.
pub fn store_ops_strategy(
    distinct: u16,
    max_len: usize,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<StoreOp>> {
    let op = prop_oneof![
        4 => (recurring_id_strategy(distinct), payload_strategy(max_len))
            .prop_map(|(id, data)| StoreOp::Write { id, data }),
        1 => Just(StoreOp::Rotate),
    ];
    prop::collection::vec(op, len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_user_ids_are_not_reserved() {
        let mut runner = TestRunner::default();
        for _ in 0..200 {
            let id = user_id_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(!sfcb_core::is_reserved_id(id));
        }
    }

    #[test]
    fn test_geometries_are_valid() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let geometry = geometry_strategy().new_tree(&mut runner).unwrap().current();
            geometry
                .config(true)
                .validate(geometry.write_block_size, geometry.sector_size * geometry.sector_count)
                .unwrap();
        }
    }
}
