//! Crash recovery tests with power cuts injected into rotation and GC.

use sfcb_core::{SectorState, Sfcb, SfcbError};
use sfcb_flash::{FlashError, RamFlash};
use sfcb_testkit::prelude::*;
use std::sync::Arc;

const GEOMETRY: Geometry = Geometry::SMALL;

fn long_value() -> Vec<u8> {
    // spans two relocation chunks
    (0..40u8).collect()
}

/// Three active sectors; the next rotation collects sector 0.
///
/// Sector 0 holds ids 1, 2 and 3, of which only 2 has a newer copy.
fn prepared_image() -> (Vec<u8>, Model) {
    let test_store = TestStore::new(GEOMETRY, true);
    let mut model = Model::default();
    let mut put = |id: u16, value: &[u8]| {
        test_store.write_entry(id, value).unwrap();
        model.write(id, value);
    };

    put(1, &long_value());
    put(2, b"b");
    put(3, b"c");
    test_store.rotate().unwrap();
    put(2, b"b2");
    test_store.rotate().unwrap();
    put(4, b"d");

    assert_eq!(
        test_store.sector_states().unwrap()[3],
        SectorState::Blank,
        "the prepared image keeps one sector erased"
    );
    (test_store.flash.data(), model)
}

fn mount_with_cut(image: &[u8]) -> (Arc<RamFlash>, Sfcb<PowerCutFlash<Arc<RamFlash>>>) {
    let ram = Arc::new(RamFlash::with_data(
        image.to_vec(),
        GEOMETRY.sector_size,
        GEOMETRY.write_block_size,
    ));
    let store = Sfcb::mount(PowerCutFlash::new(Arc::clone(&ram)), GEOMETRY.config(true)).unwrap();
    (ram, store)
}

fn assert_matches_model(store: &Sfcb<Arc<RamFlash>>, model: &Model) {
    let mut report = ChurnReport::default();
    model.verify(store, &mut report).unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.lost, 0);
}

#[test]
fn gc_interrupted_before_final_erase_is_resumed() {
    let (image, model) = prepared_image();
    let (ram, store) = mount_with_cut(&image);

    store.flash().arm(0, CutOn::Erase);
    assert!(matches!(
        store.rotate(),
        Err(SfcbError::Flash(FlashError::Device(_)))
    ));
    drop(store);

    // every sector carries the magic while the collection is unfinished
    let states: Vec<_> = TestStore::mount(Arc::clone(&ram), GEOMETRY.config(false))
        .sector_states()
        .unwrap();
    assert!(states.iter().all(|s| s.is_active()), "{states:?}");

    let store = Sfcb::mount(Arc::clone(&ram), GEOMETRY.config(true)).unwrap();
    assert_eq!(store.entry_sector(), 1);
    assert_eq!(store.sector_state(0).unwrap(), SectorState::Blank);
    assert_matches_model(&store, &model);

    // relocated records were not copied a second time
    let ids: Vec<u16> = store.entries().map(|e| e.unwrap().id).collect();
    assert_eq!(ids, vec![2, 4, 1, 3]);
}

#[test]
fn power_cut_at_every_mutation_of_a_gc_rotation() {
    let (image, model) = prepared_image();
    let mut cut_points = 0;

    for budget in 0.. {
        let (ram, store) = mount_with_cut(&image);
        store.flash().cut_after(budget);
        let result = store.rotate();
        let tripped = store.flash().tripped();
        drop(store);

        let recovered = Sfcb::mount(Arc::clone(&ram), GEOMETRY.config(true)).unwrap();
        assert_matches_model(&recovered, &model);

        // the recovered store keeps working
        recovered.write_entry(5, b"after").unwrap();
        recovered.rotate().unwrap();
        assert_eq!(read_last(&recovered, 5).unwrap(), b"after");
        assert_matches_model(&recovered, &model);

        if !tripped {
            result.unwrap();
            break;
        }
        assert!(result.is_err());
        cut_points += 1;
    }

    // marker, header, three relocation chunks, erase
    assert_eq!(cut_points, 6);
}

#[test]
fn power_cut_during_rotation_without_gc() {
    let test_store = TestStore::new(Geometry { sector_count: 2, ..GEOMETRY }, false);
    test_store.write_entry(1, b"old").unwrap();
    test_store.rotate().unwrap();
    test_store.write_entry(2, b"kept").unwrap();
    let image = test_store.flash.data();
    let config = test_store.config;

    for budget in 0..3 {
        let ram = Arc::new(RamFlash::with_data(
            image.clone(),
            GEOMETRY.sector_size,
            GEOMETRY.write_block_size,
        ));
        let store = Sfcb::mount(PowerCutFlash::new(Arc::clone(&ram)), config).unwrap();
        store.flash().cut_after(budget);
        assert!(store.rotate().is_err());
        drop(store);

        let recovered = Sfcb::mount(Arc::clone(&ram), config).unwrap();
        assert_eq!(read_last(&recovered, 2).unwrap(), b"kept");
        match read_last(&recovered, 1) {
            Some(value) => assert_eq!(value, b"old"),
            None => assert!(recovered.get_last_entry(1).unwrap_err().is_not_found()),
        }
        recovered.write_entry(3, b"new").unwrap();
        assert_eq!(read_last(&recovered, 3).unwrap(), b"new");
    }
}

#[test]
fn interrupted_append_leaves_unsealed_record() {
    let (image, model) = prepared_image();
    let (ram, store) = mount_with_cut(&image);

    // header lands, payload and seal do not
    store.flash().cut_after(1);
    assert!(store.write_entry(4, b"lost update").is_err());
    drop(store);

    let store = Sfcb::mount(Arc::clone(&ram), GEOMETRY.config(true)).unwrap();
    let torn = store.get_last_entry(4).unwrap();
    assert_eq!(torn.len, 11);
    assert!(matches!(
        store.check_crc(&torn),
        Err(SfcbError::ChecksumMismatch { .. })
    ));

    // the previous value is still the first copy
    let previous = store.get_first_entry(4).unwrap();
    store.check_crc(&previous).unwrap();
    assert_eq!(
        store.read_entry(&previous).unwrap(),
        model.get(4).unwrap()
    );

    store.write_entry(4, b"retry").unwrap();
    assert_eq!(read_last(&store, 4).unwrap(), b"retry");
}
