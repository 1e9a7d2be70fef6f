//! Rotate and clear command implementations.

use super::{open_store, CommandResult};
use crate::GeometryArgs;
use std::path::Path;

/// Closes the open sector.
pub fn rotate(path: &Path, geometry: &GeometryArgs) -> CommandResult {
    let store = open_store(path, geometry)?;
    let from = store.layout().sector_index(store.write_location()?);
    store.rotate()?;
    store.flash().sync()?;

    let to = store.layout().sector_index(store.write_location()?);
    println!(
        "Rotated sector {} -> {} (entry sector {})",
        from,
        to,
        store.entry_sector()
    );
    Ok(())
}

/// Erases every sector and re-initializes the store.
pub fn clear(path: &Path, geometry: &GeometryArgs) -> CommandResult {
    let store = open_store(path, geometry)?;
    store.clear()?;
    store.flash().sync()?;
    println!("Cleared {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{format, value};
    use sfcb_core::DEFAULT_MAGIC;

    fn geometry() -> GeometryArgs {
        GeometryArgs {
            sector_size: 256,
            sector_count: 4,
            align: 4,
            magic: DEFAULT_MAGIC,
            no_gc: false,
        }
    }

    #[test]
    fn test_rotate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        format::run(&path, &geometry(), false).unwrap();
        value::put(&path, &geometry(), 1, "one", false).unwrap();

        rotate(&path, &geometry()).unwrap();
        let store = open_store(&path, &geometry()).unwrap();
        assert_eq!(store.layout().sector_index(store.write_location().unwrap()), 1);
        drop(store);

        clear(&path, &geometry()).unwrap();
        let store = open_store(&path, &geometry()).unwrap();
        assert!(store.get_last_entry(1).is_err());
        assert_eq!(store.entry_sector(), 0);
    }
}
