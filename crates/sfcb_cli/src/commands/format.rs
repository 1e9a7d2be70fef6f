//! Format command implementation.

use super::CommandResult;
use crate::GeometryArgs;
use sfcb_core::Sfcb;
use sfcb_flash::FileFlash;
use std::path::Path;
use tracing::info;

/// Runs the format command.
pub fn run(path: &Path, geometry: &GeometryArgs, force: bool) -> CommandResult {
    if path.exists() && !force {
        return Err(format!("{:?} already exists; pass --force to overwrite", path).into());
    }

    let size = geometry
        .sector_size
        .checked_mul(geometry.sector_count)
        .ok_or("image size does not fit in 32 bits")?;
    // validate before touching the file
    geometry.config().validate(geometry.align, size)?;

    let flash = FileFlash::create(path, size, geometry.align)?;
    let store = Sfcb::mount(flash, geometry.config())?;
    store.flash().sync()?;
    info!(path = %path.display(), size, "image formatted");

    println!("Formatted {:?}", path);
    println!("  Sectors:     {} x {} bytes", geometry.sector_count, geometry.sector_size);
    println!("  Write block: {} bytes", geometry.align);
    println!("  Max entry:   {} bytes", store.layout().max_entry_len());
    Ok(())
}
