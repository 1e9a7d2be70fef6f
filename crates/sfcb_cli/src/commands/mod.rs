//! CLI command implementations.

pub mod format;
pub mod inspect;
pub mod maintenance;
pub mod value;
pub mod verify;

use crate::GeometryArgs;
use sfcb_core::Sfcb;
use sfcb_flash::FileFlash;
use std::path::Path;

/// Result type shared by the commands.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens an existing image and mounts the store on it.
pub fn open_store(path: &Path, geometry: &GeometryArgs) -> CommandResult<Sfcb<FileFlash>> {
    if !path.exists() {
        return Err(format!("No image found at {:?}; run `sfcb format` first", path).into());
    }
    let flash = FileFlash::open(path, geometry.align)?;
    Ok(Sfcb::mount(flash, geometry.config())?)
}
