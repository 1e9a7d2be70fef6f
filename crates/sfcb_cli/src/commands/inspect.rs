//! Inspect command implementation.

use super::{open_store, CommandResult};
use crate::GeometryArgs;
use serde::Serialize;
use sfcb_core::{SectorState, Sfcb, SfcbError};
use sfcb_flash::FlashArea;
use std::collections::BTreeMap;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Image path.
    pub path: String,
    /// Sector size in bytes.
    pub sector_size: u32,
    /// Number of sectors.
    pub sector_count: u32,
    /// Write block size in bytes.
    pub write_block_size: u32,
    /// Whether garbage collection is enabled.
    pub gc: bool,
    /// Oldest sector of the chain.
    pub entry_sector: u32,
    /// Next free record slot.
    pub write_location: u32,
    /// Generation of the open sector.
    pub sector_id: u16,
    /// Per-sector state.
    pub sectors: Vec<SectorInfo>,
    /// Number of records in the chain, superseded copies included.
    pub record_count: usize,
    /// Number of distinct ids.
    pub id_count: usize,
    /// Records of the chain (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryInfo>>,
}

/// State of a single sector.
#[derive(Debug, Serialize)]
pub struct SectorInfo {
    /// Sector index.
    pub index: u32,
    /// `active`, `blank` or `foreign`.
    pub state: &'static str,
    /// Generation, for active sectors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u16>,
}

/// A single record of the chain.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Record id.
    pub id: u16,
    /// Payload address.
    pub data_addr: u32,
    /// Payload length.
    pub len: u16,
    /// Whether the seal verifies.
    pub sealed: bool,
    /// Whether a newer copy of the id follows.
    pub superseded: bool,
}

/// Runs the inspect command.
pub fn run(path: &Path, geometry: &GeometryArgs, show_entries: bool, format: &str) -> CommandResult {
    let store = open_store(path, geometry)?;
    let result = inspect(&store, &path.display().to_string(), show_entries)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the inspection result for a mounted store.
pub fn inspect<F: FlashArea>(
    store: &Sfcb<F>,
    path: &str,
    show_entries: bool,
) -> CommandResult<InspectResult> {
    let layout = store.layout();
    let sectors = store
        .sector_states()?
        .into_iter()
        .zip(0..)
        .map(|(state, index)| match state {
            SectorState::Active(id) => SectorInfo {
                index,
                state: "active",
                id: Some(id),
            },
            SectorState::Blank => SectorInfo {
                index,
                state: "blank",
                id: None,
            },
            SectorState::Foreign => SectorInfo {
                index,
                state: "foreign",
                id: None,
            },
        })
        .collect();

    let entries = collect_entries(store)?;
    let id_count = entries
        .iter()
        .map(|e| e.id)
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    Ok(InspectResult {
        path: path.to_string(),
        sector_size: layout.sector_size(),
        sector_count: layout.sector_count(),
        write_block_size: layout.write_block_size(),
        gc: store.config().gc,
        entry_sector: store.entry_sector(),
        write_location: store.write_location()?,
        sector_id: store.sector_id()?,
        sectors,
        record_count: entries.len(),
        id_count,
        entries: show_entries.then_some(entries),
    })
}

/// Lists every record of the chain with its seal status.
pub fn collect_entries<F: FlashArea>(store: &Sfcb<F>) -> CommandResult<Vec<EntryInfo>> {
    let mut entries = Vec::new();
    let mut newest: BTreeMap<u16, usize> = BTreeMap::new();

    for entry in store.entries() {
        let entry = entry?;
        let sealed = match store.check_crc(&entry) {
            Ok(()) => true,
            Err(SfcbError::ChecksumMismatch { .. }) => false,
            Err(e) => return Err(e.into()),
        };
        newest.insert(entry.id, entries.len());
        entries.push(EntryInfo {
            id: entry.id,
            data_addr: entry.data_addr,
            len: entry.len,
            sealed,
            superseded: true,
        });
    }
    for index in newest.into_values() {
        entries[index].superseded = false;
    }
    Ok(entries)
}

fn print_text_output(result: &InspectResult) {
    println!("SFCB Image: {}", result.path);
    println!();
    println!(
        "Layout:         {} x {} bytes, write block {} bytes",
        result.sector_count, result.sector_size, result.write_block_size
    );
    println!("GC:             {}", if result.gc { "enabled" } else { "disabled" });
    println!("Entry sector:   {}", result.entry_sector);
    println!("Write location: {:#x}", result.write_location);
    println!("Sector id:      {}", result.sector_id);
    println!("Records:        {} ({} ids)", result.record_count, result.id_count);
    println!();
    println!("Sectors:");
    for sector in &result.sectors {
        match sector.id {
            Some(id) => println!("  {:>3}: {} (id {})", sector.index, sector.state, id),
            None => println!("  {:>3}: {}", sector.index, sector.state),
        }
    }

    if let Some(entries) = &result.entries {
        println!();
        println!("Entries:");
        for entry in entries {
            println!(
                "  {:#06x} @ {:#08x} {:>5} bytes{}{}",
                entry.id,
                entry.data_addr,
                entry.len,
                if entry.sealed { "" } else { " UNSEALED" },
                if entry.superseded { " (superseded)" } else { "" },
            );
        }
    }
}
