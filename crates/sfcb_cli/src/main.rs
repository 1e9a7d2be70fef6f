//! SFCB CLI
//!
//! Command-line tools for SFCB flash images.
//!
//! # Commands
//!
//! - `format` - Create an erased image and initialize the store
//! - `inspect` - Display sector states and records
//! - `verify` - Check the seal of every record
//! - `get` / `put` - Read or write a value by id
//! - `rotate` - Close the open sector
//! - `clear` - Erase the store
//!
//! Every command except `format` mounts the image, which repairs a
//! rotation or garbage collection interrupted by power loss.

mod commands;

use clap::{Args, Parser, Subcommand};
use sfcb_core::{SfcbConfig, DEFAULT_MAGIC};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SFCB flash image tools.
#[derive(Parser)]
#[command(name = "sfcb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the flash image file
    #[arg(global = true, short = 'p', long = "image")]
    image: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(flatten)]
    geometry: GeometryArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Layout of the store inside the image.
#[derive(Args, Debug, Clone, Copy)]
pub struct GeometryArgs {
    /// Sector size in bytes
    #[arg(global = true, long, default_value_t = 4096)]
    pub sector_size: u32,

    /// Number of sectors
    #[arg(global = true, long, default_value_t = 4)]
    pub sector_count: u32,

    /// Write block size of the device in bytes
    #[arg(global = true, long, default_value_t = 4)]
    pub align: u32,

    /// Sector magic (decimal or 0x-prefixed hex)
    #[arg(global = true, long, default_value_t = DEFAULT_MAGIC, value_parser = parse_u32)]
    pub magic: u32,

    /// Disable garbage collection
    #[arg(global = true, long)]
    pub no_gc: bool,
}

impl GeometryArgs {
    /// The store configuration these arguments describe.
    pub fn config(&self) -> SfcbConfig {
        SfcbConfig::new()
            .magic(self.magic)
            .sector_size(self.sector_size)
            .sector_count(self.sector_count)
            .gc(!self.no_gc)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an erased image and initialize the store
    Format {
        /// Overwrite an existing image
        #[arg(short, long)]
        force: bool,
    },

    /// Display sector states and records
    Inspect {
        /// List every record of the chain
        #[arg(short, long)]
        entries: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check the seal of every record
    Verify,

    /// Print the newest value of an id
    Get {
        /// Record id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u16)]
        id: u16,

        /// Print the value as hex
        #[arg(short = 'x', long)]
        hex: bool,
    },

    /// Write a value under an id
    Put {
        /// Record id (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_u16)]
        id: u16,

        /// Value to store
        value: String,

        /// Interpret the value as hex bytes
        #[arg(short = 'x', long)]
        hex: bool,
    },

    /// Close the open sector and move to the next one
    Rotate,

    /// Erase the store and start over
    Clear,

    /// Show version information
    Version,
}

fn parse_u32(s: &str) -> Result<u32, String> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("invalid number '{s}': {e}"))
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let value = parse_u32(s)?;
    u16::try_from(value).map_err(|_| format!("id {s} does not fit in 16 bits"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let geometry = cli.geometry;
    match cli.command {
        Commands::Format { force } => {
            let path = cli.image.ok_or("Image path required for format")?;
            commands::format::run(&path, &geometry, force)?;
        }
        Commands::Inspect { entries, format } => {
            let path = cli.image.ok_or("Image path required for inspect")?;
            commands::inspect::run(&path, &geometry, entries, &format)?;
        }
        Commands::Verify => {
            let path = cli.image.ok_or("Image path required for verify")?;
            commands::verify::run(&path, &geometry)?;
        }
        Commands::Get { id, hex } => {
            let path = cli.image.ok_or("Image path required for get")?;
            commands::value::get(&path, &geometry, id, hex)?;
        }
        Commands::Put { id, value, hex } => {
            let path = cli.image.ok_or("Image path required for put")?;
            commands::value::put(&path, &geometry, id, &value, hex)?;
        }
        Commands::Rotate => {
            let path = cli.image.ok_or("Image path required for rotate")?;
            commands::maintenance::rotate(&path, &geometry)?;
        }
        Commands::Clear => {
            let path = cli.image.ok_or("Image path required for clear")?;
            commands::maintenance::clear(&path, &geometry)?;
        }
        Commands::Version => {
            println!("SFCB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SFCB Core v{}", sfcb_core::VERSION);
        }
    }

    Ok(())
}
