// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// clap is a popular Rust library for parsing command-line arguments.
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Rust concepts:
// - Structs: Custom data types that group related data
// - Enums: Types that can be one of several variants
// - Derive macros: Automatically generate code for our types
// =============================================================================

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

// This struct represents our entire CLI application
//
// #[derive(Parser)] tells clap to automatically generate parsing code
// The #[command(...)] attributes configure how the CLI behaves
#[derive(Parser, Debug)]
#[command(
    name = "catalog-harvester",
    version = "0.1.0",
    about = "Walks a download catalog (menu -> listings -> detail pages) and saves every file",
    long_about = "catalog-harvester walks each configured catalog from its letter menu down to the \
                  item detail pages, pulls out the direct-download link and saves the file. \
                  Files already on disk are skipped, so it is safe to run again after a break."
)]
pub struct Cli {
    /// More log output (-v = debug, -vv = trace)
    ///
    /// RUST_LOG, when set, wins over this flag
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    // The #[command(subcommand)] attribute tells clap that this field
    // will hold one of the subcommands defined in the Commands enum
    #[command(subcommand)]
    pub command: Commands,
}

// This enum defines our subcommands (run, probe)
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk every configured source and download what is missing
    ///
    /// Example: catalog-harvester run --config harvest.toml
    Run {
        /// Path to the TOML config file (destination folder + sources)
        #[arg(short, long, default_value = "harvest.toml")]
        config: PathBuf,

        /// Save into this folder instead of the one in the config file
        #[arg(long)]
        destination: Option<PathBuf>,

        /// Print the final report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fetch one item detail page and print its download link
    ///
    /// Handy to check that the site's page template still matches.
    ///
    /// Example: catalog-harvester probe http://example.com/rom_download.php?id=42
    Probe {
        /// Detail page URL
        detail_url: String,
    },
}
