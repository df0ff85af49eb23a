// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (tracing) on stderr
// 3. Dispatch to the appropriate subcommand handler
// 4. Print the per-source report
// 5. Exit with proper code (0 = success, 1 = some files lost, 2 = error)
//
// Rust concepts used:
// - async/await: every network call is awaited, one after the other
// - Result<T, E>: For error handling (T = success type, E = error type)
// - Box<dyn Trait>: pick the progress display at runtime
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli; // src/cli.rs - command-line parsing
mod config; // src/config.rs - the TOML run configuration
mod download; // src/download/ - streaming files to disk with progress
mod extract; // src/extract/ - pulling links out of page markup
mod fetch; // src/fetch/ - the shared HTTP client
mod retry; // src/retry.rs - bounded retry with backoff
mod walk; // src/walk/ - the menu -> listing -> detail -> file traversal

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::Configuration;
use download::{BarSafeWriter, LogProgress, ProgressSink, TerminalProgress};
use fetch::HttpFetcher;
use indicatif::MultiProgress;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walk::{CatalogWalker, SourceReport};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Progress bars and log lines both go to stderr through this
    let bars = MultiProgress::new();
    init_logging(cli.verbose, cli.quiet, bars.clone());

    let exit_code = match run(cli, bars).await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            error!("{:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// RUST_LOG wins; otherwise -q / -v pick the level
fn init_logging(verbose: u8, quiet: bool, bars: MultiProgress) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(BarSafeWriter::new(bars, std::io::stderr))
        .init();
}

// Returns:
//   Ok(0) = every source walked, nothing lost
//   Ok(1) = walked, but some pages or files failed after retries
//   Err   = configuration or filesystem problem (exit code 2)
async fn run(cli: Cli, bars: MultiProgress) -> Result<i32> {
    match cli.command {
        Commands::Run {
            config,
            destination,
            json,
        } => handle_run(&config, destination, json, progress_sink(cli.quiet, bars)).await,
        Commands::Probe { detail_url } => handle_probe(&detail_url).await,
    }
}

// Handles the 'run' subcommand
async fn handle_run(
    config_path: &Path,
    destination: Option<PathBuf>,
    json: bool,
    sink: Box<dyn ProgressSink>,
) -> Result<i32> {
    let config = Configuration::load(config_path)?;
    let destination = destination.unwrap_or_else(|| config.destination_folder.clone());

    info!(
        sources = config.sources.len(),
        destination = %destination.display(),
        "starting harvest"
    );

    // The client lives exactly as long as this walker
    let fetcher = HttpFetcher::new(&config.http)?;
    let walker = CatalogWalker::new(fetcher, config.retry.policy(), sink);

    let mut reports = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        let report = walker
            .walk_source(source, &destination)
            .await
            .with_context(|| format!("walking source '{}' stopped", source.name))?;
        reports.push(report);
    }

    info!("harvest finished");
    print_reports(&reports, json)?;

    if reports.iter().any(SourceReport::has_failures) {
        Ok(1)
    } else {
        Ok(0)
    }
}

// Handles the 'probe' subcommand
async fn handle_probe(detail_url: &str) -> Result<i32> {
    let fetcher = HttpFetcher::new(&config::HttpSettings::default())?;
    let walker = CatalogWalker::new(fetcher, retry::RetryPolicy::default(), Box::new(LogProgress));

    match walker.probe(detail_url).await? {
        Some(link) => {
            println!("{}", link);
            Ok(0)
        }
        None => {
            println!("No download link found on {}", detail_url);
            Ok(1)
        }
    }
}

// A live progress bar only makes sense on an interactive terminal
fn progress_sink(quiet: bool, bars: MultiProgress) -> Box<dyn ProgressSink> {
    if !quiet && std::io::stderr().is_terminal() {
        Box::new(TerminalProgress::new(bars))
    } else {
        Box::new(LogProgress)
    }
}

// Prints the reports either as a table or JSON
fn print_reports(reports: &[SourceReport], json: bool) -> Result<()> {
    if json {
        let json_output = serde_json::to_string_pretty(reports)?;
        println!("{}", json_output);
    } else {
        print_table(reports);
    }
    Ok(())
}

// Prints reports as a human-readable table in the terminal
fn print_table(reports: &[SourceReport]) {
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>12} {:>8} {:>14}",
        "SOURCE", "SAVED", "PRESENT", "NO LINK", "UNAVAILABLE", "FAILED", "BYTES"
    );
    println!("{}", "=".repeat(90));

    for report in reports {
        let name = if report.source.chars().count() > 19 {
            format!("{}...", report.source.chars().take(16).collect::<String>())
        } else {
            report.source.clone()
        };

        println!(
            "{:<20} {:>10} {:>10} {:>10} {:>12} {:>8} {:>14}",
            name,
            report.downloaded,
            report.already_present,
            report.missing_link,
            report.unavailable,
            report.failed,
            report.bytes
        );
    }

    println!();

    let saved: usize = reports.iter().map(|r| r.downloaded).sum();
    let failed: usize = reports.iter().map(|r| r.failed).sum();
    println!("📊 Summary:");
    println!("   ✅ Saved: {}", saved);
    println!("   ❌ Failed: {}", failed);
    println!("   📋 Sources: {}", reports.len());
}
