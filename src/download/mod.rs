// src/download/mod.rs
// =============================================================================
// This module saves remote files to disk with progress feedback.
//
// Submodules:
// - stream: the Downloader and its chunked copy loop
// - progress: the Progress value and the sinks that display it
// =============================================================================

mod progress;
mod stream;

pub use progress::{BarSafeWriter, LogProgress, ProgressSink, TerminalProgress};
pub use stream::{DownloadError, DownloadOutcome, Downloader};
