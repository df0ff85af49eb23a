// src/walk/mod.rs
// =============================================================================
// This module handles walking a catalog site.
//
// Features:
// - Menu page -> per-letter listings -> item detail pages -> files
// - One request at a time, every request behind the retry executor
// - Files already on disk are skipped, so runs can be repeated safely
// - Per-source report of what was downloaded, skipped or lost
// =============================================================================

mod catalog;

pub use catalog::{CatalogWalker, SourceReport};
