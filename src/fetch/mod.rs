// src/fetch/mod.rs
// =============================================================================
// This module is the only place (apart from the downloader, which uses it)
// that talks to the network.
//
// Submodules:
// - http: the shared reqwest client, page fetches and file streams
// =============================================================================

mod http;

pub use http::{FetchError, HttpFetcher};
