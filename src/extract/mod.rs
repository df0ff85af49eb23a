// src/extract/mod.rs
// =============================================================================
// This module turns raw page markup into the next level's URLs.
//
// Submodules:
// - html: menu links and detail links (CSS selectors)
// - script: the direct-download link hidden in an inline script (regex)
//
// Everything here is a pure function: markup in, links out. No network, no
// files. "Nothing found" is an empty Vec or None, never an error.
// =============================================================================

mod html;
mod script;

pub use html::{extract_detail_links, extract_menu_links, resolve_link};
pub use script::extract_file_link;
