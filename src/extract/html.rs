// src/extract/html.rs
// =============================================================================
// This module pulls the menu links and detail links out of catalog pages.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Supports CSS selectors for finding elements
// - Copes with sloppy real-world markup (it is built on html5ever)
//
// The selectors are specific to the catalog site we walk:
// - the root page has a row of letter links: <tr class="letters"> ... <a>
// - a letter's listing page links every item through rom_download.php
//
// We also use the `url` crate to resolve relative hrefs against the page
// they were found on.
//
// Rust concepts:
// - LazyLock: build each Selector once, the first time it is needed
// - Iterators: select() walks matching elements in document order
// =============================================================================

use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Anchors inside the alphabetical navigation row
const MENU_LINK_SELECTOR: &str = "tr.letters a";

/// Anchors that point at an item's detail page
const DETAIL_LINK_SELECTOR: &str = "a[href*='rom_download.php']";

// Both selectors are constants, so a parse failure is a programmer error
static MENU_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(MENU_LINK_SELECTOR).expect("menu selector is valid CSS"));

static DETAIL_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(DETAIL_LINK_SELECTOR).expect("detail selector is valid CSS"));

/// Extracts the per-letter listing links from the catalog's root page
///
/// Returns the href of every anchor under the letters row, in document order.
/// A page without that row gives an empty Vec.
///
/// Example:
///   html = "<table><tr class='letters'><td><a href='a.htm'>A</a></td></tr></table>"
///   result = ["a.htm"]
pub fn extract_menu_links(html: &str) -> Vec<String> {
    select_hrefs(html, &MENU_LINKS)
}

/// Extracts the item detail links from a listing page
///
/// Any anchor whose href mentions rom_download.php counts, wherever it sits
/// on the page.
pub fn extract_detail_links(html: &str) -> Vec<String> {
    select_hrefs(html, &DETAIL_LINKS)
}

fn select_hrefs(html: &str, selector: &Selector) -> Vec<String> {
    let document = Html::parse_document(html);

    document
        .select(selector)
        .filter_map(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}

/// Resolves an href found on `page_url` to an absolute http(s) URL
///
/// Returns None for anchors, mailto:, javascript: and anything else we
/// cannot fetch.
///
/// Examples:
///   page_url = "http://example.com/nes.htm"
///   href = "nes_a.htm"                  -> Some("http://example.com/nes_a.htm")
///   href = "http://cdn.example.com/x"   -> Some("http://cdn.example.com/x")
///   href = "javascript:void(0)"         -> None
pub fn resolve_link(page_url: &Url, href: &str) -> Option<Url> {
    if href.starts_with('#') {
        return None;
    }

    // Absolute hrefs parse on their own, relative ones need the page as base
    let resolved = match Url::parse(href) {
        Ok(url) => url,
        Err(_) => page_url.join(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. What does "tr.letters a" mean?
//    - Any <a> that sits somewhere inside a <tr class="letters">
//    - The space is the "descendant" combinator in CSS
//
// 2. What does a[href*='rom_download.php'] mean?
//    - Any <a> whose href attribute *contains* that text
//    - *= is "substring match", ^= would be "starts with"
//
// 3. Why LazyLock?
//    - Parsing a selector is cheap but not free
//    - LazyLock parses it once and hands out the same Selector afterwards
//
// 4. Why filter_map?
//    - attr("href") returns Option<&str>
//    - filter_map keeps the Some values and drops the None ones in one step
// -----------------------------------------------------------------------------
