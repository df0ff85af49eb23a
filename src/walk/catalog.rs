// src/walk/catalog.rs
// =============================================================================
// This module walks one catalog source from its menu page down to the files.
//
// How it works, per source:
// 1. menu stage:    fetch the root page, collect the per-letter listing links
// 2. listing stage: fetch each listing page, collect the item detail links
// 3. detail stage:  fetch each detail page, pull out the download link
// 4. store stage:   work out the file name; skip it if it is already on
//                   disk, otherwise stream it into destination/<source name>/
//
// Every stage hands a list to the next one. A page that is missing, or a
// detail page without a link, only skips that branch; the walk carries on
// with the next sibling. A filesystem error stops the run.
//
// Everything runs one request at a time. Each network call goes through the
// retry executor.
//
// Rust concepts:
// - let-else: bail out of a stage early when a value is missing
// - &dyn ProgressSink: borrow the sink without knowing its concrete type
// - anyhow::Context: attach "what were we doing" to filesystem errors
// =============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Source;
use crate::download::{DownloadError, DownloadOutcome, Downloader, ProgressSink};
use crate::extract::{extract_detail_links, extract_file_link, extract_menu_links, resolve_link};
use crate::fetch::{FetchError, HttpFetcher};
use crate::retry::{execute_with_retry, RetryPolicy};

/// What happened while walking one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    /// Files written during this run
    pub downloaded: usize,
    /// Files skipped because they were already on disk
    pub already_present: usize,
    /// Detail pages without a usable download link
    pub missing_link: usize,
    /// Pages or files the server answered with an error status
    pub unavailable: usize,
    /// Network failures that outlasted the retry policy
    pub failed: usize,
    /// Bytes written during this run
    pub bytes: u64,
}

impl SourceReport {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Self::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

// Result of fetching one page through the retry executor
enum Page {
    Body(String),
    Absent,
    Failed,
}

/// Drives the menu -> listing -> detail -> file traversal
pub struct CatalogWalker {
    fetcher: HttpFetcher,
    downloader: Downloader,
    policy: RetryPolicy,
    sink: Box<dyn ProgressSink>,
}

impl CatalogWalker {
    /// The fetcher's client is shared with the downloader for the whole run
    pub fn new(fetcher: HttpFetcher, policy: RetryPolicy, sink: Box<dyn ProgressSink>) -> Self {
        Self {
            downloader: Downloader::new(fetcher.clone()),
            fetcher,
            policy,
            sink,
        }
    }

    /// Walks one source, saving files into `destination_root/<source.name>`
    ///
    /// Only filesystem errors come back as Err. Everything else is logged,
    /// counted in the report and skipped.
    pub async fn walk_source(
        &self,
        source: &Source,
        destination_root: &Path,
    ) -> Result<SourceReport> {
        let mut report = SourceReport::new(&source.name);
        let folder = destination_root.join(&source.name);

        info!(source = %source.name, url = %source.url, "walking catalog");

        let root = match Url::parse(&source.url) {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    source = %source.name,
                    url = %source.url,
                    error = %e,
                    "source url is not valid, skipping source"
                );
                report.failed += 1;
                return Ok(report);
            }
        };

        for listing_url in self.menu_stage(&root, &mut report).await {
            for detail_url in self.listing_stage(&listing_url, &mut report).await {
                let Some(file_url) = self.detail_stage(&detail_url, &mut report).await else {
                    continue;
                };
                self.store_stage(&file_url, &folder, &mut report).await?;
            }
        }

        info!(
            source = %source.name,
            downloaded = report.downloaded,
            already_present = report.already_present,
            missing_link = report.missing_link,
            unavailable = report.unavailable,
            failed = report.failed,
            "finished catalog"
        );
        Ok(report)
    }

    /// Fetches one detail page and returns the download link it carries
    pub async fn probe(&self, detail_url: &str) -> Result<Option<Url>> {
        let page = Url::parse(detail_url).with_context(|| format!("invalid url '{}'", detail_url))?;
        let body = execute_with_retry(
            &self.policy,
            || self.fetcher.fetch_text(page.as_str()),
            FetchError::is_transient,
        )
        .await?;

        Ok(body
            .as_deref()
            .and_then(extract_file_link)
            .and_then(|href| resolve_link(&page, &href)))
    }

    async fn menu_stage(&self, root: &Url, report: &mut SourceReport) -> Vec<Url> {
        let html = match self.fetch_page("menu", root, report).await {
            Page::Body(html) => html,
            Page::Absent | Page::Failed => return Vec::new(),
        };

        let links = resolve_all(root, extract_menu_links(&html));
        info!(url = %root, count = links.len(), "found catalog listing pages");
        links
    }

    async fn listing_stage(&self, listing: &Url, report: &mut SourceReport) -> Vec<Url> {
        let html = match self.fetch_page("listing", listing, report).await {
            Page::Body(html) => html,
            Page::Absent | Page::Failed => return Vec::new(),
        };

        let links = resolve_all(listing, extract_detail_links(&html));
        debug!(url = %listing, count = links.len(), "found detail pages");
        links
    }

    async fn detail_stage(&self, detail: &Url, report: &mut SourceReport) -> Option<Url> {
        let html = match self.fetch_page("detail", detail, report).await {
            Page::Body(html) => html,
            Page::Absent | Page::Failed => return None,
        };

        let link = extract_file_link(&html).and_then(|href| resolve_link(detail, &href));
        if link.is_none() {
            warn!(stage = "detail", url = %detail, "no download link, skipping item");
            report.missing_link += 1;
        }
        link
    }

    async fn store_stage(
        &self,
        file_url: &Url,
        folder: &Path,
        report: &mut SourceReport,
    ) -> Result<()> {
        let Some(file_name) = file_name_from_url(file_url) else {
            warn!(
                stage = "store",
                url = %file_url,
                "download link has no usable file name, skipping item"
            );
            report.missing_link += 1;
            return Ok(());
        };

        tokio::fs::create_dir_all(folder)
            .await
            .with_context(|| format!("could not create folder {}", folder.display()))?;

        let path = folder.join(&file_name);
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("could not check {}", path.display()))?;
        if exists {
            info!(file = %file_name, "file already exists, skipping");
            report.already_present += 1;
            return Ok(());
        }

        // Plain shared references, so the retry closure can hand them to each
        // new download future
        let downloader = &self.downloader;
        let sink: &dyn ProgressSink = self.sink.as_ref();
        let url = file_url.as_str();
        let target = path.as_path();

        let outcome = execute_with_retry(
            &self.policy,
            || downloader.download(url, target, sink),
            DownloadError::is_retryable,
        )
        .await;

        match outcome {
            Ok(DownloadOutcome::Completed { bytes }) => {
                report.downloaded += 1;
                report.bytes += bytes;
            }
            Ok(DownloadOutcome::Skipped) => {
                report.unavailable += 1;
            }
            Err(DownloadError::Fetch(e)) => {
                warn!(stage = "download", url = %file_url, error = %e, "giving up on file");
                report.failed += 1;
            }
            Err(e @ DownloadError::Io { .. }) => {
                let reason = if e.is_already_exists() {
                    "appeared on disk while we were about to write it"
                } else {
                    "could not be written"
                };
                return Err(e).with_context(|| format!("{} {}", path.display(), reason));
            }
        }

        Ok(())
    }

    async fn fetch_page(&self, stage: &'static str, url: &Url, report: &mut SourceReport) -> Page {
        let fetched = execute_with_retry(
            &self.policy,
            || self.fetcher.fetch_text(url.as_str()),
            FetchError::is_transient,
        )
        .await;

        match fetched {
            Ok(Some(body)) => Page::Body(body),
            Ok(None) => {
                info!(stage, url = %url, "page unavailable, skipping");
                report.unavailable += 1;
                Page::Absent
            }
            Err(e) => {
                warn!(stage, url = %url, error = %e, "giving up on page");
                report.failed += 1;
                Page::Failed
            }
        }
    }
}

// Resolves raw hrefs against the page they came from, dropping unusable ones
fn resolve_all(page: &Url, hrefs: Vec<String>) -> Vec<Url> {
    hrefs
        .into_iter()
        .filter_map(|href| {
            let resolved = resolve_link(page, &href);
            if resolved.is_none() {
                debug!(page = %page, href = %href, "ignoring link");
            }
            resolved
        })
        .collect()
}

/// The file name a download is stored under: the last path segment,
/// percent-decoded
///
/// Returns None when the URL ends in a folder or the decoded name could
/// escape the destination folder.
///
/// Example:
///   "http://example.com/nes/Balloon%20Fight.zip" -> Some("Balloon Fight.zip")
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let name = urlencoding::decode(segment).ok()?.into_owned();

    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return None;
    }
    Some(name)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why does each stage return a Vec?
//    - It keeps every stage small and testable on its own
//    - Running a stage with a worker pool later would only touch that stage
//
// 2. What is let-else?
//    - let Some(x) = value else { ... };
//    - If the pattern does not match, the else block runs and must leave
//      (return, continue, break)
//
// 3. Why check try_exists before downloading?
//    - It is how re-runs skip files we already have
//    - The downloader also opens with create_new, so nothing is overwritten
//      even if the check and the write race
//
// 4. Why is the folder created so late?
//    - A catalog that yields no file links leaves no empty folders behind
// -----------------------------------------------------------------------------
