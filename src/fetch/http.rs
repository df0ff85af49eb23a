// src/fetch/http.rs
// =============================================================================
// This module issues the HTTP GET requests for the whole run.
//
// Key functionality:
// - One reqwest Client, built once and shared by every request
// - Pages come back as text; downloads come back as a byte stream
// - A non-success status (404, 500, ...) is "nothing here" (None), not an error
// - Only connection-level problems become a FetchError
//
// Rust concepts:
// - Option inside Result: Ok(None) = the server said no, Err = we never got
//   a proper answer
// - Streams: the response body arrives piece by piece
// =============================================================================

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HttpSettings;

/// A connection-level failure while talking to a server
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        FetchError::Network {
            url: url.to_string(),
            source,
        }
    }

    /// Whether trying again could plausibly work
    ///
    /// Timeouts, refused/reset connections and broken bodies are transient.
    /// A URL reqwest cannot even build a request for is not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { source, .. } => {
                !source.is_builder()
                    && (source.is_timeout()
                        || source.is_connect()
                        || source.is_request()
                        || source.is_body()
                        || source.is_decode())
            }
            FetchError::Client(_) => false,
        }
    }
}

/// An open download: the response headers have arrived, the body has not
#[derive(Debug)]
pub struct PayloadStream {
    url: String,
    response: Response,
}

impl PayloadStream {
    /// Size announced by the server, if any
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Turns the response into a stream of body chunks
    pub fn into_chunks(self) -> BoxStream<'static, Result<Bytes, FetchError>> {
        let url = self.url;
        self.response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| FetchError::network(&url, e)))
            .boxed()
    }
}

/// The run's HTTP client
///
/// Cloning is cheap (reqwest's Client is reference counted inside), so the
/// downloader gets its own clone of the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    page_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            page_timeout: Duration::from_secs(settings.page_timeout_secs),
        })
    }

    /// GETs a page and returns its body as text
    ///
    /// Returns Ok(None) when the server answers with a non-success status or
    /// with a blank body.
    pub async fn fetch_text(&self, url: &str) -> Result<Option<String>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        if !response.status().is_success() {
            log_bad_status(url, response.status());
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        if body.trim().is_empty() {
            warn!(url = %url, "page body is empty");
            return Ok(None);
        }

        debug!(url = %url, bytes = body.len(), "fetched page");
        Ok(Some(body))
    }

    /// GETs a file and returns as soon as the headers are in
    ///
    /// The body is left on the wire so the caller can stream it to disk.
    /// No whole-request timeout here: big files may legitimately take long.
    pub async fn fetch_stream(&self, url: &str) -> Result<Option<PayloadStream>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        if !response.status().is_success() {
            log_bad_status(url, response.status());
            return Ok(None);
        }

        Ok(Some(PayloadStream {
            url: url.to_string(),
            response,
        }))
    }
}

fn log_bad_status(url: &str, status: StatusCode) {
    warn!(url = %url, status = status.as_u16(), "server answered with an error status");
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why is a 404 not an error here?
//    - Missing pages are normal on a big catalog
//    - The walker just skips them, so Ok(None) is the honest answer
//    - Err is kept for "the network itself failed", which is worth retrying
//
// 2. Why two timeouts?
//    - connect_timeout: how long we wait to reach the server at all
//    - .timeout() on a request: limit for the whole request, used for pages only
//
// 3. What is bytes_stream()?
//    - Gives the body as a Stream of chunks instead of one big buffer
//    - Needs reqwest's "stream" feature
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&HttpSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/menu.htm"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>menu</html>"))
            .mount(&server)
            .await;

        let body = fetcher()
            .fetch_text(&format!("{}/menu.htm", server.uri()))
            .await
            .unwrap();
        assert_eq!(body.as_deref(), Some("<html>menu</html>"));
    }

    #[tokio::test]
    async fn test_fetch_text_not_found_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let body = fetcher()
            .fetch_text(&format!("{}/gone.htm", server.uri()))
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_fetch_text_blank_body_is_absent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n "))
            .mount(&server)
            .await;

        let body = fetcher()
            .fetch_text(&format!("{}/blank.htm", server.uri()))
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_fetch_stream_reports_content_length() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 100]))
            .mount(&server)
            .await;

        let stream = fetcher()
            .fetch_stream(&format!("{}/file.zip", server.uri()))
            .await
            .unwrap()
            .expect("payload should be present");
        assert_eq!(stream.content_length(), Some(100));
    }

    #[tokio::test]
    async fn test_malformed_url_is_not_transient() {
        let err = fetcher().fetch_text("not a url").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_refused_connection_is_transient() {
        // Nothing listens on port 1 on a test machine
        let err = fetcher()
            .fetch_text("http://127.0.0.1:1/menu.htm")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
