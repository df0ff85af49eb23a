// src/download/stream.rs
// =============================================================================
// This module copies a remote file to disk without holding it in memory.
//
// How it works:
// 1. Open the response (a bad status means "skip", not "fail")
// 2. Create the destination file; refuse if it already exists
// 3. Regroup the body into fixed 8 KiB chunks, write each one, and tell the
//    progress sink how far we are after every chunk
// 4. Flush and close. If anything breaks halfway, delete the partial file so
//    it is never mistaken for a finished download
//
// Rust concepts:
// - Streams: the body arrives as a sequence of byte chunks
// - AsyncWrite: the file (or a Vec in tests) we write into
// - Drop: the file handle is closed whenever it goes out of scope
// =============================================================================

use futures::stream::{Stream, StreamExt};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::progress::{Progress, ProgressSink};
use crate::fetch::{FetchError, HttpFetcher};

/// Bytes written between two progress reports
pub const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("file error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        DownloadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Network hiccups are worth another try; filesystem trouble is not
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::Fetch(e) => e.is_transient(),
            DownloadError::Io { .. } => false,
        }
    }

    /// True when the destination file was already there
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            DownloadError::Io { source, .. } if source.kind() == ErrorKind::AlreadyExists
        )
    }
}

/// What happened to one download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The whole body is on disk
    Completed { bytes: u64 },
    /// The server answered with an error status; nothing was written
    Skipped,
}

/// Streams files to disk through the run's shared HTTP client
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: HttpFetcher,
}

impl Downloader {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }

    /// Downloads `source_url` into `destination`, reporting to `sink`
    ///
    /// `destination` must not exist yet. The caller checks first; this only
    /// guarantees we never overwrite.
    pub async fn download(
        &self,
        source_url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, DownloadError> {
        let payload = match self.fetcher.fetch_stream(source_url).await? {
            Some(payload) => payload,
            None => {
                warn!(url = %source_url, "download skipped, server refused the file");
                return Ok(DownloadOutcome::Skipped);
            }
        };

        let total = payload.content_length();

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        info!(
            url = %source_url,
            path = %destination.display(),
            total_bytes = ?total,
            "downloading"
        );
        sink.begin(source_url, total);

        let copied =
            copy_in_chunks(payload.into_chunks(), &mut file, destination, total, sink).await;
        sink.finish();

        // Close the handle before touching the path again
        drop(file);

        match copied {
            Ok(bytes) => {
                debug!(path = %destination.display(), bytes, "download finished");
                Ok(DownloadOutcome::Completed { bytes })
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(destination).await {
                    warn!(
                        path = %destination.display(),
                        error = %cleanup,
                        "could not remove partial file"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Copies `body` into `writer` in CHUNK_SIZE pieces
///
/// Network frames come in whatever size the server and OS decide, so we
/// gather them into a CHUNK_SIZE buffer and write it out whenever it fills.
/// The sink hears about every full chunk plus the final partial one. Memory
/// use stays at one chunk plus one frame.
///
/// Returns the total number of bytes written.
pub(crate) async fn copy_in_chunks<S, B, W>(
    mut body: S,
    writer: &mut W,
    path: &Path,
    total_bytes: Option<u64>,
    sink: &dyn ProgressSink,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, FetchError>> + Unpin,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    let started = Instant::now();
    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE);
    let mut transferred: u64 = 0;
    let mut reported = false;

    while let Some(frame) = body.next().await {
        let frame = frame?;
        let mut data = frame.as_ref();

        while !data.is_empty() {
            let take = (CHUNK_SIZE - pending.len()).min(data.len());
            pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if pending.len() == CHUNK_SIZE {
                transferred += write_chunk(writer, &mut pending, path).await?;
                sink.report(&Progress::new(transferred, total_bytes, started.elapsed()));
                reported = true;
            }
        }
    }

    // Last partial chunk, or a single report for an empty body
    if !pending.is_empty() || !reported {
        transferred += write_chunk(writer, &mut pending, path).await?;
        sink.report(&Progress::new(transferred, total_bytes, started.elapsed()));
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(transferred)
}

async fn write_chunk<W>(
    writer: &mut W,
    pending: &mut Vec<u8>,
    path: &Path,
) -> Result<u64, DownloadError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(pending)
        .await
        .map_err(|e| DownloadError::io(path, e))?;
    let written = pending.len() as u64;
    pending.clear();
    Ok(written)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why create_new(true)?
//    - Opening fails with AlreadyExists if the file is there
//    - So even a race with another process can never overwrite a file
//
// 2. Why `&dyn ProgressSink`?
//    - dyn = "any type implementing the trait", decided at runtime
//    - The downloader works the same with a terminal bar, a logger or a test
//
// 3. Why regroup into 8 KiB chunks?
//    - Progress updates then arrive at a steady, predictable pace
//    - The buffer is reused, so memory stays flat no matter how big the file is
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpSettings;
    use crate::download::progress::testing::RecordingSink;
    use futures::stream;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frames(sizes: &[usize]) -> impl Stream<Item = Result<Vec<u8>, FetchError>> + Unpin {
        let frames: Vec<Result<Vec<u8>, FetchError>> =
            sizes.iter().map(|&size| Ok(vec![1u8; size])).collect();
        stream::iter(frames)
    }

    fn downloader() -> Downloader {
        Downloader::new(HttpFetcher::new(&HttpSettings::default()).unwrap())
    }

    // A real connection error, as the body stream would yield it
    async fn refused_connection() -> FetchError {
        let url = "http://127.0.0.1:1/";
        let err = reqwest::Client::new().get(url).send().await.unwrap_err();
        FetchError::network(url, err)
    }

    #[tokio::test]
    async fn test_copy_reports_at_chunk_boundaries() {
        let sink = RecordingSink::default();
        let mut out: Vec<u8> = Vec::new();
        // 20_000 bytes in odd-sized frames: two full chunks plus 3_616 bytes
        let body = frames(&[1000, 9000, 5000, 5000]);

        let written = copy_in_chunks(body, &mut out, Path::new("mem"), Some(20_000), &sink)
            .await
            .unwrap();

        assert_eq!(written, 20_000);
        assert_eq!(out.len(), 20_000);

        let seen: Vec<u64> = sink.reports().iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(seen, vec![8192, 16384, 20_000]);
        assert_eq!(sink.reports().last().unwrap().percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_copy_without_total_reports_raw_bytes() {
        let sink = RecordingSink::default();
        let mut out: Vec<u8> = Vec::new();

        copy_in_chunks(frames(&[3000]), &mut out, Path::new("mem"), None, &sink)
            .await
            .unwrap();

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].bytes_transferred, 3000);
        assert_eq!(reports[0].percent(), None);
    }

    #[tokio::test]
    async fn test_copy_empty_body_reports_once() {
        let sink = RecordingSink::default();
        let mut out: Vec<u8> = Vec::new();

        let written = copy_in_chunks(frames(&[]), &mut out, Path::new("mem"), Some(0), &sink)
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(sink.reports().len(), 1);
        assert_eq!(sink.reports()[0].percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_copy_stops_at_broken_frame() {
        let sink = RecordingSink::default();
        let mut out: Vec<u8> = Vec::new();
        let body = stream::iter(vec![
            Ok(vec![1u8; 8192]),
            Ok(vec![1u8; 5000]),
            Err(refused_connection().await),
            Ok(vec![1u8; 100]),
        ]);

        let result = copy_in_chunks(body, &mut out, Path::new("mem"), Some(13_292), &sink).await;

        assert!(matches!(result, Err(DownloadError::Fetch(_))));
        // Only the full chunk before the error reached the writer and the sink
        assert_eq!(out.len(), 8192);
        let seen: Vec<u64> = sink.reports().iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(seen, vec![8192]);
    }

    #[tokio::test]
    async fn test_download_writes_file_and_reaches_100_percent() {
        let server = MockServer::start().await;
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/nes/game.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("game.zip");
        let sink = RecordingSink::default();
        let url = format!("{}/nes/game.zip", server.uri());

        let outcome = downloader()
            .download(&url, &destination, &sink)
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Completed { bytes: 50_000 });
        assert_eq!(std::fs::read(&destination).unwrap(), payload);

        let reports = sink.reports();
        assert!(reports
            .windows(2)
            .all(|pair| pair[0].bytes_transferred <= pair[1].bytes_transferred));
        let last = reports.last().unwrap();
        assert_eq!(last.bytes_transferred, 50_000);
        assert_eq!(format!("{:.2}", last.percent().unwrap()), "100.00");
        assert_eq!(*sink.begun.lock().unwrap(), vec![(url, Some(50_000))]);
        assert_eq!(*sink.finished.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_download_cut_short_removes_partial_file() {
        // Announces 100_000 bytes, sends 20_000, then hangs up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[7u8; 20_000]).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("game.zip");
        let sink = RecordingSink::default();

        let err = downloader()
            .download(&format!("http://{}/game.zip", addr), &destination, &sink)
            .await
            .unwrap_err();
        server.await.unwrap();

        assert!(matches!(err, DownloadError::Fetch(_)));
        assert!(err.is_retryable());
        assert!(!destination.exists());

        let seen: Vec<u64> = sink.reports().iter().map(|p| p.bytes_transferred).collect();
        assert_eq!(seen, vec![8192, 16384]);
        assert_eq!(*sink.finished.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_download_error_status_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("missing.zip");
        let sink = RecordingSink::default();

        let outcome = downloader()
            .download(&format!("{}/missing.zip", server.uri()), &destination, &sink)
            .await
            .unwrap();

        assert_eq!(outcome, DownloadOutcome::Skipped);
        assert!(!destination.exists());
        assert!(sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_download_never_overwrites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("game.zip");
        std::fs::write(&destination, b"old bytes").unwrap();

        let err = downloader()
            .download(
                &format!("{}/game.zip", server.uri()),
                &destination,
                &RecordingSink::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
        assert!(!err.is_retryable());
        assert_eq!(std::fs::read(&destination).unwrap(), b"old bytes");
    }
}
