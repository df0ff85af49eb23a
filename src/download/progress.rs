// src/download/progress.rs
// =============================================================================
// Progress reporting for downloads.
//
// The copy loop does not know (or care) where progress ends up. It only
// pushes Progress values into something that implements ProgressSink:
// - TerminalProgress draws an indicatif bar on stderr
// - LogProgress emits tracing events (for pipes, CI logs, --quiet)
// - tests record every value to check the numbers
//
// Bars and log lines share stderr. Both go through one MultiProgress: the bar
// is added to it, and BarSafeWriter hides the bars while a log line is written.
// =============================================================================

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

/// A snapshot of one transfer, taken at a chunk boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub bytes_transferred: u64,
    /// From the Content-Length header, when the server sent one
    pub total_bytes: Option<u64>,
    /// Time since the transfer started
    pub elapsed: Duration,
}

impl Progress {
    pub fn new(bytes_transferred: u64, total_bytes: Option<u64>, elapsed: Duration) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
            elapsed,
        }
    }

    /// Percentage complete, `bytes * 100 / total`; None when the size is unknown
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_transferred as f64 * 100.0 / total as f64),
            None => None,
        }
    }

    /// Average transfer rate since the start, in KiB per second
    pub fn rate_kib_per_sec(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        self.bytes_transferred as f64 / seconds / 1024.0
    }

    /// The human-readable progress line
    ///
    ///   "42.17 % @ 512.00 kb/s"   when the size is known
    ///   "123456 bytes @ 512.00 kb/s"  otherwise
    pub fn describe(&self) -> String {
        match self.percent() {
            Some(pct) => format!("{:.2} % @ {:.2} kb/s", pct, self.rate_kib_per_sec()),
            None => format!(
                "{} bytes @ {:.2} kb/s",
                self.bytes_transferred,
                self.rate_kib_per_sec()
            ),
        }
    }
}

/// Anything that wants to hear about download progress
///
/// Methods take `&self` so one sink can be shared by reference across the
/// retry closure and the copy loop; implementations use interior mutability.
pub trait ProgressSink {
    /// A transfer is about to start
    fn begin(&self, _url: &str, _total_bytes: Option<u64>) {}

    /// Called after every chunk written to disk
    fn report(&self, progress: &Progress);

    /// The transfer ended, successfully or not
    fn finish(&self) {}
}

/// Draws one progress bar per download on the terminal
pub struct TerminalProgress {
    bars: MultiProgress,
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    /// `bars` must be the same MultiProgress the log writer suspends
    pub fn new(bars: MultiProgress) -> Self {
        Self {
            bars,
            bar: Mutex::new(None),
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn begin(&self, url: &str, total_bytes: Option<u64>) {
        let bar = match total_bytes {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template("{prefix} [{bar:30}] {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{prefix} {spinner} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_prefix(file_label(url));
        let bar = self.bars.add(bar);

        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn report(&self, progress: &Progress) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(progress.bytes_transferred);
                bar.set_message(progress.describe());
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                // Leave a plain line behind instead of a growing stack of bars
                let summary = format!("{} {}", bar.prefix(), bar.message());
                bar.finish_and_clear();
                self.bars.remove(&bar);
                let _ = self.bars.println(summary);
            }
        }
    }
}

/// Emits progress as debug-level tracing events
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn begin(&self, url: &str, total_bytes: Option<u64>) {
        debug!(url = %url, total_bytes = ?total_bytes, "download started");
    }

    fn report(&self, progress: &Progress) {
        debug!(
            bytes = progress.bytes_transferred,
            total_bytes = ?progress.total_bytes,
            "{}",
            progress.describe()
        );
    }
}

/// A tracing writer that hides the progress bars while a line is written
///
/// Plug it into `tracing_subscriber::fmt().with_writer(...)`; `inner` is where
/// the text really goes (stderr in the binary).
#[derive(Clone)]
pub struct BarSafeWriter<M> {
    bars: MultiProgress,
    inner: M,
}

impl<M> BarSafeWriter<M> {
    pub fn new(bars: MultiProgress, inner: M) -> Self {
        Self { bars, inner }
    }
}

impl<'a, M> MakeWriter<'a> for BarSafeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SuspendedWrite<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SuspendedWrite {
            bars: self.bars.clone(),
            inner: self.inner.make_writer(),
        }
    }
}

/// One log line on its way out, written with the bars out of the way
pub struct SuspendedWrite<W> {
    bars: MultiProgress,
    inner: W,
}

impl<W: Write> Write for SuspendedWrite<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.bars.suspend(|| inner.write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let inner = &mut self.inner;
        self.bars.suspend(|| inner.write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// The last path segment is enough to tell downloads apart on screen
fn file_label(url: &str) -> String {
    url.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Keeps every reported value so tests can inspect them
    #[derive(Default)]
    pub struct RecordingSink {
        pub reports: Mutex<Vec<Progress>>,
        pub begun: Mutex<Vec<(String, Option<u64>)>>,
        pub finished: Mutex<usize>,
    }

    impl RecordingSink {
        pub fn reports(&self) -> Vec<Progress> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ProgressSink for RecordingSink {
        fn begin(&self, url: &str, total_bytes: Option<u64>) {
            self.begun
                .lock()
                .unwrap()
                .push((url.to_string(), total_bytes));
        }

        fn report(&self, progress: &Progress) {
            self.reports.lock().unwrap().push(*progress);
        }

        fn finish(&self) {
            *self.finished.lock().unwrap() += 1;
        }
    }
}
