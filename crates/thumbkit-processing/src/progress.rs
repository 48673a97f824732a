//! Progress reporting as an ordered event stream.
//!
//! A [`ProgressReporter`] is the producer side: it emits integer percentages in
//! `[0, 100]` and drops any value that is not strictly greater than the last one
//! emitted, so a run produces at most 101 events. [`ProgressStream`] is the
//! consumer side and ends once every reporter clone is dropped.

use futures::Stream;
use parking_lot::Mutex;
use std::io::{self, BufRead, Read, Seek, SeekFrom};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const PROGRESS_COMPLETE: u8 = 100;

/// Highest value a phase may report; 100 is reserved for success.
const PHASE_CEILING: u8 = 99;

#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<u8>,
    last: Arc<Mutex<Option<u8>>>,
}

impl ProgressReporter {
    /// Create a connected reporter and stream
    pub fn channel() -> (ProgressReporter, ProgressStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ProgressReporter {
                tx,
                last: Arc::new(Mutex::new(None)),
            },
            ProgressStream { rx },
        )
    }

    /// Emit `percent` if it advances past the last emitted value.
    ///
    /// Returns whether an event was emitted.
    pub fn report(&self, percent: u8) -> bool {
        let percent = percent.min(PROGRESS_COMPLETE);
        let mut last = self.last.lock();
        if matches!(*last, Some(prev) if percent <= prev) {
            return false;
        }
        *last = Some(percent);
        // A dropped stream means nobody is listening; progress is advisory.
        let _ = self.tx.send(percent);
        true
    }

    pub fn complete(&self) {
        self.report(PROGRESS_COMPLETE);
    }

    pub fn last(&self) -> Option<u8> {
        *self.last.lock()
    }

    /// Map a phase onto `[start, end]`, capped below 100.
    pub fn span(&self, start: u8, end: u8) -> ProgressSpan {
        let end = end.min(PHASE_CEILING);
        ProgressSpan {
            reporter: self.clone(),
            start: start.min(end),
            end,
        }
    }
}

/// A slice of the overall progress range owned by one phase.
#[derive(Clone)]
pub struct ProgressSpan {
    reporter: ProgressReporter,
    start: u8,
    end: u8,
}

impl ProgressSpan {
    /// Percentage for `done` out of `total` units of this phase.
    pub fn percent_for(&self, done: u64, total: u64) -> u8 {
        if total == 0 {
            return self.end;
        }
        let done = done.min(total);
        let width = (self.end - self.start) as u64;
        self.start + (width * done / total) as u8
    }

    pub fn report_fraction(&self, done: u64, total: u64) -> bool {
        self.reporter.report(self.percent_for(done, total))
    }

    pub fn begin(&self) {
        self.reporter.report(self.start);
    }

    pub fn finish(&self) {
        self.reporter.report(self.end);
    }
}

/// Consumer side of a progress channel.
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<u8>,
}

impl Stream for ProgressStream {
    type Item = u8;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<u8>> {
        self.rx.poll_recv(cx)
    }
}

/// Reader that reports how far a decoder has consumed its input and aborts
/// reads once cancelled.
pub struct ProgressReader<R> {
    inner: R,
    total: u64,
    position: u64,
    high_water: u64,
    last_percent: Option<u8>,
    span: ProgressSpan,
    cancel: CancellationToken,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total: u64, span: ProgressSpan, cancel: CancellationToken) -> Self {
        Self {
            inner,
            total,
            position: 0,
            high_water: 0,
            last_percent: None,
            span,
            cancel,
        }
    }

    pub fn bytes_consumed(&self) -> u64 {
        self.high_water
    }

    fn check_cancelled(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            Err(io::Error::other("decode cancelled"))
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, amount: u64) {
        self.position = self.position.saturating_add(amount);
        if self.position <= self.high_water {
            return;
        }
        self.high_water = self.position;
        let percent = self.span.percent_for(self.high_water, self.total);
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.span.reporter.report(percent);
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        let n = self.inner.read(buf)?;
        self.advance(n as u64);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for ProgressReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.check_cancelled()?;
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.advance(amt as u64);
    }
}

impl<R: Seek> Seek for ProgressReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_cancelled()?;
        let new_position = self.inner.seek(pos)?;
        self.position = new_position;
        Ok(new_position)
    }
}
