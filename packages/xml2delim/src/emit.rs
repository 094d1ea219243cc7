//! Record emission: buffering, flushing and progress reporting.
//!
//! The transcoder hands one record (the full text produced for one matched
//! subtree) at a time to a [`RecordSink`] and reports progress through a
//! [`ProgressReporter`]. Neither owns anything about where the text goes
//! beyond the writer they are given.

use std::io::Write;
use std::time::Duration;

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::error::Result;

/// Destination for processed records.
pub trait RecordSink {
    /// Accept the output text of one processed subtree (possibly empty).
    fn emit(&mut self, text: &str) -> Result<()>;

    /// Write out everything pending.
    fn flush(&mut self) -> Result<()>;
}

/// Counts and timing for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    /// Matched root subtrees processed.
    pub records: usize,
    /// Output lines written.
    pub lines: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Records per second, 0 when no time has elapsed.
    #[must_use]
    pub fn rate(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.records as f64 / secs).round() as u64
        } else {
            0
        }
    }
}

/// Observer for run progress.
pub trait ProgressReporter {
    /// Called periodically with the number of records processed so far.
    fn update(&self, processed: usize, elapsed: Duration);

    /// Called once after the output has been flushed.
    fn finish(&self, summary: &RunSummary);
}

/// Reporter that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _processed: usize, _elapsed: Duration) {}

    fn finish(&self, _summary: &RunSummary) {}
}

/// Sink that keeps up to `capacity` records in memory and writes them in a
/// single call once the threshold is reached.
pub struct BufferedEmitter<W: Write> {
    writer: W,
    pending: Vec<String>,
    capacity: usize,
    records: usize,
    lines: usize,
    flushes: usize,
}

impl<W: Write> BufferedEmitter<W> {
    /// Create an emitter flushing every `capacity` records (at least 1).
    pub fn new(writer: W, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            writer,
            pending: Vec::with_capacity(capacity),
            capacity,
            records: 0,
            lines: 0,
            flushes: 0,
        }
    }

    /// Records accepted so far.
    #[must_use]
    pub fn records(&self) -> usize {
        self.records
    }

    /// Lines accepted so far.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// Records waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Non-empty writes performed so far.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Flush and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        RecordSink::flush(&mut self)?;
        Ok(self.writer)
    }
}

impl<W: Write> RecordSink for BufferedEmitter<W> {
    fn emit(&mut self, text: &str) -> Result<()> {
        self.records += 1;
        self.lines += text.bytes().filter(|b| *b == b'\n').count();
        self.pending.push(text.to_string());

        if self.pending.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let chunk = self.pending.concat();
            self.writer.write_all(chunk.as_bytes())?;
            self.pending.clear();
            self.flushes += 1;
            tracing::debug!(bytes = chunk.len(), records = self.records, "Flushed output buffer");
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl Default for BufferedEmitter<Vec<u8>> {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_BUFFER_SIZE)
    }
}
