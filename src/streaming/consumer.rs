//! Chunk-driven consumer for one assistant turn
//!
//! Every chunk is appended to the turn's raw buffer and the whole buffer is
//! re-tokenized; no incremental diffing. Output to observers is throttled
//! to a minimum interval so the UI is not redrawn on every token, with an
//! unconditional final flush when the stream ends.

use std::time::{Duration, Instant};

use super::{parse_message, Segment, TokenizerLimits};

/// Minimum interval between partial flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

pub struct StreamConsumer {
    buffer: String,
    limits: TokenizerLimits,
    flush_interval: Duration,
    last_flush: Option<Instant>,
}

impl StreamConsumer {
    pub fn new(limits: TokenizerLimits, flush_interval: Duration) -> Self {
        Self {
            buffer: String::new(),
            limits,
            flush_interval,
            last_flush: None,
        }
    }

    /// Append a chunk and, if a flush is due, re-parse the whole buffer.
    ///
    /// Returns `None` while throttled; the caller keeps the previous
    /// segment list on screen until the next flush.
    pub fn push_chunk(&mut self, chunk: &str) -> Option<Vec<Segment>> {
        self.append(chunk);
        let due = self
            .last_flush
            .map_or(true, |at| at.elapsed() >= self.flush_interval);
        if !due {
            return None;
        }
        self.last_flush = Some(Instant::now());
        Some(self.parse())
    }

    /// Final, unconditional flush at the end of the stream. No trailing
    /// bytes may be lost to throttling.
    pub fn finish(&mut self) -> Vec<Segment> {
        self.last_flush = Some(Instant::now());
        self.parse()
    }

    /// Re-tokenize the current buffer.
    pub fn parse(&self) -> Vec<Segment> {
        parse_message(&self.buffer, &self.limits)
    }

    /// The raw accumulated text of this turn.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_truncated(&self) -> bool {
        self.buffer.len() > self.limits.max_buffer_len
    }

    fn append(&mut self, chunk: &str) {
        // Append-only, capped: once past the limit the rest of the turn is
        // dropped. The chunk that crosses the cap is kept whole so the
        // tokenizer sees past the limit and emits its truncation marker.
        if self.buffer.len() > self.limits.max_buffer_len {
            return;
        }
        self.buffer.push_str(chunk);
    }
}
