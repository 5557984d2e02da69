//! Replayable storage for captured output and error lines
//!
//! The buffer gives callers a sequential view of everything the child has
//! emitted so far, independent of whether they registered observers before
//! or after the data arrived. Appends come from the delivery thread and
//! reads from caller threads, so each sink is serialized by its own mutex.

use std::sync::Mutex;

/// Which child stream a captured line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// The child's standard output
    Output,
    /// The child's standard error
    Error,
}

#[derive(Debug, Default)]
struct Sink {
    lines: Vec<String>,
    cursor: usize,
}

/// In-memory duplicate of the child's redirected output and error streams
#[derive(Debug, Default)]
pub struct StreamBuffer {
    output: Mutex<Sink>,
    error: Mutex<Sink>,
}

impl StreamBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn sink(&self, source: StreamSource) -> &Mutex<Sink> {
        match source {
            StreamSource::Output => &self.output,
            StreamSource::Error => &self.error,
        }
    }

    /// Append one delivered line; called once per line from the delivery thread
    pub fn append(&self, source: StreamSource, line: impl Into<String>) {
        let mut sink = self
            .sink(source)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        sink.lines.push(line.into());
    }

    /// Return the next unread line, or `None` at end-of-data
    pub fn read_line(&self, source: StreamSource) -> Option<String> {
        let mut sink = self
            .sink(source)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if sink.cursor < sink.lines.len() {
            let line = sink.lines[sink.cursor].clone();
            sink.cursor += 1;
            Some(line)
        } else {
            None
        }
    }

    /// Number of lines appended to a stream so far
    pub fn len(&self, source: StreamSource) -> usize {
        self.sink(source)
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .lines
            .len()
    }

    /// Whether a stream has received no lines yet
    pub fn is_empty(&self, source: StreamSource) -> bool {
        self.len(source) == 0
    }

    /// Drop all stored lines and reset both read cursors
    pub fn clear(&self) {
        for source in [StreamSource::Output, StreamSource::Error] {
            let mut sink = self
                .sink(source)
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            sink.lines.clear();
            sink.cursor = 0;
        }
    }
}
