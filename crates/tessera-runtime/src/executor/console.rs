//! Captured console output.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Severity of a captured console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `console.log` and `print`
    Log,
    /// `console.info`
    Info,
    /// `console.warn`
    Warn,
    /// `console.error`
    Error,
    /// `console.debug`
    Debug,
}

impl LogLevel {
    /// All levels, in the order the console exposes them.
    pub const ALL: [LogLevel; 5] = [Self::Log, Self::Info, Self::Warn, Self::Error, Self::Debug];

    /// Method name on the `console` table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Level of the call.
    pub level: LogLevel,
    /// Arguments rendered as strings (tables as JSON text).
    pub args: Vec<String>,
    /// Wall-clock time of the call, milliseconds since the epoch.
    pub timestamp_ms: i64,
}

/// Shared sink for console output of one execution.
///
/// The executor keeps a clone so that lines written before a timeout
/// survive even though the evaluation thread is abandoned. Capture is
/// bounded both by line count and by the total bytes of rendered
/// arguments.
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    state: Arc<Mutex<Captured>>,
    dropped: Arc<AtomicUsize>,
    dropped_bytes: Arc<AtomicUsize>,
    enabled: bool,
    max_entries: usize,
    max_bytes: usize,
}

#[derive(Debug, Default)]
struct Captured {
    entries: Vec<LogEntry>,
    bytes: usize,
}

impl ConsoleBuffer {
    /// A buffer that keeps at most `max_entries` lines and
    /// `max_bytes` bytes of arguments.
    #[must_use]
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(Captured::default())),
            dropped: Arc::new(AtomicUsize::new(0)),
            dropped_bytes: Arc::new(AtomicUsize::new(0)),
            enabled: true,
            max_entries,
            max_bytes,
        }
    }

    /// A buffer that discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(0, 0)
        }
    }

    /// Whether lines are being kept.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bytes of arguments the buffer can still take. `0` once it is full
    /// by either measure.
    #[must_use]
    pub fn remaining_bytes(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        let state = self.state.lock();
        if state.entries.len() >= self.max_entries {
            return 0;
        }
        self.max_bytes.saturating_sub(state.bytes)
    }

    /// Whether further lines would be dropped.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining_bytes() == 0
    }

    /// Appends a line stamped with the current time.
    ///
    /// Arguments are cut to the remaining byte allowance; the line is
    /// dropped when nothing of it fits.
    pub fn push(&self, level: LogLevel, mut args: Vec<String>) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock();
        let mut remaining = self.max_bytes.saturating_sub(state.bytes);
        if state.entries.len() >= self.max_entries || remaining == 0 {
            drop(state);
            self.discard(args.iter().map(String::len).sum());
            return;
        }

        let mut cut = 0;
        for arg in &mut args {
            cut += truncate(arg, remaining);
            remaining -= arg.len();
        }
        state.bytes = self.max_bytes - remaining;
        state.entries.push(LogEntry {
            level,
            args,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        });
        drop(state);
        self.add_dropped_bytes(cut);
    }

    /// Records a line that was not kept, `bytes` long.
    pub fn discard(&self, bytes: usize) {
        if !self.enabled {
            return;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.add_dropped_bytes(bytes);
    }

    /// Records `bytes` cut from a line before it reached the buffer.
    pub fn add_dropped_bytes(&self, bytes: usize) {
        if self.enabled && bytes > 0 {
            self.dropped_bytes.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Copy of the lines captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.state.lock().entries.clone()
    }

    /// Lines discarded because the buffer was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Argument bytes cut or discarded.
    #[must_use]
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes.load(Ordering::Relaxed)
    }
}

/// Cuts `text` to at most `max` bytes on a char boundary and returns the
/// number of bytes removed.
fn truncate(text: &mut String, max: usize) -> usize {
    if text.len() <= max {
        return 0;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let cut = text.len() - end;
    text.truncate(end);
    cut
}
