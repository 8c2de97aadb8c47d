//! Compilation log model.
//!
//! Stores the lines of a compilation log in order, grouped by the method
//! being compiled, and answers windowed queries around a line. One entry can
//! span several physical lines, so entries are addressed either by position
//! (`index`) or by the physical line they start on (`line_number`).

use std::fmt;
use thiserror::Error;
use tracing::trace;

// =============================================================================
// Errors
// =============================================================================

/// Log lookup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("no log entry at or after line {0}")]
    NoSuchLine(usize),
    #[error("log entry index {index} out of range ({len} entries)")]
    NoSuchIndex { index: usize, len: usize },
    #[error("unknown method #{0}")]
    UnknownMethod(usize),
}

pub type LogResult<T> = Result<T, LogError>;

// =============================================================================
// Entries
// =============================================================================

/// Index of a method in a [`LogModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(usize);

impl MethodId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A compiled method the log talks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    /// Physical line of the method's first entry, once it has one.
    pub first_line: Option<usize>,
}

/// One log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Physical line the entry starts on.
    pub line_number: usize,
    pub text: String,
    pub method: Option<MethodId>,
}

impl LogLine {
    /// Number of physical lines the entry covers.
    pub fn height(&self) -> usize {
        self.text.lines().count().max(1)
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// =============================================================================
// Log Model
// =============================================================================

/// Ordered log entries plus the methods they belong to.
#[derive(Debug, Default)]
pub struct LogModel {
    methods: Vec<Method>,
    logs: Vec<LogLine>,
    /// Physical line the next entry starts on.
    next_line: usize,
}

impl LogModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method.
    pub fn add_method(&mut self, name: impl Into<String>) -> MethodId {
        let id = MethodId(self.methods.len());
        self.methods.push(Method {
            name: name.into(),
            first_line: None,
        });
        id
    }

    /// Append an entry and return the physical line it starts on.
    pub fn add_line(&mut self, method: Option<MethodId>, text: impl Into<String>) -> LogResult<usize> {
        if let Some(id) = method {
            let entry = self
                .methods
                .get_mut(id.0)
                .ok_or(LogError::UnknownMethod(id.0))?;
            entry.first_line.get_or_insert(self.next_line);
        }

        let line = LogLine {
            line_number: self.next_line,
            text: text.into(),
            method,
        };
        self.next_line += line.height();
        trace!(line = line.line_number, height = line.height(), "log entry added");

        let number = line.line_number;
        self.logs.push(line);
        Ok(number)
    }

    /// All methods in registration order.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Look up a method.
    pub fn method(&self, id: MethodId) -> LogResult<&Method> {
        self.methods.get(id.0).ok_or(LogError::UnknownMethod(id.0))
    }

    /// All entries in order.
    pub fn logs(&self) -> &[LogLine] {
        &self.logs
    }

    /// Entries belonging to `method`.
    pub fn logs_of(&self, method: MethodId) -> impl Iterator<Item = &LogLine> + '_ {
        self.logs.iter().filter(move |l| l.method == Some(method))
    }

    /// Entry at position `index` with up to `pre` entries before and `post`
    /// after it. The window is clamped to the log.
    pub fn range(&self, index: usize, pre: usize, post: usize) -> LogResult<&[LogLine]> {
        let len = self.logs.len();
        if index >= len {
            return Err(LogError::NoSuchIndex { index, len });
        }
        let from = index.saturating_sub(pre);
        let to = index.saturating_add(post).saturating_add(1).min(len);
        Ok(&self.logs[from..to])
    }

    /// Like [`range`](Self::range), centered on the entry for `line_number`.
    pub fn range_around_line(&self, line_number: usize, pre: usize, post: usize) -> LogResult<&[LogLine]> {
        let index = self.index_of_line(line_number)?;
        self.range(index, pre, post)
    }

    /// The window of [`range`](Self::range) joined with newlines.
    pub fn range_as_string(&self, index: usize, pre: usize, post: usize) -> LogResult<String> {
        let lines: Vec<&str> = self
            .range(index, pre, post)?
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        Ok(lines.join("\n"))
    }

    /// First entry whose line number is at least `line_number`.
    pub fn log_line(&self, line_number: usize) -> LogResult<&LogLine> {
        let index = self.index_of_line(line_number)?;
        Ok(&self.logs[index])
    }

    fn index_of_line(&self, line_number: usize) -> LogResult<usize> {
        let index = self.logs.partition_point(|l| l.line_number < line_number);
        if index < self.logs.len() {
            Ok(index)
        } else {
            Err(LogError::NoSuchLine(line_number))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
