//! Immutable view of the rolling line window.

use std::sync::Arc;

/// The most recent lines of the watched file at one instant, oldest first.
///
/// Lines keep their `\n` terminators. A snapshot is produced fresh on every
/// update and handed over by value; lines are shared, never copied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    lines: Vec<Arc<str>>,
}

impl Snapshot {
    pub fn new(lines: Vec<Arc<str>>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[Arc<str>] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the wire form: every line concatenated, no extra delimiter.
    pub fn to_text(&self) -> String {
        let size = self.lines.iter().map(|l| l.len()).sum();
        let mut out = String::with_capacity(size);
        for line in &self.lines {
            out.push_str(line);
        }
        out
    }
}
