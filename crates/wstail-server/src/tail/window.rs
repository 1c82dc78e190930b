//! Rolling window of the most recent complete lines.
//!
//! Keeps the last N lines of the watched file so every outbound frame can be
//! a full replacement snapshot without the server holding unbounded history.

use std::collections::VecDeque;
use std::sync::Arc;
use wstail_core::Snapshot;

/// A fixed-capacity, most-recent-N buffer of lines.
#[derive(Debug)]
pub struct LineWindow {
    lines: VecDeque<Arc<str>>,
    capacity: usize,
    /// Total lines ever pushed.
    total_pushed: u64,
}

impl LineWindow {
    /// Create a window holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
        }
    }

    /// Append a line, evicting the oldest if the window is full.
    ///
    /// Never holds more than `capacity` lines, not even transiently.
    pub fn push(&mut self, line: impl Into<Arc<str>>) {
        self.total_pushed += 1;
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Immutable copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.lines.iter().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total lines ever pushed through this window.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_n_in_order() {
        let mut w = LineWindow::new(2);
        for line in ["a\n", "b\n", "c\n"] {
            w.push(line);
        }
        assert_eq!(w.snapshot().to_text(), "b\nc\n");
        assert_eq!(w.total_pushed(), 3);
    }

    #[test]
    fn never_exceeds_capacity() {
        let cap = 10;
        let mut w = LineWindow::new(cap);
        for i in 0..57usize {
            w.push(format!("line {i}\n"));
            assert!(w.len() <= cap);
            let expected: String = (i.saturating_sub(cap - 1)..=i)
                .map(|j| format!("line {j}\n"))
                .collect();
            assert_eq!(w.snapshot().to_text(), expected);
        }
    }

    #[test]
    fn partially_filled() {
        let mut w = LineWindow::new(10);
        w.push("only\n");
        assert_eq!(w.len(), 1);
        assert_eq!(w.snapshot().to_text(), "only\n");
    }

    #[test]
    fn empty_window() {
        let w = LineWindow::new(10);
        assert!(w.is_empty());
        assert!(w.snapshot().is_empty());
    }

    #[test]
    fn zero_capacity() {
        let mut w = LineWindow::new(0);
        w.push("dropped\n");
        assert!(w.is_empty());
        assert_eq!(w.total_pushed(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let mut w = LineWindow::new(2);
        w.push("a\n");
        let before = w.snapshot();
        w.push("b\n");
        w.push("c\n");
        assert_eq!(before.to_text(), "a\n");
        assert_eq!(w.snapshot().to_text(), "b\nc\n");
    }

    #[test]
    fn snapshots_share_line_storage() {
        let mut w = LineWindow::new(2);
        w.push("a\n");
        w.push("b\n");
        let first = w.snapshot();
        let second = w.snapshot();
        assert_eq!(first.lines().len(), 2);
        for (x, y) in first.lines().iter().zip(second.lines()) {
            assert!(Arc::ptr_eq(x, y));
        }
    }
}
