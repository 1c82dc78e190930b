//! Incremental line reader over a growing file.
//!
//! Reads from the start of the file, pushes each complete line into the
//! rolling window and emits a snapshot per line. Once the file is drained it
//! emits the current snapshot again and parks on the change notifier, so no
//! CPU is spent while the file is idle.

use super::window::LineWindow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use wstail_core::{ChangeNotifier, Snapshot, TailError, TailResult};

pub struct Tailer<N> {
    path: PathBuf,
    reader: BufReader<File>,
    notifier: N,
    window: LineWindow,
    /// Bytes consumed as complete lines.
    cursor: u64,
    /// Trailing bytes still waiting for their terminator.
    pending: Vec<u8>,
}

impl<N: ChangeNotifier> Tailer<N> {
    /// Open `path` for tailing from its first byte.
    ///
    /// The notifier must already be registered so writes that land during
    /// the initial drain still wake the first wait.
    pub async fn open(path: &Path, window: usize, notifier: N) -> TailResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| TailError::path(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            notifier,
            window: LineWindow::new(window),
            cursor: 0,
            pending: Vec::new(),
        })
    }

    /// Byte offset up to which complete lines have been consumed.
    #[cfg(test)]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[cfg(test)]
    pub fn window(&self) -> &LineWindow {
        &self.window
    }

    /// Read the next complete line, or `None` once the file is exhausted.
    ///
    /// A trailing partial line stays in `pending` and is completed by a later
    /// call; it is never returned twice.
    async fn next_line(&mut self) -> TailResult<Option<Arc<str>>> {
        self.reader
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(TailError::Read)?;

        if self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.pending);
        self.cursor += bytes.len() as u64;
        Ok(Some(Arc::from(String::from_utf8_lossy(&bytes).into_owned())))
    }

    /// Consume every complete line currently in the file.
    ///
    /// Emits one snapshot per line and a final one at end-of-content, even
    /// when nothing new was read.
    pub async fn drain(&mut self, out: &mpsc::Sender<Snapshot>) -> TailResult<()> {
        while let Some(line) = self.next_line().await? {
            self.window.push(line);
            emit(out, self.window.snapshot()).await?;
        }
        trace!(
            path = %self.path.display(),
            cursor = self.cursor,
            pending = self.pending.len(),
            window = self.window.len(),
            total_lines = self.window.total_pushed(),
            "drained to end of file"
        );
        emit(out, self.window.snapshot()).await
    }

    /// Tail forever: drain, wait for a change, repeat.
    ///
    /// Returns only on error; every error is terminal for the session.
    pub async fn run(mut self, out: mpsc::Sender<Snapshot>) -> TailResult<()> {
        debug!(path = %self.path.display(), window = self.window.capacity(), "tailer started");
        loop {
            self.drain(&out).await?;
            self.notifier.wait().await?;
        }
    }
}

async fn emit(out: &mpsc::Sender<Snapshot>, snapshot: Snapshot) -> TailResult<()> {
    out.send(snapshot)
        .await
        .map_err(|_| TailError::Write("stream writer stopped".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{append, log_file, manual_notifier as manual};
    use std::time::Duration;
    use tokio::time::timeout;

    fn collect(rx: &mut mpsc::Receiver<Snapshot>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(s) = rx.try_recv() {
            out.push(s.to_text());
        }
        out
    }

    #[tokio::test]
    async fn snapshot_after_drain_holds_last_n() {
        let file = log_file("a\nb\nc\n");
        let (_tx, notifier) = manual();
        let mut tailer = Tailer::open(file.path(), 2, notifier).await.unwrap();
        let (out, mut rx) = mpsc::channel(16);

        tailer.drain(&out).await.unwrap();

        let snaps = collect(&mut rx);
        assert_eq!(snaps, vec!["a\n", "a\nb\n", "b\nc\n", "b\nc\n"]);
        assert_eq!(tailer.cursor(), 6);
    }

    #[tokio::test]
    async fn existing_content_streams_before_any_change() {
        let file = log_file("first\nsecond\n");
        let (_tx, notifier) = manual();
        let tailer = Tailer::open(file.path(), 10, notifier).await.unwrap();
        let (out, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(tailer.run(out));

        let mut last = String::new();
        for _ in 0..3 {
            let snap = timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            last = snap.to_text();
        }
        assert_eq!(last, "first\nsecond\n");
        task.abort();
    }

    #[tokio::test]
    async fn empty_file_emits_empty_snapshot() {
        let file = log_file("");
        let (_tx, notifier) = manual();
        let mut tailer = Tailer::open(file.path(), 10, notifier).await.unwrap();
        let (out, mut rx) = mpsc::channel(16);

        tailer.drain(&out).await.unwrap();
        assert_eq!(collect(&mut rx), vec![""]);
        assert_eq!(tailer.cursor(), 0);
    }

    #[tokio::test]
    async fn partial_line_is_not_duplicated_on_reread() {
        let file = log_file("a\nparti");
        let (_tx, notifier) = manual();
        let mut tailer = Tailer::open(file.path(), 10, notifier).await.unwrap();
        let (out, mut rx) = mpsc::channel(16);

        tailer.drain(&out).await.unwrap();
        assert_eq!(tailer.cursor(), 2);

        // Spurious wake with nothing new.
        tailer.drain(&out).await.unwrap();
        assert_eq!(tailer.cursor(), 2);
        assert_eq!(tailer.window().len(), 1);
        assert_eq!(collect(&mut rx).last().unwrap(), "a\n");

        append(file.path(), "al\n");
        tailer.drain(&out).await.unwrap();
        assert_eq!(tailer.cursor(), 10);
        assert_eq!(collect(&mut rx).last().unwrap(), "a\npartial\n");
    }

    #[tokio::test]
    async fn change_notification_picks_up_growth() {
        let file = log_file("one\n");
        let (tx, notifier) = manual();
        let tailer = Tailer::open(file.path(), 2, notifier).await.unwrap();
        let (out, mut rx) = mpsc::channel(16);
        let task = tokio::spawn(tailer.run(out));

        // "one\n" then the end-of-file repeat.
        for _ in 0..2 {
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        }

        append(file.path(), "two\nthree\n");
        tx.send(()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let snap = timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(snap.to_text());
        }
        assert_eq!(seen, vec!["one\ntwo\n", "two\nthree\n", "two\nthree\n"]);
        task.abort();
    }

    #[tokio::test]
    async fn notifier_failure_ends_the_tailer() {
        let file = log_file("x\n");
        let (tx, notifier) = manual();
        let tailer = Tailer::open(file.path(), 10, notifier).await.unwrap();
        let (out, _rx) = mpsc::channel(16);

        drop(tx);
        let res = timeout(Duration::from_secs(5), tailer.run(out)).await.unwrap();
        assert!(matches!(res, Err(TailError::Notify(_))));
    }

    #[tokio::test]
    async fn writer_gone_ends_the_tailer() {
        let file = log_file("x\n");
        let (_tx, notifier) = manual();
        let tailer = Tailer::open(file.path(), 10, notifier).await.unwrap();
        let (out, rx) = mpsc::channel(16);

        drop(rx);
        let res = tailer.run(out).await;
        assert!(matches!(res, Err(TailError::Write(_))));
    }

    #[tokio::test]
    async fn missing_file_is_a_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, notifier) = manual();
        let res = Tailer::open(&dir.path().join("absent.log"), 10, notifier).await;
        assert!(matches!(res, Err(TailError::Path { .. })));
    }
}
