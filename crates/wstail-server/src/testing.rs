//! Test doubles shared across modules.

use tokio::sync::mpsc;
use wstail_core::{ChangeEvent, ChangeNotifier, TailError, TailResult};

/// Notifier that fires when the test says so and fails once the sender drops.
pub struct ManualNotifier(mpsc::UnboundedReceiver<()>);

impl ChangeNotifier for ManualNotifier {
    async fn wait(&mut self) -> TailResult<ChangeEvent> {
        self.0
            .recv()
            .await
            .map(|_| ChangeEvent)
            .ok_or_else(|| TailError::Notify("closed".into()))
    }
}

pub fn manual_notifier() -> (mpsc::UnboundedSender<()>, ManualNotifier) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ManualNotifier(rx))
}

/// Scratch log file pre-filled with `content`.
pub fn log_file(content: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn append(path: &std::path::Path, text: &str) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
}
