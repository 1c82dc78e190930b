//! Change-notifier backends.
//!
//! `Native` wraps the platform watcher picked by the `notify` crate (inotify
//! on Linux, FSEvents on macOS, ReadDirectoryChangesW on Windows). `Poll`
//! stats the file on an interval for filesystems that emit no events
//! (network mounts, some containers).

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, trace};
use wstail_core::{ChangeEvent, ChangeNotifier, TailError, TailResult};

/// Which backend to watch the file with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Native,
    Poll,
}

/// Notifier backed by OS file events.
pub struct FsNotifier {
    path: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    /// Dropping the watcher removes the OS watch.
    _watcher: RecommendedWatcher,
}

impl FsNotifier {
    /// Register interest in modifications of `path`.
    pub fn open(path: &Path) -> TailResult<Self> {
        std::fs::metadata(path).map_err(|e| TailError::path(path, e))?;

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // Receiver gone means the session is over.
            let _ = tx.send(res);
        })
        .map_err(|e| TailError::Notify(format!("watcher init failed: {e}")))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| watch_error(path, e))?;

        debug!(path = %path.display(), "native file watch registered");
        Ok(Self {
            path: path.to_path_buf(),
            events,
            _watcher: watcher,
        })
    }

    /// Swallow everything already queued so one wait covers a burst of writes.
    fn coalesce(&mut self) -> TailResult<()> {
        while let Ok(queued) = self.events.try_recv() {
            queued.map_err(|e| TailError::Notify(e.to_string()))?;
        }
        Ok(())
    }
}

impl ChangeNotifier for FsNotifier {
    async fn wait(&mut self) -> TailResult<ChangeEvent> {
        loop {
            let event = self
                .events
                .recv()
                .await
                .ok_or_else(|| TailError::Notify("watch handle closed".into()))?
                .map_err(|e| TailError::Notify(e.to_string()))?;

            if is_content_change(&event.kind) {
                self.coalesce()?;
                return Ok(ChangeEvent);
            }
            trace!(path = %self.path.display(), kind = ?event.kind, "ignoring non-content event");
        }
    }
}

/// Only data writes count; attribute, rename and access events do not.
fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

fn watch_error(path: &Path, err: notify::Error) -> TailError {
    match err.kind {
        notify::ErrorKind::PathNotFound => {
            TailError::path(path, io::Error::from(io::ErrorKind::NotFound))
        }
        notify::ErrorKind::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ) =>
        {
            TailError::path(path, e)
        }
        kind => TailError::Notify(notify::Error::new(kind).to_string()),
    }
}

/// Notifier that compares the file length on a fixed interval.
///
/// Only a length change counts; a bare mtime bump (`touch`) is metadata.
pub struct PollNotifier {
    path: PathBuf,
    interval: Interval,
    last_len: u64,
}

impl PollNotifier {
    pub fn open(path: &Path, period: Duration) -> TailResult<Self> {
        let meta = std::fs::metadata(path).map_err(|e| TailError::path(path, e))?;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(path = %path.display(), period_ms = period.as_millis() as u64, "polling file watch registered");
        Ok(Self {
            path: path.to_path_buf(),
            interval,
            last_len: meta.len(),
        })
    }
}

impl ChangeNotifier for PollNotifier {
    async fn wait(&mut self) -> TailResult<ChangeEvent> {
        loop {
            self.interval.tick().await;
            let meta = tokio::fs::metadata(&self.path).await.map_err(|e| {
                TailError::Notify(format!("stat {} failed: {e}", self.path.display()))
            })?;
            if meta.len() != self.last_len {
                self.last_len = meta.len();
                return Ok(ChangeEvent);
            }
        }
    }
}

/// The backend chosen at runtime from configuration.
pub enum Notifier {
    Native(FsNotifier),
    Poll(PollNotifier),
}

impl Notifier {
    pub fn open(path: &Path, kind: NotifierKind, poll_interval: Duration) -> TailResult<Self> {
        match kind {
            NotifierKind::Native => FsNotifier::open(path).map(Notifier::Native),
            NotifierKind::Poll => PollNotifier::open(path, poll_interval).map(Notifier::Poll),
        }
    }
}

impl ChangeNotifier for Notifier {
    async fn wait(&mut self) -> TailResult<ChangeEvent> {
        match self {
            Notifier::Native(n) => n.wait().await,
            Notifier::Poll(n) => n.wait().await,
        }
    }
}
