//! Change-notification seam for the tailer.
//!
//! The tailer only needs to know that the watched file changed; it re-reads
//! the file to find out what. Backends (OS events, polling, test doubles)
//! implement [`ChangeNotifier`].

use crate::error::TailResult;
use std::future::Future;

/// "The watched file was modified since the last check." Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent;

/// A source of content-modification events for a single file.
///
/// Dropping the notifier releases whatever OS handle backs it.
pub trait ChangeNotifier: Send {
    /// Suspend until the file's content is modified.
    ///
    /// Metadata-only changes must not wake the caller. An error is terminal:
    /// the notifier is exhausted or was closed underneath us.
    fn wait(&mut self) -> impl Future<Output = TailResult<ChangeEvent>> + Send;
}
