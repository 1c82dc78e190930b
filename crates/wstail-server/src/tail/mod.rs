//! File tailing: change notification, incremental line reads, rolling window.

pub mod notifier;
pub mod tailer;
pub mod window;

pub use notifier::{Notifier, NotifierKind};
pub use tailer::Tailer;
