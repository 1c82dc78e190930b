//! wstail-core: shared types for the wstail log streamer.
//!
//! Provides the error taxonomy, the change-notifier seam the tailer waits
//! on, and the immutable line snapshot pushed to peers.

pub mod error;
pub mod notify;
pub mod snapshot;

// Re-export commonly used items at crate root.
pub use error::{TailError, TailResult};
pub use notify::{ChangeEvent, ChangeNotifier};
pub use snapshot::Snapshot;
