use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while tailing a file and streaming it to a peer.
///
/// Every variant is terminal for the session that produced it; nothing is
/// retried. Clients are expected to reconnect.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("cannot open {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("change notification failed: {0}")]
    Notify(String),

    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    #[error("write error: {0}")]
    Write(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(&'static str),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("connection closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("max sessions ({0}) reached")]
    AtCapacity(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TailError {
    /// Wrap an open failure with the path that caused it.
    pub fn path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TailError::Path {
            path: path.into(),
            source,
        }
    }

    /// Whether the peer simply went away, as opposed to a local failure.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TailError::Closed)
    }
}

pub type TailResult<T> = Result<T, TailError>;
