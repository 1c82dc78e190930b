//! The two directions of a session's WebSocket.

pub mod liveness;
pub mod writer;

pub use liveness::LivenessMonitor;
pub use writer::StreamWriter;
