//! Network transport for sessions.

pub mod websocket;

pub use websocket::{start_listener, ws_close, ws_config, WebSocketConnection};
