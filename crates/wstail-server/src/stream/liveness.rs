//! Inbound half of a session.
//!
//! The server does not interpret application messages. It reads only to
//! observe Pongs (which push the read deadline out), Close frames and
//! errors. Silence past the deadline means the peer is gone.

use futures_util::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};
use wstail_core::{TailError, TailResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Alive,
    Dead,
}

/// Read deadline that Pongs renew.
#[derive(Debug)]
pub struct Deadline {
    window: Duration,
    expires: Instant,
    state: LivenessState,
}

impl Deadline {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            expires: now + window,
            state: LivenessState::Alive,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.expires
    }

    #[cfg(test)]
    pub fn state(&self) -> LivenessState {
        self.state
    }

    /// A probe acknowledgement arrived at `now`.
    ///
    /// Extends the deadline only while still alive; an ack at or after the
    /// deadline cannot revive the session.
    pub fn renew(&mut self, now: Instant) -> LivenessState {
        if self.state == LivenessState::Alive && now < self.expires {
            self.expires = now + self.window;
        } else {
            self.state = LivenessState::Dead;
        }
        self.state
    }

    pub fn expire(&mut self) {
        self.state = LivenessState::Dead;
    }
}

pub struct LivenessMonitor<S> {
    stream: S,
    deadline: Deadline,
    max_message_size: usize,
}

impl<S> LivenessMonitor<S>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin + Send,
{
    pub fn new(stream: S, pong_wait: Duration, max_message_size: usize) -> Self {
        Self {
            stream,
            deadline: Deadline::new(pong_wait, Instant::now()),
            max_message_size,
        }
    }

    /// Read until the connection dies. Always returns the reason as an error.
    pub async fn run(mut self) -> TailResult<()> {
        loop {
            let next = match timeout_at(self.deadline.expires_at(), self.stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    self.deadline.expire();
                    return Err(TailError::DeadlineExceeded("read"));
                }
            };

            match next {
                Some(Ok(Message::Pong(_))) => {
                    if self.deadline.renew(Instant::now()) == LivenessState::Dead {
                        return Err(TailError::DeadlineExceeded("read"));
                    }
                    trace!("pong received, read deadline extended");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer sent close");
                    return Err(TailError::Closed);
                }
                Some(Ok(msg)) => {
                    if msg.len() > self.max_message_size {
                        return Err(TailError::ProtocolViolation(format!(
                            "inbound message too large: {} bytes (max {})",
                            msg.len(),
                            self.max_message_size
                        )));
                    }
                    // Pings are answered by the codec; everything else is ignored.
                }
                Some(Err(e)) => return Err(read_error(e)),
                None => return Err(TailError::Closed),
            }
        }
    }
}

fn read_error(e: WsError) -> TailError {
    match e {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => TailError::Closed,
        WsError::Capacity(e) => TailError::ProtocolViolation(e.to_string()),
        WsError::Io(e) => TailError::Io(e),
        other => TailError::Transport(format!("WS recv failed: {other}")),
    }
}
