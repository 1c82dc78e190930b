//! Outbound half of a session.
//!
//! Sends each snapshot as a text frame and a Ping every probe period. Both
//! duties run in one loop that exclusively owns the sink, so frames are
//! never interleaved.

use futures_util::{Sink, SinkExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};
use wstail_core::{Snapshot, TailError, TailResult};

pub struct StreamWriter<S> {
    sink: S,
    ping_period: Duration,
    write_wait: Duration,
    sent_snapshots: u64,
}

impl<S> StreamWriter<S>
where
    S: Sink<Message, Error = WsError> + Unpin + Send,
{
    pub fn new(sink: S, ping_period: Duration, write_wait: Duration) -> Self {
        Self {
            sink,
            ping_period,
            write_wait,
            sent_snapshots: 0,
        }
    }

    /// Forward snapshots and probes until a write fails or the tailer stops.
    pub async fn run(mut self, mut snapshots: mpsc::Receiver<Snapshot>) -> TailResult<()> {
        let mut ping = tokio::time::interval_at(Instant::now() + self.ping_period, self.ping_period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                snapshot = snapshots.recv() => {
                    let Some(snapshot) = snapshot else {
                        debug!(sent = self.sent_snapshots, "snapshot source closed");
                        return Ok(());
                    };
                    trace!(lines = snapshot.len(), "sending snapshot");
                    self.send(Message::Text(snapshot.to_text()), "snapshot").await?;
                    self.sent_snapshots += 1;
                }
                _ = ping.tick() => {
                    trace!("sending liveness probe");
                    self.send(Message::Ping(Vec::new()), "ping").await?;
                }
            }
        }
    }

    async fn send(&mut self, msg: Message, what: &str) -> TailResult<()> {
        match timeout(self.write_wait, self.sink.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TailError::Write(format!("{what} send failed: {e}"))),
            Err(_) => Err(TailError::DeadlineExceeded("write")),
        }
    }
}
