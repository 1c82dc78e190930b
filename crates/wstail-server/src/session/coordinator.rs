//! Per-connection session: one task tails and writes, one task reads.
//!
//! Whichever task finishes first decides the outcome. The other is aborted
//! and awaited before `run` returns, so the file, the notifier and both
//! halves of the socket are released on every exit path.

use crate::config::{LivenessSettings, TailSettings};
use crate::stream::{LivenessMonitor, StreamWriter};
use crate::tail::{Notifier, Tailer};
use crate::transport;
use futures_util::{Sink, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};
use wstail_core::{ChangeNotifier, TailError, TailResult};

/// Snapshots buffered between the tailer and the writer.
const SNAPSHOT_QUEUE: usize = 64;

/// How a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The tail/write side stopped first.
    Outbound(TailError),
    /// The read/liveness side stopped first.
    Inbound(TailError),
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    /// Whether the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SessionEnd::Inbound(e) => {
                e.is_disconnect() || matches!(e, TailError::DeadlineExceeded(_))
            }
            SessionEnd::Outbound(_) | SessionEnd::Shutdown => false,
        }
    }

    /// The failure that ended the session; `None` on server shutdown.
    pub fn error(&self) -> Option<&TailError> {
        match self {
            SessionEnd::Outbound(e) | SessionEnd::Inbound(e) => Some(e),
            SessionEnd::Shutdown => None,
        }
    }
}

/// Builds and runs sessions from explicit settings.
#[derive(Debug, Clone)]
pub struct SessionCoordinator {
    tail: TailSettings,
    liveness: LivenessSettings,
}

impl SessionCoordinator {
    pub fn new(tail: TailSettings, liveness: LivenessSettings) -> Self {
        Self { tail, liveness }
    }

    /// Open the watched file for a new session.
    ///
    /// The notifier is registered before the file is opened so nothing
    /// written during the initial drain is missed.
    pub async fn open_tailer(&self) -> TailResult<Tailer<Notifier>> {
        let notifier = Notifier::open(&self.tail.path, self.tail.notifier, self.tail.poll_interval)?;
        Tailer::open(&self.tail.path, self.tail.window, notifier).await
    }

    /// Serve one WebSocket connection until it fails or the server stops.
    ///
    /// A file that cannot be opened fails the session before any task starts;
    /// the peer gets a Close frame and the error is returned.
    pub async fn run<S>(
        &self,
        session_id: &str,
        mut ws: WebSocketStream<S>,
        shutdown: broadcast::Receiver<()>,
    ) -> TailResult<SessionEnd>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let tailer = match self.open_tailer().await {
            Ok(t) => t,
            Err(e) => {
                warn!(session_id, error = %e, "cannot start session");
                transport::ws_close(&mut ws, CloseCode::Error, "log file unavailable").await;
                return Err(e);
            }
        };

        info!(session_id, path = %self.tail.path.display(), "session started");
        let (sink, stream) = ws.split();
        let end = self.run_duties(tailer, sink, stream, shutdown).await;
        info!(session_id, outcome = ?end, "session ended");
        Ok(end)
    }

    /// Run the outbound and inbound duties as two tasks until one ends.
    pub async fn run_duties<N, Si, St>(
        &self,
        tailer: Tailer<N>,
        sink: Si,
        stream: St,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SessionEnd
    where
        N: ChangeNotifier + 'static,
        Si: Sink<Message, Error = WsError> + Unpin + Send + 'static,
        St: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let live = &self.liveness;
        let (snap_tx, snap_rx) = mpsc::channel(SNAPSHOT_QUEUE);
        let writer = StreamWriter::new(sink, live.ping_period, live.write_wait);
        let monitor = LivenessMonitor::new(stream, live.pong_wait, live.max_message_size);

        let mut outbound = tokio::spawn(async move {
            tokio::try_join!(tailer.run(snap_tx), writer.run(snap_rx)).map(|_| ())
        });
        let mut inbound = tokio::spawn(monitor.run());

        tokio::select! {
            res = &mut outbound => {
                inbound.abort();
                let _ = inbound.await;
                SessionEnd::Outbound(duty_error(res))
            }
            res = &mut inbound => {
                outbound.abort();
                let _ = outbound.await;
                SessionEnd::Inbound(duty_error(res))
            }
            _ = shutdown.recv() => {
                debug!("shutdown signal received, tearing down session");
                outbound.abort();
                inbound.abort();
                let _ = tokio::join!(outbound, inbound);
                SessionEnd::Shutdown
            }
        }
    }
}

/// Both duties only stop on failure; `Ok` means the writer saw the tailer go.
fn duty_error(res: Result<TailResult<()>, JoinError>) -> TailError {
    match res {
        Ok(Ok(())) => TailError::Closed,
        Ok(Err(e)) => e,
        Err(e) => TailError::Transport(format!("session task failed: {e}")),
    }
}
