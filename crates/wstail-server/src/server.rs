//! Core server: accepts connections and dispatches each to a session.
//!
//! Owns the session registry and the shutdown broadcast. Sessions are
//! tracked in a `JoinSet` so shutdown can wait for every one of them to
//! release its file and socket.

use crate::config::ServerConfig;
use crate::session::{SessionCoordinator, SessionRegistry};
use crate::transport::{self, WebSocketConnection};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};
use wstail_core::TailResult;

/// The wstail server instance.
pub struct TailServer {
    config: ServerConfig,
    coordinator: SessionCoordinator,
    registry: Arc<SessionRegistry>,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl TailServer {
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = SessionCoordinator::new(config.tail.clone(), config.liveness.clone());
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        Self {
            config,
            coordinator,
            registry,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Bind the listener and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> TailResult<()> {
        let ws_config = transport::ws_config(self.config.liveness.max_message_size);
        let (_addr, conns) = transport::start_listener(
            self.config.listen,
            self.config.route.clone(),
            ws_config,
            self.config.handshake_timeout,
        )
        .await?;
        self.serve(conns, shutdown).await
    }

    /// Dispatch accepted connections until the listener closes or `shutdown`
    /// resolves, then tear down every live session.
    pub async fn serve(
        self,
        mut conns: mpsc::Receiver<WebSocketConnection>,
        shutdown: impl Future<Output = ()>,
    ) -> TailResult<()> {
        let server = Arc::new(self);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            path = %server.config.tail.path.display(),
            window = server.config.tail.window,
            notifier = ?server.config.tail.notifier,
            "serving log tail"
        );

        loop {
            tokio::select! {
                conn = conns.recv() => {
                    let Some(conn) = conn else {
                        info!("listener closed, shutting down");
                        break;
                    };
                    // Subscribe before spawning so no session can miss the shutdown.
                    let shutdown_rx = server.shutdown_tx.subscribe();
                    let server = server.clone();
                    sessions.spawn(async move { server.handle_connection(conn, shutdown_rx).await });
                }
                Some(res) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = res {
                        warn!(error = %e, "session task panicked");
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        drop(conns);
        let active = server.registry.count().await;
        info!(active, "broadcasting shutdown to live sessions");
        for s in server.registry.list().await {
            debug!(session_id = %s.id, remote = %s.remote, age_secs = s.age_secs, "closing session");
        }
        let _ = server.shutdown_tx.send(());
        while let Some(res) = sessions.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "session task panicked");
            }
        }
        Ok(())
    }

    async fn handle_connection(
        &self,
        mut conn: WebSocketConnection,
        shutdown_rx: broadcast::Receiver<()>,
    ) {
        let remote = conn.remote_addr;
        let session_id = match self.registry.register(remote).await {
            Ok(id) => id,
            Err(e) => {
                warn!(remote = %remote, error = %e, "rejecting connection");
                transport::ws_close(&mut conn.ws_stream, CloseCode::Again, "server at capacity").await;
                return;
            }
        };

        match self
            .coordinator
            .run(&session_id, conn.ws_stream, shutdown_rx)
            .await
        {
            Ok(end) => match end.error() {
                Some(e) if end.is_disconnect() => {
                    debug!(session_id = %session_id, remote = %remote, reason = %e, "peer went away");
                }
                Some(e) => {
                    info!(session_id = %session_id, remote = %remote, error = %e, "session closed");
                }
                None => {
                    debug!(session_id = %session_id, remote = %remote, "session stopped for shutdown");
                }
            },
            Err(e) => {
                warn!(session_id = %session_id, remote = %remote, error = %e, "session failed to start");
            }
        }

        self.registry.unregister(&session_id).await;
    }
}
