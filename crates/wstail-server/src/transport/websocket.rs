//! WebSocket listener using tokio-tungstenite.
//!
//! Accepts TCP connections, upgrades requests on the configured route and
//! hands finished WebSocket streams to the server loop. Origin checks are
//! deliberately absent: every upgrade on the route is accepted.

use futures_util::SinkExt;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use wstail_core::{TailError, TailResult};

/// Socket buffer size used for outbound frames.
const WRITE_BUFFER_SIZE: usize = 1024;

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Codec limits for session sockets; inbound messages above
/// `max_message_size` fail the read with a capacity error.
pub fn ws_config(max_message_size: usize) -> WebSocketConfig {
    WebSocketConfig {
        write_buffer_size: WRITE_BUFFER_SIZE,
        max_message_size: Some(max_message_size),
        max_frame_size: Some(max_message_size),
        ..WebSocketConfig::default()
    }
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful with port 0) and a receiver that
/// yields upgraded connections. Dropping the receiver stops the accept loop
/// and unbinds the socket. A peer that has not finished the upgrade within
/// `handshake_timeout` is disconnected.
pub async fn start_listener(
    bind_addr: SocketAddr,
    route: String,
    config: WebSocketConfig,
    handshake_timeout: Duration,
) -> TailResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| TailError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener
        .local_addr()
        .map_err(|e| TailError::Transport(format!("WS local addr: {e}")))?;

    info!(addr = %local_addr, route = %route, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);
    let route: Arc<str> = Arc::from(route);

    tokio::spawn(async move {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = tx.closed() => {
                    debug!("connection receiver dropped, stopping listener");
                    break;
                }
                accepted = tcp_listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    let route = route.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let check = move |req: &Request, resp: Response| check_route(&route, req, resp);
                        let handshake =
                            tokio_tungstenite::accept_hdr_async_with_config(stream, check, Some(config));
                        match timeout(handshake_timeout, handshake).await {
                            Ok(Ok(ws_stream)) => {
                                debug!(remote = %addr, "WebSocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Ok(Err(e)) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                            Err(_) => {
                                warn!(remote = %addr, timeout = ?handshake_timeout, "WebSocket handshake timed out");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Upgrade only requests for the tail route; everything else is a 404.
fn check_route(route: &str, req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == route {
        return Ok(resp);
    }
    debug!(path = %req.uri().path(), "rejecting upgrade on unknown route");
    let mut not_found = ErrorResponse::new(Some("not found".to_string()));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    Err(not_found)
}

/// Best-effort Close frame before dropping a connection we won't serve.
pub async fn ws_close<S>(ws: &mut WebSocketStream<S>, code: CloseCode, reason: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    if let Err(e) = ws.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "close frame not delivered");
    }
}
