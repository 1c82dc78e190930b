//! Live session bookkeeping.
//!
//! Sessions share nothing with each other; the registry only counts them so
//! the server can enforce `max_sessions` and report who is connected.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};
use wstail_core::{TailError, TailResult};

struct Entry {
    remote: SocketAddr,
    created_at: Instant,
}

/// Summary of a session for listing.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub remote: SocketAddr,
    pub age_secs: u64,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Entry>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Reserve a slot for a new connection and return its session id.
    pub async fn register(&self, remote: SocketAddr) -> TailResult<String> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(TailError::AtCapacity(self.max_sessions));
        }

        let session_id = generate_session_id();
        sessions.insert(
            session_id.clone(),
            Entry {
                remote,
                created_at: Instant::now(),
            },
        );
        info!(session_id = %session_id, remote = %remote, active = sessions.len(), "session registered");
        Ok(session_id)
    }

    pub async fn unregister(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.remove(session_id) {
            debug!(
                session_id,
                lived_secs = entry.created_at.elapsed().as_secs(),
                active = sessions.len(),
                "session unregistered"
            );
        }
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(id, e)| SessionInfo {
                id: id.clone(),
                remote: e.remote,
                age_secs: e.created_at.elapsed().as_secs(),
            })
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Generate a random session ID (hex-encoded, 16 bytes = 32 hex chars).
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}
