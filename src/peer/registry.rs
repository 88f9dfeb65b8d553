//! Peer session registry.
//!
//! Single owner and arbiter of peer session existence: at most one
//! non-closed session per peer at any instant. Only the negotiation
//! engine mutates it; telemetry reads `size`.

use super::session::{NegotiationState, PeerSession};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Holds one negotiation session per remote peer
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Arc<PeerSession>>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `session` only if the registry entry for its peer is still
    /// `expected` (by pointer identity; `None` means no entry). A
    /// replaced session is closed. Returns false, inserting nothing,
    /// when the entry changed — the caller's work was superseded while
    /// it was suspended and must be discarded.
    pub async fn upsert_if(
        &self,
        expected: Option<&Arc<PeerSession>>,
        session: Arc<PeerSession>,
    ) -> bool {
        let peer_id = session.peer_id().to_string();
        let replaced = {
            let mut peers = self.peers.write().await;
            let unchanged = match (peers.get(&peer_id), expected) {
                (None, None) => true,
                (Some(current), Some(expected)) => Arc::ptr_eq(current, expected),
                _ => false,
            };
            if !unchanged {
                debug!("Rejecting stale session insert for peer {peer_id}");
                return false;
            }
            peers.insert(peer_id.clone(), session)
        };

        if let Some(old) = replaced {
            info!(
                "Replacing session {} for peer {peer_id}",
                old.session_id()
            );
            old.set_state(NegotiationState::Closed).await;
            if let Err(e) = old.link().close().await {
                warn!("Error closing replaced connection for {peer_id}: {e}");
            }
        } else {
            debug!("Registered session for peer {peer_id}");
        }
        true
    }

    /// Current session for a peer, if any
    pub async fn get(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        self.peers.read().await.get(peer_id).cloned()
    }

    /// Remove and return the session for a peer. The caller owns
    /// closing the native connection.
    pub async fn remove(&self, peer_id: &str) -> Option<Arc<PeerSession>> {
        let removed = self.peers.write().await.remove(peer_id);
        if removed.is_some() {
            debug!("Removed session for peer {peer_id}");
        }
        removed
    }

    /// Remove `session` only if it is still the live entry for its peer.
    /// A superseded session is left untouched and `false` is returned.
    pub async fn remove_if_current(&self, session: &Arc<PeerSession>) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get(session.peer_id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                peers.remove(session.peer_id());
                true
            }
            _ => false,
        }
    }

    /// Whether `session` is still the live entry for its peer
    pub async fn is_current(&self, session: &Arc<PeerSession>) -> bool {
        self.peers
            .read()
            .await
            .get(session.peer_id())
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    /// Number of active sessions (consumed by telemetry)
    pub async fn size(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Peer ids with an active session
    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    /// Remove every session, closing each native connection
    pub async fn clear(&self) -> Vec<String> {
        let drained: Vec<_> = self.peers.write().await.drain().collect();
        let mut removed = Vec::with_capacity(drained.len());

        for (peer_id, session) in drained {
            session.set_state(NegotiationState::Closed).await;
            if let Err(e) = session.link().close().await {
                warn!("Error closing connection for {peer_id}: {e}");
            }
            removed.push(peer_id);
        }
        removed
    }
}
