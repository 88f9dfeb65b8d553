//! Per-peer negotiation session state.

use super::link::PeerLink;
use crate::signaling::protocol::IceCandidate;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Which side of the offer/answer exchange this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// We initiate: create and send the offer
    Offerer,
    /// The remote initiated: we answer their offer
    Answerer,
}

/// Negotiation state machine states.
///
/// Offerer path: `New → Offering → OfferSent → Stable`.
/// Answerer path: `New → OfferReceived → Answering → AnswerSent → Stable`.
/// `Failed` and `Closed` are terminal and reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Session created, no step taken yet
    New,
    /// Generating the local offer
    Offering,
    /// Offer sent, waiting for the answer
    OfferSent,
    /// Remote offer received
    OfferReceived,
    /// Generating the local answer
    Answering,
    /// Answer sent
    AnswerSent,
    /// Negotiation complete
    Stable,
    /// Negotiation failed, session torn down
    Failed,
    /// Session closed
    Closed,
}

impl NegotiationState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, NegotiationState::Failed | NegotiationState::Closed)
    }
}

/// Candidates arriving before the remote description is set are held
/// here in arrival order; the same lock serializes the drain against
/// concurrently arriving live candidates.
struct CandidateGate {
    remote_ready: bool,
    queued: Vec<IceCandidate>,
}

/// One negotiation session toward a remote peer.
///
/// Owned exclusively by the registry; only the negotiation engine
/// mutates it. The native connection handle is owned by this session and
/// closed when the session is discarded.
pub struct PeerSession {
    peer_id: String,
    session_id: String,
    role: NegotiationRole,
    state: RwLock<NegotiationState>,
    link: Arc<dyn PeerLink>,
    candidates: Mutex<CandidateGate>,
}

impl PeerSession {
    /// Create a session in offerer role
    pub fn offerer(peer_id: impl Into<String>, link: Arc<dyn PeerLink>) -> Self {
        Self::new(peer_id.into(), NegotiationRole::Offerer, link)
    }

    /// Create a session in answerer role
    pub fn answerer(peer_id: impl Into<String>, link: Arc<dyn PeerLink>) -> Self {
        Self::new(peer_id.into(), NegotiationRole::Answerer, link)
    }

    fn new(peer_id: String, role: NegotiationRole, link: Arc<dyn PeerLink>) -> Self {
        Self {
            peer_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            role,
            state: RwLock::new(NegotiationState::New),
            link,
            candidates: Mutex::new(CandidateGate {
                remote_ready: false,
                queued: Vec::new(),
            }),
        }
    }

    /// Remote peer identity
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Unique id of this session instance (diagnostics)
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Negotiation role of this session
    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    /// The native connection owned by this session
    pub fn link(&self) -> &Arc<dyn PeerLink> {
        &self.link
    }

    /// Current negotiation state
    pub async fn state(&self) -> NegotiationState {
        *self.state.read().await
    }

    /// Transition to `new_state`, returning whether the transition took
    /// effect. Terminal states are sticky: once Failed or Closed,
    /// further transitions are ignored.
    pub async fn set_state(&self, new_state: NegotiationState) -> bool {
        let mut state = self.state.write().await;
        if state.is_terminal() || *state == new_state {
            return false;
        }
        debug!(
            "Peer {} session {}: {:?} -> {:?}",
            self.peer_id, self.session_id, *state, new_state
        );
        *state = new_state;
        true
    }

    /// Apply a remote candidate if the remote description is already set,
    /// otherwise queue it in arrival order. Returns true if applied live.
    pub async fn apply_or_queue_candidate(&self, candidate: IceCandidate) -> bool {
        let mut gate = self.candidates.lock().await;

        if !gate.remote_ready {
            gate.queued.push(candidate);
            debug!(
                "Queued ICE candidate for peer {} ({} pending)",
                self.peer_id,
                gate.queued.len()
            );
            return false;
        }

        // Applied while holding the gate so live candidates cannot
        // overtake a drain in progress.
        if let Err(e) = self.link.add_ice_candidate(&candidate).await {
            warn!("Failed to apply ICE candidate for {}: {e}", self.peer_id);
        }
        true
    }

    /// Mark the remote description as set and apply all queued candidates
    /// in original arrival order. Individual candidate failures are
    /// logged and skipped. Returns the number of drained candidates.
    pub async fn drain_candidates(&self) -> usize {
        let mut gate = self.candidates.lock().await;
        gate.remote_ready = true;

        let queued = std::mem::take(&mut gate.queued);
        let count = queued.len();

        for candidate in queued {
            if let Err(e) = self.link.add_ice_candidate(&candidate).await {
                warn!(
                    "Failed to apply queued ICE candidate for {}: {e}",
                    self.peer_id
                );
            }
        }

        if count > 0 {
            debug!("Drained {count} queued candidates for peer {}", self.peer_id);
        }
        count
    }
}
