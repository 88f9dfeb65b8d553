//! The per-peer negotiation engine.
//!
//! Drives the offer/answer/ICE state machine for every remote peer.
//! Failures here are confined to the affected peer: the session is torn
//! down, the failure is logged with its stage, and nothing propagates to
//! sibling negotiations or the signaling session.
//!
//! Negotiation steps suspend at every native operation, and a newer
//! message for the same peer may replace the session while a step is
//! suspended. Every continuation therefore re-validates, by pointer
//! identity against the registry, that its session is still live before
//! mutating anything; a completion for a superseded session is a no-op.

use super::link::{PeerLinkFactory, SdpKind};
use super::registry::PeerRegistry;
use super::session::{NegotiationState, PeerSession};
use crate::error::{Error, NegotiationStage};
use crate::events::SessionEvent;
use crate::signaling::protocol::IceCandidate;
use crate::signaling::{SignalHandler, SignalSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

type StepResult = std::result::Result<(), (NegotiationStage, Error)>;

/// Drives per-peer connection negotiation
pub struct NegotiationEngine {
    registry: Arc<PeerRegistry>,
    factory: Arc<dyn PeerLinkFactory>,
    signals: Arc<dyn SignalSink>,
    events: broadcast::Sender<SessionEvent>,
}

impl NegotiationEngine {
    /// Create an engine over the given registry, link factory, and
    /// outbound signaling sink
    pub fn new(
        registry: Arc<PeerRegistry>,
        factory: Arc<dyn PeerLinkFactory>,
        signals: Arc<dyn SignalSink>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            registry,
            factory,
            signals,
            events,
        }
    }

    /// The registry this engine arbitrates
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// A new participant appeared: create an offerer session and send
    /// them an offer. Failures tear the session down without retry; a
    /// later join or offer can re-initiate.
    pub async fn on_peer_joined(&self, peer_id: &str) {
        if self.registry.get(peer_id).await.is_some() {
            debug!("Session already exists for {peer_id}, ignoring join");
            return;
        }

        info!("Peer {peer_id} joined, initiating offer");

        let link = match self.factory.create(peer_id).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Could not create connection for {peer_id}: {e}");
                return;
            }
        };

        // Connection setup suspends; a session that appeared for this
        // peer in the meantime wins and this join is discarded.
        let session = Arc::new(PeerSession::offerer(peer_id, link.clone()));
        if !self.registry.upsert_if(None, session.clone()).await {
            debug!("Discarding join for {peer_id}: superseded during connection setup");
            if let Err(e) = link.close().await {
                warn!("Error closing unused connection for {peer_id}: {e}");
            }
            return;
        }
        let _ = self.events.send(SessionEvent::PeerAdded {
            peer_id: peer_id.to_string(),
        });

        if let Err((stage, err)) = self.run_offer(&session).await {
            self.teardown(&session, stage, err).await;
        }
    }

    async fn run_offer(&self, session: &Arc<PeerSession>) -> StepResult {
        self.transition(session, NegotiationState::Offering).await;

        let sdp = session
            .link()
            .create_offer()
            .await
            .map_err(|e| (NegotiationStage::OfferGenerationFailed, e))?;
        if !self.still_current(session).await {
            return Ok(());
        }

        session
            .link()
            .set_local_description(SdpKind::Offer, &sdp)
            .await
            .map_err(|e| (NegotiationStage::LocalDescriptionRejected, e))?;
        if !self.still_current(session).await {
            return Ok(());
        }

        self.transition(session, NegotiationState::OfferSent).await;
        self.signals.send_offer(session.peer_id(), &sdp).await;
        Ok(())
    }

    /// A remote offer arrived. Any existing session for this peer, even
    /// one already stable, is discarded and replaced: the newest offer
    /// always wins a collision.
    pub async fn on_offer(&self, peer_id: &str, sdp: &str) {
        info!("Received offer from {peer_id}");

        let existing = self.registry.get(peer_id).await;
        let link = match self.factory.create(peer_id).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Could not create connection for {peer_id}: {e}");
                return;
            }
        };

        // The insert is validated against the entry observed before the
        // connection-setup suspension: if a newer offer replaced it in
        // the meantime, that one wins and this one is discarded.
        let session = Arc::new(PeerSession::answerer(peer_id, link.clone()));
        if !self.registry.upsert_if(existing.as_ref(), session.clone()).await {
            info!("Discarding offer from {peer_id}: superseded during connection setup");
            if let Err(e) = link.close().await {
                warn!("Error closing unused connection for {peer_id}: {e}");
            }
            return;
        }

        if existing.is_some() {
            info!("Discarded existing session for {peer_id} in favor of new offer");
        } else {
            let _ = self.events.send(SessionEvent::PeerAdded {
                peer_id: peer_id.to_string(),
            });
        }

        self.transition(&session, NegotiationState::OfferReceived)
            .await;

        if let Err((stage, err)) = self.run_answer(&session, sdp).await {
            self.teardown(&session, stage, err).await;
        }
    }

    async fn run_answer(&self, session: &Arc<PeerSession>, sdp: &str) -> StepResult {
        session
            .link()
            .set_remote_description(SdpKind::Offer, sdp)
            .await
            .map_err(|e| (NegotiationStage::RemoteDescriptionRejected, e))?;
        if !self.still_current(session).await {
            return Ok(());
        }

        session.drain_candidates().await;
        self.transition(session, NegotiationState::Answering).await;

        let answer = session
            .link()
            .create_answer()
            .await
            .map_err(|e| (NegotiationStage::AnswerGenerationFailed, e))?;
        if !self.still_current(session).await {
            return Ok(());
        }

        session
            .link()
            .set_local_description(SdpKind::Answer, &answer)
            .await
            .map_err(|e| (NegotiationStage::LocalDescriptionRejected, e))?;
        if !self.still_current(session).await {
            return Ok(());
        }

        self.transition(session, NegotiationState::AnswerSent).await;
        self.signals.send_answer(session.peer_id(), &answer).await;
        self.transition(session, NegotiationState::Stable).await;

        info!("Negotiation with {} is stable", session.peer_id());
        Ok(())
    }

    /// A remote answer arrived. Valid only for a session awaiting one;
    /// anything else (peer already left, stale duplicate) is discarded
    /// with a warning.
    pub async fn on_answer(&self, peer_id: &str, sdp: &str) {
        let Some(session) = self.registry.get(peer_id).await else {
            warn!("Discarding answer from {peer_id}: no session");
            return;
        };

        let state = session.state().await;
        if state != NegotiationState::OfferSent {
            warn!("Discarding answer from {peer_id}: session is {state:?}, not awaiting one");
            return;
        }

        if let Err(e) = session
            .link()
            .set_remote_description(SdpKind::Answer, sdp)
            .await
        {
            self.teardown(&session, NegotiationStage::RemoteDescriptionRejected, e)
                .await;
            return;
        }
        if !self.still_current(&session).await {
            return;
        }

        session.drain_candidates().await;
        self.transition(&session, NegotiationState::Stable).await;

        info!("Negotiation with {peer_id} is stable");
    }

    /// A remote ICE candidate arrived: apply it if the session's remote
    /// description is set, otherwise queue it in arrival order.
    pub async fn on_ice_candidate(&self, peer_id: &str, candidate: IceCandidate) {
        let Some(session) = self.registry.get(peer_id).await else {
            warn!("Discarding ICE candidate from {peer_id}: no session");
            return;
        };

        let applied = session.apply_or_queue_candidate(candidate).await;
        debug!(
            "ICE candidate from {peer_id} {}",
            if applied { "applied" } else { "queued" }
        );
    }

    /// A participant left: close and remove their session. Idempotent
    /// when no session exists.
    pub async fn on_peer_left(&self, peer_id: &str) {
        let Some(session) = self.registry.remove(peer_id).await else {
            debug!("Peer {peer_id} left with no active session");
            return;
        };

        info!("Peer {peer_id} left, closing session {}", session.session_id());
        self.transition(&session, NegotiationState::Closed).await;
        if let Err(e) = session.link().close().await {
            warn!("Error closing connection for departed peer {peer_id}: {e}");
        }

        let _ = self.events.send(SessionEvent::PeerRemoved {
            peer_id: peer_id.to_string(),
        });
    }

    /// Close every session (signaling session teardown)
    pub async fn close_all(&self) {
        for peer_id in self.registry.clear().await {
            let _ = self.events.send(SessionEvent::PeerRemoved { peer_id });
        }
    }

    async fn still_current(&self, session: &Arc<PeerSession>) -> bool {
        if self.registry.is_current(session).await {
            return true;
        }
        debug!(
            "Discarding stale negotiation step for peer {} (session {} superseded)",
            session.peer_id(),
            session.session_id()
        );
        false
    }

    async fn transition(&self, session: &Arc<PeerSession>, state: NegotiationState) {
        if session.set_state(state).await {
            let _ = self.events.send(SessionEvent::NegotiationStateChanged {
                peer_id: session.peer_id().to_string(),
                state,
            });
        }
    }

    async fn teardown(&self, session: &Arc<PeerSession>, stage: NegotiationStage, err: Error) {
        warn!(
            "Negotiation failed for peer {} at {stage}: {err}",
            session.peer_id()
        );

        self.transition(session, NegotiationState::Failed).await;
        let removed = self.registry.remove_if_current(session).await;
        if let Err(e) = session.link().close().await {
            warn!(
                "Error closing connection for failed peer {}: {e}",
                session.peer_id()
            );
        }

        if removed {
            let _ = self.events.send(SessionEvent::PeerRemoved {
                peer_id: session.peer_id().to_string(),
            });
        }
    }
}

#[async_trait]
impl SignalHandler for NegotiationEngine {
    async fn on_peer_joined(&self, peer_id: String) {
        NegotiationEngine::on_peer_joined(self, &peer_id).await;
    }

    async fn on_offer(&self, peer_id: String, sdp: String) {
        NegotiationEngine::on_offer(self, &peer_id, &sdp).await;
    }

    async fn on_answer(&self, peer_id: String, sdp: String) {
        NegotiationEngine::on_answer(self, &peer_id, &sdp).await;
    }

    async fn on_ice_candidate(&self, peer_id: String, candidate: IceCandidate) {
        NegotiationEngine::on_ice_candidate(self, &peer_id, candidate).await;
    }

    async fn on_peer_left(&self, peer_id: String) {
        NegotiationEngine::on_peer_left(self, &peer_id).await;
    }
}
