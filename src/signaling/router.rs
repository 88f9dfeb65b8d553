//! Routes inbound relay messages to the negotiation engine and the
//! session event channel.
//!
//! Handler calls for one peer run on a dedicated FIFO worker task, so a
//! suspended negotiation step can never be overtaken by a later message
//! from the same peer, while distinct peers stay concurrent and a slow
//! step never blocks the transport read loop. Broadcast `webrtc-signal`
//! envelopes reach every participant in the room; the router drops the
//! ones addressed to somebody else before they reach the engine.

use super::protocol::{
    ErrorData, IceCandidate, QueueKind, RoomStateData, SdpData, SignalMessage, UserJoinedData,
    WebRtcSignalData,
};
use super::transport::InboundFrame;
use crate::events::SessionEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, warn};

/// Recipient of normalized signaling callbacks
#[async_trait]
pub trait SignalHandler: Send + Sync {
    /// A remote participant joined the room
    async fn on_peer_joined(&self, peer_id: String);

    /// A remote offer arrived
    async fn on_offer(&self, peer_id: String, sdp: String);

    /// A remote answer arrived
    async fn on_answer(&self, peer_id: String, sdp: String);

    /// A remote ICE candidate arrived
    async fn on_ice_candidate(&self, peer_id: String, candidate: IceCandidate);

    /// A remote participant left the room
    async fn on_peer_left(&self, peer_id: String);
}

/// One normalized handler call queued toward a peer's dispatch worker
enum Dispatch {
    PeerJoined,
    Offer(String),
    Answer(String),
    IceCandidate(IceCandidate),
    PeerLeft,
}

/// Turns inbound relay frames into handler calls and session events
pub struct MessageRouter {
    own_user_id: String,
    handler: Arc<dyn SignalHandler>,
    events: broadcast::Sender<SessionEvent>,
    /// Per-peer dispatch queues; workers live as long as the router
    workers: Mutex<HashMap<String, mpsc::UnboundedSender<Dispatch>>>,
}

impl MessageRouter {
    /// Create a router for the given local identity
    pub fn new(
        own_user_id: impl Into<String>,
        handler: Arc<dyn SignalHandler>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            own_user_id: own_user_id.into(),
            handler,
            events,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Route one inbound frame. Malformed payloads are logged and
    /// dropped; they never affect other messages.
    pub async fn route(&self, frame: InboundFrame) {
        match frame.queue {
            QueueKind::Signal => self.route_signal(frame.body).await,
            QueueKind::Room => self.route_room(frame.body),
            QueueKind::Error => self.route_error(frame.body),
            QueueKind::Topic => self.route_topic(frame.body).await,
        }
    }

    /// Directed signaling on the personal queue
    async fn route_signal(&self, msg: SignalMessage) {
        let Some(from) = msg.from_user_id else {
            warn!("Dropping {} signal without a sender", msg.kind);
            return;
        };

        match msg.kind.as_str() {
            "offer" => {
                let Some(sdp) = parse_sdp(&msg.kind, msg.data) else {
                    return;
                };
                self.dispatch(from, Dispatch::Offer(sdp)).await;
            }
            "answer" => {
                let Some(sdp) = parse_sdp(&msg.kind, msg.data) else {
                    return;
                };
                self.dispatch(from, Dispatch::Answer(sdp)).await;
            }
            "ice-candidate" => {
                let candidate: IceCandidate = match serde_json::from_value(msg.data) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Dropping malformed ice-candidate payload: {e}");
                        return;
                    }
                };
                self.dispatch(from, Dispatch::IceCandidate(candidate)).await;
            }
            other => debug!("Ignoring unknown signal type {other:?}"),
        }
    }

    /// Room-control envelopes on the personal queue
    fn route_room(&self, msg: SignalMessage) {
        match msg.kind.as_str() {
            "room-state" => {
                let state: RoomStateData = match serde_json::from_value(msg.data) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("Dropping malformed room-state payload: {e}");
                        return;
                    }
                };
                let _ = self.events.send(SessionEvent::RoomState {
                    room_id: state.room_id,
                    participants: state.participants,
                });
            }
            other => debug!("Ignoring unknown room message type {other:?}"),
        }
    }

    /// Server error envelopes: surfaced to the application, never fatal
    fn route_error(&self, msg: SignalMessage) {
        let data: ErrorData = match serde_json::from_value(msg.data) {
            Ok(d) => d,
            Err(e) => {
                warn!("Dropping malformed relay error envelope: {e}");
                return;
            }
        };
        warn!("Relay error {}: {}", data.error.code, data.error.message);
        let _ = self.events.send(SessionEvent::RelayError {
            code: data.error.code,
            message: data.error.message,
        });
    }

    /// Room broadcast topic
    async fn route_topic(&self, msg: SignalMessage) {
        match msg.kind.as_str() {
            "user-joined" => {
                let data: UserJoinedData = match serde_json::from_value(msg.data) {
                    Ok(d) => d,
                    Err(e) => {
                        warn!("Dropping malformed user-joined payload: {e}");
                        return;
                    }
                };
                let _ = self.events.send(SessionEvent::ParticipantsChanged {
                    participants: data.participants,
                });

                // Our own join echoes back on the topic; only remote
                // joins initiate a negotiation.
                match data.new_user_id {
                    Some(id) if id != self.own_user_id => {
                        self.dispatch(id, Dispatch::PeerJoined).await;
                    }
                    _ => {}
                }
            }
            "user-left" | "user-disconnected" => {
                let Some(id) = msg.data.get("leftUserId").and_then(Value::as_str) else {
                    warn!("Dropping {} broadcast without leftUserId", msg.kind);
                    return;
                };
                let id = id.to_string();
                self.dispatch(id, Dispatch::PeerLeft).await;
            }
            "webrtc-signal" => self.route_nested_signal(msg).await,
            other => debug!("Ignoring unknown topic broadcast {other:?}"),
        }
    }

    /// Nested `webrtc-signal` broadcast: addressed to exactly one
    /// participant, silently discarded by everyone else.
    async fn route_nested_signal(&self, msg: SignalMessage) {
        let Some(from) = msg.from_user_id else {
            warn!("Dropping webrtc-signal broadcast without a sender");
            return;
        };
        let data: WebRtcSignalData = match serde_json::from_value(msg.data) {
            Ok(d) => d,
            Err(e) => {
                warn!("Dropping malformed webrtc-signal payload: {e}");
                return;
            }
        };

        if data.target_user_id != self.own_user_id {
            debug!(
                "Discarding webrtc-signal broadcast addressed to {}",
                data.target_user_id
            );
            return;
        }

        match data.signal_type.as_str() {
            "offer" => {
                let Some(sdp) = data.sdp else {
                    warn!("Dropping webrtc-signal offer without sdp");
                    return;
                };
                self.dispatch(from, Dispatch::Offer(sdp)).await;
            }
            "answer" => {
                let Some(sdp) = data.sdp else {
                    warn!("Dropping webrtc-signal answer without sdp");
                    return;
                };
                self.dispatch(from, Dispatch::Answer(sdp)).await;
            }
            "ice-candidate" => {
                let Some(candidate) = data.candidate else {
                    warn!("Dropping webrtc-signal ice-candidate without candidate");
                    return;
                };
                let candidate = IceCandidate {
                    candidate,
                    sdp_mid: data.sdp_mid,
                    sdp_mline_index: data.sdp_mline_index,
                };
                self.dispatch(from, Dispatch::IceCandidate(candidate)).await;
            }
            other => debug!("Ignoring unknown webrtc-signal type {other:?}"),
        }
    }

    /// Enqueue a handler call on the peer's FIFO worker, creating the
    /// worker on first contact. Arrival order is preserved per peer.
    async fn dispatch(&self, peer_id: String, job: Dispatch) {
        let mut workers = self.workers.lock().await;
        let tx = workers.entry(peer_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(Self::peer_worker(self.handler.clone(), peer_id.clone(), rx));
            tx
        });
        if tx.send(job).is_err() {
            warn!("Dispatch worker for {peer_id} is gone, dropping message");
        }
    }

    async fn peer_worker(
        handler: Arc<dyn SignalHandler>,
        peer_id: String,
        mut rx: mpsc::UnboundedReceiver<Dispatch>,
    ) {
        while let Some(job) = rx.recv().await {
            match job {
                Dispatch::PeerJoined => handler.on_peer_joined(peer_id.clone()).await,
                Dispatch::Offer(sdp) => handler.on_offer(peer_id.clone(), sdp).await,
                Dispatch::Answer(sdp) => handler.on_answer(peer_id.clone(), sdp).await,
                Dispatch::IceCandidate(c) => handler.on_ice_candidate(peer_id.clone(), c).await,
                Dispatch::PeerLeft => handler.on_peer_left(peer_id.clone()).await,
            }
        }
        debug!("Dispatch worker for {peer_id} terminated");
    }
}

fn parse_sdp(kind: &str, data: Value) -> Option<String> {
    match serde_json::from_value::<SdpData>(data) {
        Ok(d) => Some(d.sdp),
        Err(e) => {
            warn!("Dropping malformed {kind} payload: {e}");
            None
        }
    }
}
