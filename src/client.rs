//! Top-level conference client.
//!
//! Wires the signaling transport, the message router, and the
//! negotiation engine together for one room session.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::events::SessionEvent;
use crate::peer::{NegotiationEngine, PeerRegistry, WebRtcLinkFactory};
use crate::signaling::{MessageRouter, SignalingTransport};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::info;

/// A full-mesh conference session: one relay connection, one peer
/// connection per remote participant.
pub struct MeshClient {
    user_id: String,
    room_id: String,
    transport: Arc<SignalingTransport>,
    engine: Arc<NegotiationEngine>,
    events: broadcast::Sender<SessionEvent>,
    router_task: JoinHandle<()>,
}

impl MeshClient {
    /// Connect to the relay and join a room.
    ///
    /// On return the signaling session is established and the join
    /// request has been sent; peer negotiations start as join broadcasts
    /// arrive. Fails only on invalid configuration or when the relay is
    /// unreachable after the reconnect policy is exhausted.
    pub async fn join(
        config: SessionConfig,
        user_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Result<Self> {
        config.validate()?;
        let user_id = user_id.into();
        let room_id = room_id.into();

        let (events, _) = crate::events::channel();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let transport = Arc::new(SignalingTransport::new(
            &config,
            user_id.clone(),
            room_id.clone(),
            inbound_tx,
            events.clone(),
        ));
        transport.clone().connect().await?;

        let factory = Arc::new(WebRtcLinkFactory::new(
            config.clone(),
            transport.clone(),
            events.clone(),
        ));
        let engine = Arc::new(NegotiationEngine::new(
            Arc::new(PeerRegistry::new()),
            factory,
            transport.clone(),
            events.clone(),
        ));

        let router = MessageRouter::new(user_id.clone(), engine.clone(), events.clone());
        let router_task = tokio::spawn(async move {
            while let Some(frame) = inbound_rx.recv().await {
                router.route(frame).await;
            }
        });

        transport.send_join(config.client_meta.clone()).await;
        info!("Joined room {room_id} as {user_id}");

        Ok(Self {
            user_id,
            room_id,
            transport,
            engine,
            events,
            router_task,
        })
    }

    /// Leave the room and tear the session down: notify the relay, close
    /// every peer connection, and disconnect the transport.
    pub async fn leave(self) {
        info!("Leaving room {} as {}", self.room_id, self.user_id);

        self.transport.send_leave().await;
        self.engine.close_all().await;
        self.transport.disconnect().await;
        self.router_task.abort();
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Local user identity
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The joined room
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Number of active peer sessions
    pub async fn peer_count(&self) -> usize {
        self.engine.registry().size().await
    }

    /// Peers with an active session
    pub async fn peer_ids(&self) -> Vec<String> {
        self.engine.registry().peer_ids().await
    }

    /// Whether the relay connection is currently up
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}
