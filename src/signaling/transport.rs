//! WebSocket transport for the relay protocol.
//!
//! Owns the connection lifecycle: dial with exponential backoff, the
//! `connect`/`connected` handshake, the four subscriptions, and the
//! sender/receiver tasks. A mid-session drop re-runs the same backoff
//! schedule and re-subscribes; exhaustion is surfaced as a fatal
//! `SignalingLost` event. Outbound sends while disconnected are dropped
//! with a warning, never queued.

use super::protocol::{
    room_topic, AnswerMessage, ClientFrame, IceCandidate, IceCandidateMessage, JoinRequest,
    LeaveRequest, OfferMessage, QueueKind, ServerFrame, SignalMessage, APP_ROOM_JOIN,
    APP_ROOM_LEAVE, APP_WEBRTC_ANSWER, APP_WEBRTC_ICE, APP_WEBRTC_OFFER, QUEUE_ERROR, QUEUE_ROOM,
    QUEUE_WEBRTC,
};
use super::SignalSink;
use crate::config::{ReconnectPolicy, SessionConfig};
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// One relay message classified by the subscription it arrived on
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Which subscription delivered the message
    pub queue: QueueKind,
    /// The signaling envelope
    pub body: SignalMessage,
}

/// WebSocket connection to the signaling relay
pub struct SignalingTransport {
    url: String,
    user_id: String,
    room_id: String,
    policy: ReconnectPolicy,
    connected: AtomicBool,
    shutdown: AtomicBool,
    writer: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    events: broadcast::Sender<SessionEvent>,
}

impl SignalingTransport {
    /// Create a transport for the given identity and room. `inbound`
    /// receives every classified relay message for routing.
    pub fn new(
        config: &SessionConfig,
        user_id: impl Into<String>,
        room_id: impl Into<String>,
        inbound: mpsc::UnboundedSender<InboundFrame>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            url: config.signaling_url.clone(),
            user_id: user_id.into(),
            room_id: room_id.into(),
            policy: config.reconnect.clone(),
            connected: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            writer: Mutex::new(None),
            inbound,
            events,
        }
    }

    /// Whether the relay connection is currently up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect to the relay, performing the handshake and subscribing.
    /// Retries with exponential backoff; gives up with a fatal error
    /// once the policy is exhausted.
    pub async fn connect(self: Arc<Self>) -> Result<()> {
        let ws = self.dial_with_backoff().await?;
        self.start_io(ws);
        Ok(())
    }

    /// Best-effort teardown: notify the relay, then close
    pub async fn disconnect(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        self.send_frame(ClientFrame::Disconnect).await;
        self.connected.store(false, Ordering::SeqCst);
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        info!("Signaling transport disconnected");
    }

    /// Send the room join request
    pub async fn send_join(&self, client_meta: Option<String>) {
        let request = JoinRequest {
            user_id: self.user_id.clone(),
            room_id: self.room_id.clone(),
            user_agent: client_meta,
        };
        self.send_app(APP_ROOM_JOIN, &request).await;
    }

    /// Send the room leave request
    pub async fn send_leave(&self) {
        let request = LeaveRequest {
            user_id: self.user_id.clone(),
            room_id: self.room_id.clone(),
        };
        self.send_app(APP_ROOM_LEAVE, &request).await;
    }

    async fn dial_with_backoff(&self) -> Result<WsStream> {
        let mut attempt = 0u32;
        loop {
            match self.dial().await {
                Ok(ws) => {
                    info!("Connected to signaling relay at {}", self.url);
                    return Ok(ws);
                }
                Err(e) => {
                    attempt += 1;
                    if !self.policy.should_retry(attempt) {
                        return Err(Error::TransportConnect {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay(attempt);
                    warn!(
                        "Relay connect attempt {attempt} failed ({e}), retrying in {}s",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One connect attempt: dial, handshake, subscribe
    async fn dial(&self) -> Result<WsStream> {
        let (mut ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::WebSocket(format!("Failed to connect: {e}")))?;

        let connect = ClientFrame::Connect {
            user_id: self.user_id.clone(),
            room_id: self.room_id.clone(),
        };
        ws.send(Message::Text(connect.to_json()?))
            .await
            .map_err(|e| Error::WebSocket(format!("Handshake send failed: {e}")))?;

        self.await_connected(&mut ws).await?;

        for destination in [
            QUEUE_WEBRTC.to_string(),
            QUEUE_ROOM.to_string(),
            QUEUE_ERROR.to_string(),
            room_topic(&self.room_id),
        ] {
            let frame = ClientFrame::Subscribe { destination };
            ws.send(Message::Text(frame.to_json()?))
                .await
                .map_err(|e| Error::WebSocket(format!("Subscribe send failed: {e}")))?;
        }

        Ok(ws)
    }

    async fn await_connected(&self, ws: &mut WsStream) -> Result<()> {
        while let Some(msg) = ws.next().await {
            let msg = msg.map_err(|e| Error::WebSocket(format!("Handshake read failed: {e}")))?;
            let Message::Text(text) = msg else { continue };
            match ServerFrame::from_json(&text)? {
                ServerFrame::Connected => return Ok(()),
                other => debug!("Ignoring pre-handshake frame: {other:?}"),
            }
        }
        Err(Error::WebSocket(
            "Relay closed the connection during handshake".to_string(),
        ))
    }

    /// Wire up the sender and receiver tasks over an established stream
    fn start_io(self: Arc<Self>, ws: WsStream) {
        let (write, read) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut writer) = self.writer.lock() {
            *writer = Some(tx);
        }
        self.connected.store(true, Ordering::SeqCst);

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(async move {
            self.receiver_task(read).await;
        });
    }

    async fn sender_task(
        mut write: futures_util::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send relay message: {e}");
                break;
            }
        }
        debug!("Sender task terminated");
    }

    async fn receiver_task(
        self: Arc<Self>,
        mut read: futures_util::stream::SplitStream<WsStream>,
    ) {
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => self.handle_text(&text),
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Relay read error: {e}");
                    break;
                }
                _ => {}
            }
        }

        if self.shutdown.load(Ordering::SeqCst) {
            debug!("Receiver task terminated");
            return;
        }

        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::SignalingLost { fatal: false });
        warn!("Signaling connection lost, reconnecting");

        match self.dial_with_backoff().await {
            Ok(ws) => {
                self.start_io(ws);
                info!("Signaling connection restored");
            }
            Err(e) => {
                error!("Could not restore signaling connection: {e}");
                let _ = self.events.send(SessionEvent::SignalingLost { fatal: true });
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let frame = match ServerFrame::from_json(text) {
            Ok(f) => f,
            Err(e) => {
                warn!("Dropping unparseable relay frame: {e}");
                return;
            }
        };

        match frame {
            ServerFrame::Connected => {}
            ServerFrame::Message { destination, body } => {
                let Some(queue) = QueueKind::from_destination(&destination, &self.room_id) else {
                    debug!("Dropping message on unexpected destination {destination}");
                    return;
                };
                if self.inbound.send(InboundFrame { queue, body }).is_err() {
                    debug!("Inbound channel closed, dropping relay message");
                }
            }
        }
    }

    async fn send_app<T: serde::Serialize>(&self, destination: &str, payload: &T) {
        let body = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("Could not serialize payload for {destination}: {e}");
                return;
            }
        };
        self.send_frame(ClientFrame::Send {
            destination: destination.to_string(),
            body,
        })
        .await;
    }

    async fn send_frame(&self, frame: ClientFrame) {
        if !self.is_connected() && !matches!(frame, ClientFrame::Disconnect) {
            warn!("Dropping outbound frame: signaling transport is disconnected");
            return;
        }

        let json = match frame.to_json() {
            Ok(j) => j,
            Err(e) => {
                warn!("Could not serialize outbound frame: {e}");
                return;
            }
        };

        let writer = match self.writer.lock() {
            Ok(writer) => writer.clone(),
            Err(_) => None,
        };
        match writer {
            Some(tx) => {
                if tx.send(Message::Text(json)).is_err() {
                    warn!("Dropping outbound frame: sender task is gone");
                }
            }
            None => warn!("Dropping outbound frame: signaling transport is disconnected"),
        }
    }
}

#[async_trait]
impl SignalSink for SignalingTransport {
    async fn send_offer(&self, to_user_id: &str, sdp: &str) {
        let msg = OfferMessage {
            from_user_id: self.user_id.clone(),
            to_user_id: to_user_id.to_string(),
            sdp: sdp.to_string(),
            room_id: self.room_id.clone(),
        };
        self.send_app(APP_WEBRTC_OFFER, &msg).await;
    }

    async fn send_answer(&self, to_user_id: &str, sdp: &str) {
        let msg = AnswerMessage {
            from_user_id: self.user_id.clone(),
            to_user_id: to_user_id.to_string(),
            sdp: sdp.to_string(),
            room_id: self.room_id.clone(),
        };
        self.send_app(APP_WEBRTC_ANSWER, &msg).await;
    }

    async fn send_ice_candidate(&self, to_user_id: &str, candidate: &IceCandidate) {
        let msg = IceCandidateMessage {
            from_user_id: self.user_id.clone(),
            to_user_id: to_user_id.to_string(),
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            room_id: self.room_id.clone(),
        };
        self.send_app(APP_WEBRTC_ICE, &msg).await;
    }
}
