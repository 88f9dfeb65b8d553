//! Relay wire protocol: JSON frames over a single WebSocket.
//!
//! The relay is STOMP-like: the client performs a `connect` handshake,
//! subscribes to its personal queues plus the room topic, and exchanges
//! application messages via `send` frames addressed to `/app/...`
//! destinations. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

/// Personal queue for directed WebRTC signaling messages
pub const QUEUE_WEBRTC: &str = "/user/queue/webrtc";
/// Personal queue for room-control messages
pub const QUEUE_ROOM: &str = "/user/queue/room";
/// Personal queue for server error envelopes
pub const QUEUE_ERROR: &str = "/user/queue/error";

/// Application destination for join requests
pub const APP_ROOM_JOIN: &str = "/app/room/join";
/// Application destination for leave requests
pub const APP_ROOM_LEAVE: &str = "/app/room/leave";
/// Application destination for SDP offers
pub const APP_WEBRTC_OFFER: &str = "/app/webrtc/offer";
/// Application destination for SDP answers
pub const APP_WEBRTC_ANSWER: &str = "/app/webrtc/answer";
/// Application destination for ICE candidates
pub const APP_WEBRTC_ICE: &str = "/app/webrtc/ice-candidate";

/// Broadcast topic for a room
pub fn room_topic(room_id: &str) -> String {
    format!("/topic/room/{room_id}")
}

/// One possible network path toward a peer, as relayed over signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,

    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Media description index
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

/// Frames sent from the client to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Handshake carrying the client identity
    #[serde(rename_all = "camelCase")]
    Connect {
        /// Local user identity
        user_id: String,
        /// Room to join
        room_id: String,
    },

    /// Subscribe to a queue or topic
    Subscribe {
        /// Destination path
        destination: String,
    },

    /// Application message toward an `/app/...` destination
    Send {
        /// Destination path
        destination: String,
        /// JSON payload
        body: serde_json::Value,
    },

    /// Best-effort teardown notice
    Disconnect,
}

/// Frames delivered from the relay to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Handshake acknowledgement
    Connected,

    /// Message delivered on one of the subscribed destinations
    Message {
        /// Subscription destination the message arrived on
        destination: String,
        /// The signaling envelope
        body: SignalMessage,
    },
}

/// Uniform signaling envelope delivered on every subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    /// Envelope type tag
    #[serde(rename = "type")]
    pub kind: String,

    /// Originating user, absent on server-generated envelopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<String>,

    /// Directed recipient, absent on broadcasts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,

    /// Type-dependent payload
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Which of the four subscriptions a message arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Personal WebRTC signaling queue
    Signal,
    /// Personal room-control queue
    Room,
    /// Personal error queue
    Error,
    /// Room broadcast topic
    Topic,
}

impl QueueKind {
    /// Classify a delivery destination. Returns `None` for destinations
    /// this client never subscribed to.
    pub fn from_destination(destination: &str, room_id: &str) -> Option<Self> {
        match destination {
            QUEUE_WEBRTC => Some(QueueKind::Signal),
            QUEUE_ROOM => Some(QueueKind::Room),
            QUEUE_ERROR => Some(QueueKind::Error),
            d if d == room_topic(room_id) => Some(QueueKind::Topic),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound application payloads (relayed verbatim by the server)
// ---------------------------------------------------------------------------

/// Join request sent to `/app/room/join`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Local user identity
    pub user_id: String,
    /// Room to join
    pub room_id: String,
    /// Client metadata for server-side diagnostics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Leave request sent to `/app/room/leave`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    /// Local user identity
    pub user_id: String,
    /// Room being left
    pub room_id: String,
}

/// SDP offer sent to `/app/webrtc/offer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferMessage {
    /// Sender user id
    pub from_user_id: String,
    /// Recipient user id
    pub to_user_id: String,
    /// Offer SDP
    pub sdp: String,
    /// Room id, validated by the relay
    pub room_id: String,
}

/// SDP answer sent to `/app/webrtc/answer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMessage {
    /// Sender user id
    pub from_user_id: String,
    /// Recipient user id
    pub to_user_id: String,
    /// Answer SDP
    pub sdp: String,
    /// Room id, validated by the relay
    pub room_id: String,
}

/// ICE candidate sent to `/app/webrtc/ice-candidate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateMessage {
    /// Sender user id
    pub from_user_id: String,
    /// Recipient user id
    pub to_user_id: String,
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media description index
    #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    /// Room id, validated by the relay
    pub room_id: String,
}

// ---------------------------------------------------------------------------
// Inbound payload variants
// ---------------------------------------------------------------------------

/// Payload of a directed `offer`/`answer` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpData {
    /// Session description
    pub sdp: String,
}

/// Payload of a `room-state` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateData {
    /// Current participant user ids
    pub participants: Vec<String>,
    /// Room identity
    pub room_id: String,
    /// The user id the relay assigned to this client
    pub your_user_id: String,
}

/// Payload of a `user-joined` broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedData {
    /// Participant list after the join
    #[serde(default)]
    pub participants: Vec<String>,
    /// The user that joined
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_user_id: Option<String>,
}

/// Payload of a nested `webrtc-signal` broadcast. Broadcasts reach every
/// participant; `target_user_id` names the single intended recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcSignalData {
    /// Nested signal type: offer | answer | ice-candidate
    pub signal_type: String,
    /// The single intended recipient
    pub target_user_id: String,
    /// SDP for offer/answer signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    /// Candidate line for ice-candidate signals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media description index
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
}

/// Payload of a server error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    /// The error body
    pub error: RelayErrorBody,
}

/// Server error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    /// Relay error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl ClientFrame {
    /// Serialize to the wire representation
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::Error::Serialization(format!("Failed to serialize frame: {e}")))
    }
}

impl ServerFrame {
    /// Parse a frame delivered by the relay
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::Serialization(format!("Failed to parse relay frame: {e}")))
    }
}
