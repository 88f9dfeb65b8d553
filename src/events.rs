//! Event surface toward the rendering, telemetry, and user-facing
//! collaborators.
//!
//! The original client reached collaborators through global singletons;
//! here every state change is published on a broadcast channel that
//! collaborators subscribe to.

use crate::peer::{LinkState, NegotiationState};
use tokio::sync::broadcast;

/// Default capacity of the session event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State-change events emitted by the core toward its collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A peer session was created; the renderer should prepare a tile
    PeerAdded {
        /// Remote peer identity
        peer_id: String,
    },

    /// A peer session was removed; the renderer should drop the tile
    PeerRemoved {
        /// Remote peer identity
        peer_id: String,
    },

    /// The native connection for a peer changed state
    ConnectionStateChanged {
        /// Remote peer identity
        peer_id: String,
        /// New native connection state
        state: LinkState,
    },

    /// A peer's negotiation state machine advanced (telemetry)
    NegotiationStateChanged {
        /// Remote peer identity
        peer_id: String,
        /// New negotiation state
        state: NegotiationState,
    },

    /// Authoritative room state from the relay
    RoomState {
        /// Room identity
        room_id: String,
        /// Current participant user ids
        participants: Vec<String>,
    },

    /// The room participant list changed (join/leave broadcast)
    ParticipantsChanged {
        /// Current participant user ids
        participants: Vec<String>,
    },

    /// Server-originated error envelope, surfaced to the user
    RelayError {
        /// Relay error code
        code: String,
        /// Human-readable message
        message: String,
    },

    /// The signaling channel was lost. When `fatal` is true the reconnect
    /// policy is exhausted and the session must be restarted by the user.
    SignalingLost {
        /// Whether reconnect attempts are exhausted
        fatal: bool,
    },
}

/// Create the session event channel
pub fn channel() -> (broadcast::Sender<SessionEvent>, broadcast::Receiver<SessionEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
