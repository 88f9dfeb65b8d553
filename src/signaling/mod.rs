//! Signaling: the relay wire protocol, the WebSocket transport that
//! carries it, and the router that turns inbound envelopes into
//! negotiation-engine calls.

pub mod protocol;
mod router;
mod transport;

pub use router::{MessageRouter, SignalHandler};
pub use transport::{InboundFrame, SignalingTransport};

use async_trait::async_trait;
use protocol::IceCandidate;

/// Outbound signaling surface consumed by the negotiation engine and the
/// native connection's candidate callback.
///
/// Sends are fire-and-forget: while the transport is disconnected a send
/// is suppressed with a warning, never queued and never an error
/// (application messages are at-most-once).
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Send an SDP offer to a peer
    async fn send_offer(&self, to_user_id: &str, sdp: &str);

    /// Send an SDP answer to a peer
    async fn send_answer(&self, to_user_id: &str, sdp: &str);

    /// Send a locally gathered ICE candidate to a peer
    async fn send_ice_candidate(&self, to_user_id: &str, candidate: &IceCandidate);
}
