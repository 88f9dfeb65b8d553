//! Peer connection management: per-peer sessions, the registry holding
//! them, and the negotiation engine driving the offer/answer/ICE state
//! machine.

mod link;
mod negotiation;
mod registry;
mod session;

pub use link::{LinkState, PeerLink, PeerLinkFactory, SdpKind, WebRtcLinkFactory, WebRtcPeerLink};
pub use negotiation::NegotiationEngine;
pub use registry::PeerRegistry;
pub use session::{NegotiationRole, NegotiationState, PeerSession};
