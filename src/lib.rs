//! Full-mesh WebRTC conference client
//!
//! This crate provides the signaling transport and peer-connection
//! negotiation engine for a browser-style video conference: every
//! participant holds a direct WebRTC connection to every other
//! participant, coordinated through a STOMP-like JSON relay over a
//! single WebSocket.
//!
//! # Features
//!
//! - **Full-mesh topology**: one peer connection per remote participant
//! - **Offer/answer negotiation**: per-peer state machines with
//!   collision handling (the newest offer always wins)
//! - **ICE candidate gating**: candidates queue until the remote
//!   description is set, then drain in arrival order
//! - **Relay reconnect**: exponential backoff (2/4/8/16/32s) with
//!   automatic re-subscription
//! - **Per-peer failure containment**: a failed negotiation tears down
//!   one session and never touches its siblings
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  MeshClient                                          │
//! │  ├─ SignalingTransport (relay frames over WebSocket) │
//! │  ├─ MessageRouter (envelopes → engine callbacks)     │
//! │  └─ NegotiationEngine                                │
//! │      └─ PeerRegistry (peer id → PeerSession)         │
//! │          └─ PeerLink (native WebRTC connection)      │
//! │             ↕ (mesh peer connections)                │
//! │  Remote participants                                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use meshcall::{MeshClient, SessionConfig, SessionEvent};
//!
//! let config = SessionConfig {
//!     signaling_url: "ws://localhost:8080/ws".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = MeshClient::join(config, "alice", "room-1").await?;
//! let mut events = client.subscribe();
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         SessionEvent::PeerAdded { peer_id } => println!("{peer_id} joined"),
//!         SessionEvent::PeerRemoved { peer_id } => println!("{peer_id} left"),
//!         _ => {}
//!     }
//! }
//!
//! client.leave().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod peer;
pub mod signaling;

pub use client::MeshClient;
pub use config::{ReconnectPolicy, SessionConfig, TurnServerConfig};
pub use error::{Error, NegotiationStage, Result};
pub use events::SessionEvent;
pub use peer::{LinkState, NegotiationRole, NegotiationState};
pub use signaling::SignalSink;
