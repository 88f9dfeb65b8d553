//! Error types for the conference client core

/// Result type alias using meshcall Error
pub type Result<T> = std::result::Result<T, Error>;

/// The negotiation step that failed for a single peer.
///
/// Negotiation failures never cross the engine boundary; the stage is
/// recorded in the log entry emitted when the affected session is torn
/// down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    /// Local offer could not be generated or applied
    OfferGenerationFailed,
    /// Remote SDP was rejected by the native connection
    RemoteDescriptionRejected,
    /// Local answer could not be generated
    AnswerGenerationFailed,
    /// Local description (offer or answer) was rejected
    LocalDescriptionRejected,
}

impl std::fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NegotiationStage::OfferGenerationFailed => "offer-generation-failed",
            NegotiationStage::RemoteDescriptionRejected => "remote-description-rejected",
            NegotiationStage::AnswerGenerationFailed => "answer-generation-failed",
            NegotiationStage::LocalDescriptionRejected => "local-description-rejected",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in signaling and peer negotiation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Relay handshake failed after all reconnect attempts
    #[error("Transport connect failed after {attempts} attempts: {reason}")]
    TransportConnect {
        /// Number of handshake attempts made
        attempts: u32,
        /// Last underlying failure
        reason: String,
    },

    /// Signaling protocol error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Peer not found in registry
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Negotiation step failed for a single peer
    #[error("Negotiation failed for peer {peer_id} at {stage}: {reason}")]
    Negotiation {
        /// Remote peer whose session failed
        peer_id: String,
        /// The failing step
        stage: NegotiationStage,
        /// Underlying failure
        reason: String,
    },

    /// SDP parse or apply error
    #[error("SDP error: {0}")]
    Sdp(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is fatal to the whole signaling session
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportConnect { .. })
    }

    /// Check if this error is confined to a single peer
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::Negotiation { .. }
                | Error::Sdp(_)
                | Error::IceCandidate(_)
        )
    }
}
