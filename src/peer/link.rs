//! Native peer-connection capability.
//!
//! The negotiation engine talks to the native WebRTC stack only through
//! the [`PeerLink`] trait, so the state machine can be exercised without a
//! network. [`WebRtcPeerLink`] is the production implementation wrapping
//! `webrtc::RTCPeerConnection`.

use crate::config::SessionConfig;
use crate::events::SessionEvent;
use crate::signaling::protocol::IceCandidate;
use crate::signaling::SignalSink;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Kind of session description being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    /// An SDP offer
    Offer,
    /// An SDP answer
    Answer,
}

/// Observable native connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Initial state, connection not yet started
    New,
    /// Connection negotiation in progress
    Connecting,
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Connection failed
    Failed,
    /// Connection closed
    Closed,
}

impl From<RTCPeerConnectionState> for LinkState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New => LinkState::New,
            RTCPeerConnectionState::Connecting => LinkState::Connecting,
            RTCPeerConnectionState::Connected => LinkState::Connected,
            RTCPeerConnectionState::Disconnected => LinkState::Disconnected,
            RTCPeerConnectionState::Failed => LinkState::Failed,
            _ => LinkState::Closed,
        }
    }
}

/// Asynchronous native peer-connection operations consumed by the
/// negotiation engine
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Generate a local SDP offer
    async fn create_offer(&self) -> Result<String>;

    /// Generate a local SDP answer (remote offer must already be set)
    async fn create_answer(&self) -> Result<String>;

    /// Apply a local session description
    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Apply a remote session description
    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Apply a remote ICE candidate
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    /// Close the native connection
    async fn close(&self) -> Result<()>;
}

/// Creates native connections for new peer sessions
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    /// Create a link toward `peer_id`, wired to signaling and events
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn PeerLink>>;
}

/// Production [`PeerLink`] wrapping `webrtc::RTCPeerConnection`
pub struct WebRtcPeerLink {
    peer_id: String,
    link_id: String,
    pc: Arc<RTCPeerConnection>,
}

impl WebRtcPeerLink {
    fn description(&self, kind: SdpKind, sdp: &str) -> Result<RTCSessionDescription> {
        let desc = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp.to_string()),
            SdpKind::Answer => RTCSessionDescription::answer(sdp.to_string()),
        };
        desc.map_err(|e| Error::Sdp(format!("Failed to parse {kind:?} SDP: {e}")))
    }
}

#[async_trait]
impl PeerLink for WebRtcPeerLink {
    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {e}")))?;

        debug!("Created SDP offer for peer {}", self.peer_id);
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {e}")))?;

        debug!("Created SDP answer for peer {}", self.peer_id);
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        let desc = self.description(kind, sdp)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {e}")))
    }

    async fn set_remote_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        let desc = self.description(kind, sdp)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote description: {e}")))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate.clone(),
                sdp_mid: candidate.sdp_mid.clone(),
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {e}")))
    }

    async fn close(&self) -> Result<()> {
        info!(
            "Closing native connection {} for peer {}",
            self.link_id, self.peer_id
        );
        self.pc
            .close()
            .await
            .map_err(|e| Error::WebRtc(format!("Failed to close connection: {e}")))
    }
}

/// Production [`PeerLinkFactory`] building webrtc-rs connections from the
/// session configuration
pub struct WebRtcLinkFactory {
    config: SessionConfig,
    sink: Arc<dyn SignalSink>,
    events: broadcast::Sender<SessionEvent>,
}

impl WebRtcLinkFactory {
    /// Create a factory. `sink` receives locally gathered ICE candidates;
    /// `events` receives native connection-state transitions.
    pub fn new(
        config: SessionConfig,
        sink: Arc<dyn SignalSink>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            sink,
            events,
        }
    }

    fn ice_servers(&self) -> Vec<RTCIceServer> {
        self.config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(self.config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect()
    }

    /// Attach outbound local-media tracks per configuration. The tracks
    /// are fed by the local-media collaborator; this core only negotiates
    /// them into the session.
    async fn attach_local_tracks(&self, peer_id: &str, pc: &Arc<RTCPeerConnection>) -> Result<()> {
        if self.config.enable_audio {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                format!("audio-{peer_id}"),
                "meshcall-local".to_string(),
            ));
            pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::WebRtc(format!("Failed to add audio track: {e}")))?;
        }

        if self.config.enable_video {
            let track = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: 0,
                    sdp_fmtp_line: String::new(),
                    rtcp_feedback: vec![],
                },
                format!("video-{peer_id}"),
                "meshcall-local".to_string(),
            ));
            pc.add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| Error::WebRtc(format!("Failed to add video track: {e}")))?;
        }

        Ok(())
    }
}

#[async_trait]
impl PeerLinkFactory for WebRtcLinkFactory {
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn PeerLink>> {
        let link_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Creating native connection for peer {peer_id} (link {link_id})"
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtc(format!("Failed to register codecs: {e}")))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::WebRtc(format!("Failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: self.ice_servers(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::WebRtc(format!("Failed to create peer connection: {e}")))?,
        );

        self.attach_local_tracks(peer_id, &pc).await?;

        // Locally gathered candidates go straight out through signaling.
        let sink = Arc::clone(&self.sink);
        let candidate_peer = peer_id.to_string();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let sink = Arc::clone(&sink);
            let peer_id = candidate_peer.clone();

            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        sink.send_ice_candidate(
                            &peer_id,
                            &IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            },
                        )
                        .await;
                    }
                    Err(e) => {
                        debug!("Dropping unserializable candidate for {peer_id}: {e}");
                    }
                }
            })
        }));

        let events = self.events.clone();
        let state_peer = peer_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = events.clone();
            let peer_id = state_peer.clone();

            Box::pin(async move {
                let state = LinkState::from(state);
                debug!("Peer {peer_id} native state: {state:?}");
                let _ = events.send(SessionEvent::ConnectionStateChanged { peer_id, state });
            })
        }));

        Ok(Arc::new(WebRtcPeerLink {
            peer_id: peer_id.to_string(),
            link_id,
            pc,
        }))
    }
}
