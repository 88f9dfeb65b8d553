//! Scripted doubles for the negotiation and routing seams

use async_trait::async_trait;
use meshcall::peer::{PeerLink, PeerLinkFactory, SdpKind};
use meshcall::signaling::protocol::IceCandidate;
use meshcall::signaling::{SignalHandler, SignalSink};
use meshcall::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// A peer link that records every call and can be scripted to park or
/// fail at chosen steps.
#[derive(Default)]
pub struct ScriptedLink {
    /// When set, `set_remote_description` parks until notified
    gate: Option<Arc<Notify>>,
    fail_offer: AtomicBool,
    remote_descriptions: Mutex<Vec<String>>,
    local_descriptions: Mutex<Vec<(SdpKind, String)>>,
    candidates: Mutex<Vec<String>>,
    answer_calls: AtomicUsize,
    closed: AtomicBool,
}

impl ScriptedLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A link whose `set_remote_description` parks until the returned
    /// notify is triggered
    pub fn gated() -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let link = Arc::new(Self {
            gate: Some(gate.clone()),
            ..Self::default()
        });
        (link, gate)
    }

    /// A link whose `create_offer` fails
    pub fn failing_offer() -> Arc<Self> {
        let link = Self::default();
        link.fail_offer.store(true, Ordering::SeqCst);
        Arc::new(link)
    }

    pub fn remote_descriptions(&self) -> Vec<String> {
        self.remote_descriptions.lock().unwrap().clone()
    }

    pub fn local_descriptions(&self) -> Vec<(SdpKind, String)> {
        self.local_descriptions.lock().unwrap().clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.candidates.lock().unwrap().clone()
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for ScriptedLink {
    async fn create_offer(&self) -> Result<String> {
        if self.fail_offer.load(Ordering::SeqCst) {
            return Err(Error::Sdp("scripted offer failure".to_string()));
        }
        Ok("scripted-offer-sdp".to_string())
    }

    async fn create_answer(&self) -> Result<String> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        Ok("scripted-answer-sdp".to_string())
    }

    async fn set_local_description(&self, kind: SdpKind, sdp: &str) -> Result<()> {
        self.local_descriptions
            .lock()
            .unwrap()
            .push((kind, sdp.to_string()));
        Ok(())
    }

    async fn set_remote_description(&self, _kind: SdpKind, sdp: &str) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.remote_descriptions.lock().unwrap().push(sdp.to_string());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.candidates.lock().unwrap().push(candidate.candidate.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out prepared links in order, one per `create` call
pub struct ScriptedFactory {
    links: Mutex<VecDeque<Arc<ScriptedLink>>>,
    create_gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedFactory {
    pub fn new(links: Vec<Arc<ScriptedLink>>) -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(links.into()),
            create_gate: Mutex::new(None),
        })
    }

    /// Park the next `create` call until the returned notify fires
    pub fn gate_next_create(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl PeerLinkFactory for ScriptedFactory {
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn PeerLink>> {
        let gate = self.create_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let link = self
            .links
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted link left for {peer_id}"));
        Ok(link)
    }
}

/// Everything a negotiation engine asked the relay to deliver
#[derive(Debug, Clone, PartialEq)]
pub enum SentSignal {
    Offer { to: String, sdp: String },
    Answer { to: String, sdp: String },
    Candidate { to: String, candidate: String },
}

/// Signal sink that records instead of sending
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<SentSignal>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<SentSignal> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn send_offer(&self, to_user_id: &str, sdp: &str) {
        self.sent.lock().unwrap().push(SentSignal::Offer {
            to: to_user_id.to_string(),
            sdp: sdp.to_string(),
        });
    }

    async fn send_answer(&self, to_user_id: &str, sdp: &str) {
        self.sent.lock().unwrap().push(SentSignal::Answer {
            to: to_user_id.to_string(),
            sdp: sdp.to_string(),
        });
    }

    async fn send_ice_candidate(&self, to_user_id: &str, candidate: &IceCandidate) {
        self.sent.lock().unwrap().push(SentSignal::Candidate {
            to: to_user_id.to_string(),
            candidate: candidate.candidate.clone(),
        });
    }
}

/// One normalized callback the router delivered
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerCall {
    PeerJoined(String),
    Offer { from: String, sdp: String },
    Answer { from: String, sdp: String },
    IceCandidate { from: String, candidate: String },
    PeerLeft(String),
}

/// Signal handler that forwards every callback to a channel
pub struct SpyHandler {
    tx: mpsc::UnboundedSender<HandlerCall>,
}

impl SpyHandler {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HandlerCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl SignalHandler for SpyHandler {
    async fn on_peer_joined(&self, peer_id: String) {
        let _ = self.tx.send(HandlerCall::PeerJoined(peer_id));
    }

    async fn on_offer(&self, peer_id: String, sdp: String) {
        let _ = self.tx.send(HandlerCall::Offer { from: peer_id, sdp });
    }

    async fn on_answer(&self, peer_id: String, sdp: String) {
        let _ = self.tx.send(HandlerCall::Answer { from: peer_id, sdp });
    }

    async fn on_ice_candidate(&self, peer_id: String, candidate: IceCandidate) {
        let _ = self.tx.send(HandlerCall::IceCandidate {
            from: peer_id,
            candidate: candidate.candidate,
        });
    }

    async fn on_peer_left(&self, peer_id: String) {
        let _ = self.tx.send(HandlerCall::PeerLeft(peer_id));
    }
}
