//! Negotiation engine integration tests: mesh growth, offer collisions,
//! candidate ordering, and per-peer failure containment.

mod harness;

use harness::{RecordingSink, ScriptedFactory, ScriptedLink, SentSignal};
use meshcall::peer::{NegotiationEngine, NegotiationState, PeerRegistry};
use meshcall::signaling::protocol::IceCandidate;
use std::sync::Arc;
use std::time::Duration;

fn engine(factory: Arc<ScriptedFactory>, sink: Arc<RecordingSink>) -> NegotiationEngine {
    harness::init_logging();
    let (events, _rx) = meshcall::events::channel();
    NegotiationEngine::new(Arc::new(PeerRegistry::new()), factory, sink, events)
}

fn candidate(line: &str) -> IceCandidate {
    IceCandidate {
        candidate: line.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
    }
}

#[tokio::test]
async fn test_each_join_gets_its_own_offer() {
    let link1 = ScriptedLink::new();
    let link2 = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![link1, link2]), sink.clone());

    engine.on_peer_joined("p1").await;
    engine.on_peer_joined("p2").await;

    assert_eq!(engine.registry().size().await, 2);
    for peer in ["p1", "p2"] {
        let session = engine.registry().get(peer).await.unwrap();
        assert_eq!(session.state().await, NegotiationState::OfferSent);
    }

    // Answers land in the opposite order; each session completes on its
    // own, unaffected by the other's timing.
    engine.on_answer("p2", "answer-from-p2").await;
    let p1 = engine.registry().get("p1").await.unwrap();
    let p2 = engine.registry().get("p2").await.unwrap();
    assert_eq!(p1.state().await, NegotiationState::OfferSent);
    assert_eq!(p2.state().await, NegotiationState::Stable);

    engine.on_answer("p1", "answer-from-p1").await;
    assert_eq!(p1.state().await, NegotiationState::Stable);
    assert_eq!(
        sink.sent(),
        vec![
            SentSignal::Offer {
                to: "p1".to_string(),
                sdp: "scripted-offer-sdp".to_string()
            },
            SentSignal::Offer {
                to: "p2".to_string(),
                sdp: "scripted-offer-sdp".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_duplicate_join_is_ignored() {
    let link = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![link]), sink.clone());

    engine.on_peer_joined("p1").await;
    engine.on_peer_joined("p1").await;

    assert_eq!(engine.registry().size().await, 1);
    assert_eq!(sink.sent().len(), 1);
}

/// When a second offer from the same peer arrives while the first is
/// still being processed, the newest offer wins: the first session is
/// closed and its parked continuation becomes a no-op.
#[tokio::test]
async fn test_offer_collision_newest_wins() {
    let (link1, gate) = ScriptedLink::gated();
    let link2 = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = Arc::new(engine(
        ScriptedFactory::new(vec![link1.clone(), link2.clone()]),
        sink.clone(),
    ));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.on_offer("p1", "sdp-first").await })
    };
    // Let the first offer park inside set_remote_description
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.on_offer("p1", "sdp-second").await;

    let session = engine.registry().get("p1").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::Stable);
    assert_eq!(link2.remote_descriptions(), vec!["sdp-second".to_string()]);
    assert!(link1.closed(), "superseded connection must be closed");

    gate.notify_one();
    first.await.unwrap();

    // The released continuation notices it was superseded and stops
    assert_eq!(link1.answer_calls(), 0);
    let session = engine.registry().get("p1").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::Stable);
    assert_eq!(
        sink.sent(),
        vec![SentSignal::Answer {
            to: "p1".to_string(),
            sdp: "scripted-answer-sdp".to_string()
        }]
    );
}

/// A second offer can also land while the first is still waiting for its
/// peer connection to be built. The session inserted for the newer offer
/// must survive; the older continuation's insert is rejected and its
/// freshly built connection is discarded.
#[tokio::test]
async fn test_offer_superseded_during_connection_setup() {
    let link1 = ScriptedLink::new();
    let link2 = ScriptedLink::new();
    let sink = RecordingSink::new();
    let factory = ScriptedFactory::new(vec![link1.clone(), link2.clone()]);
    let gate = factory.gate_next_create();
    let engine = Arc::new(engine(factory, sink.clone()));

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.on_offer("p1", "sdp-first").await })
    };
    // Let the first offer park inside the connection factory
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.on_offer("p1", "sdp-second").await;
    let session = engine.registry().get("p1").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::Stable);
    assert_eq!(link1.remote_descriptions(), vec!["sdp-second".to_string()]);

    gate.notify_one();
    first.await.unwrap();

    // The older continuation must not displace the newer session
    let after = engine.registry().get("p1").await.unwrap();
    assert!(Arc::ptr_eq(&session, &after));
    assert_eq!(after.state().await, NegotiationState::Stable);
    assert!(link2.closed(), "stale connection must be discarded");
    assert!(link2.remote_descriptions().is_empty());
    assert_eq!(
        sink.sent(),
        vec![SentSignal::Answer {
            to: "p1".to_string(),
            sdp: "scripted-answer-sdp".to_string()
        }]
    );
}

/// Same window on the join path: an offer arriving while the join is
/// still building its connection takes precedence.
#[tokio::test]
async fn test_join_superseded_by_offer_during_connection_setup() {
    let link1 = ScriptedLink::new();
    let link2 = ScriptedLink::new();
    let sink = RecordingSink::new();
    let factory = ScriptedFactory::new(vec![link1.clone(), link2.clone()]);
    let gate = factory.gate_next_create();
    let engine = Arc::new(engine(factory, sink.clone()));

    let join = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.on_peer_joined("p1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    engine.on_offer("p1", "offer-sdp").await;

    gate.notify_one();
    join.await.unwrap();

    let session = engine.registry().get("p1").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::Stable);
    assert_eq!(link1.remote_descriptions(), vec!["offer-sdp".to_string()]);
    assert!(link2.closed(), "stale connection must be discarded");
    // Only the answer went out; the parked join never reached the offer
    assert_eq!(
        sink.sent(),
        vec![SentSignal::Answer {
            to: "p1".to_string(),
            sdp: "scripted-answer-sdp".to_string()
        }]
    );
}

#[tokio::test]
async fn test_offer_replaces_stable_session() {
    let link1 = ScriptedLink::new();
    let link2 = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(
        ScriptedFactory::new(vec![link1.clone(), link2.clone()]),
        sink,
    );

    engine.on_offer("p1", "sdp-first").await;
    let first = engine.registry().get("p1").await.unwrap();
    assert_eq!(first.state().await, NegotiationState::Stable);

    engine.on_offer("p1", "sdp-renegotiate").await;

    let second = engine.registry().get("p1").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(link1.closed());
    assert_eq!(second.state().await, NegotiationState::Stable);
    assert_eq!(
        link2.remote_descriptions(),
        vec!["sdp-renegotiate".to_string()]
    );
}

/// Candidates arriving before the remote description queue up and drain
/// in arrival order once the answer lands; later candidates apply live.
#[tokio::test]
async fn test_candidates_drain_in_arrival_order() {
    let link = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![link.clone()]), sink);

    engine.on_peer_joined("p1").await;
    engine.on_ice_candidate("p1", candidate("c1")).await;
    engine.on_ice_candidate("p1", candidate("c2")).await;
    assert!(link.candidates().is_empty(), "candidates must wait for the answer");

    engine.on_answer("p1", "answer-sdp").await;
    engine.on_ice_candidate("p1", candidate("c3")).await;

    assert_eq!(
        link.candidates(),
        vec!["c1".to_string(), "c2".to_string(), "c3".to_string()]
    );
    let session = engine.registry().get("p1").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::Stable);
}

#[tokio::test]
async fn test_candidate_for_unknown_peer_is_discarded() {
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![]), sink);

    engine.on_ice_candidate("ghost", candidate("c1")).await;

    assert_eq!(engine.registry().size().await, 0);
}

/// A failed negotiation tears down its own session and leaves every
/// other peer untouched.
#[tokio::test]
async fn test_offer_failure_is_contained_to_one_peer() {
    let failing = ScriptedLink::failing_offer();
    let healthy = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(
        ScriptedFactory::new(vec![failing.clone(), healthy.clone()]),
        sink.clone(),
    );

    engine.on_peer_joined("bad").await;
    engine.on_peer_joined("good").await;

    assert!(engine.registry().get("bad").await.is_none());
    assert!(failing.closed());

    let session = engine.registry().get("good").await.unwrap();
    assert_eq!(session.state().await, NegotiationState::OfferSent);
    assert_eq!(
        sink.sent(),
        vec![SentSignal::Offer {
            to: "good".to_string(),
            sdp: "scripted-offer-sdp".to_string()
        }]
    );
}

#[tokio::test]
async fn test_answer_in_wrong_state_is_discarded() {
    let link = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![link.clone()]), sink);

    engine.on_offer("p1", "offer-sdp").await;
    let before = engine.registry().get("p1").await.unwrap();
    assert_eq!(before.state().await, NegotiationState::Stable);

    // A duplicate answer for an answerer session must not disturb it
    engine.on_answer("p1", "bogus-answer").await;

    let after = engine.registry().get("p1").await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(link.remote_descriptions(), vec!["offer-sdp".to_string()]);
}

#[tokio::test]
async fn test_peer_left_closes_and_removes() {
    let link = ScriptedLink::new();
    let sink = RecordingSink::new();
    let engine = engine(ScriptedFactory::new(vec![link.clone()]), sink);

    engine.on_peer_joined("p1").await;
    engine.on_peer_left("p1").await;

    assert_eq!(engine.registry().size().await, 0);
    assert!(link.closed());
}
