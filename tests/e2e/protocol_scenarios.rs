//! Multi-peer round-trip and edge-case scenarios, driven entirely through
//! `CoordinatorEngine`'s public API plus a local, test-only `Transport` that
//! queues outbound messages instead of touching a real relay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use musig2_lotus_core::crypto::{derive_pubkey, musig_key_agg, verify_schnorr, PubkeyBytes};
use musig2_lotus_core::error::MusigError;
use musig2_lotus_core::session::SessionPhase;
use musig2_lotus_engine::signing::sign_canonical;
use musig2_lotus_engine::{CoordinatorEngine, EngineConfig, EngineError, Transport};
use musig2_lotus_router::canonical::advertisement_canonical_bytes;
use musig2_lotus_router::messages::{
    CapabilityCriteria, LotusMessage, NonceCommit, ParticipantJoined, SignerAdvertisement,
};
use musig2_lotus_security::{SecurityConfig, SecurityManager};

/// Records every outbound send so the test driver can pump them to the
/// right peer(s) by hand; never delivers anything on its own.
#[derive(Default)]
struct Outbox {
    direct: Mutex<Vec<(String, LotusMessage)>>,
    broadcasts: Mutex<Vec<LotusMessage>>,
}

impl Outbox {
    fn drain(&self) -> (Vec<(String, LotusMessage)>, Vec<LotusMessage>) {
        (
            std::mem::take(&mut *self.direct.lock().unwrap()),
            std::mem::take(&mut *self.broadcasts.lock().unwrap()),
        )
    }
}

/// Implements `Transport` by writing into a shared `Outbox` the test keeps
/// its own handle to, so the driver loop can drain each engine's queue from
/// outside without the engine exposing its transport field.
#[derive(Clone)]
struct SharedOutbox(Arc<Outbox>);

#[async_trait]
impl Transport for SharedOutbox {
    async fn direct_send(&self, peer_id: &str, message: &LotusMessage) -> Result<(), String> {
        self.0.direct.lock().unwrap().push((peer_id.to_string(), message.clone()));
        Ok(())
    }

    async fn broadcast(&self, _topic: &str, message: &LotusMessage) -> Result<(), String> {
        self.0.broadcasts.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn subscribe_broadcast(&self, _topic: &str) -> Result<(), String> {
        Ok(())
    }
}

struct Node {
    engine: CoordinatorEngine<SharedOutbox>,
    outbox: Arc<Outbox>,
}

fn privkey(seed: u8) -> [u8; 32] {
    let mut b = [0u8; 32];
    b[0] = 0x01;
    b[31] = seed;
    b
}

fn build_node(peer_id: &str, sk: [u8; 32]) -> Node {
    build_node_with_config(peer_id, sk, EngineConfig::default())
}

fn build_node_with_config(peer_id: &str, sk: [u8; 32], config: EngineConfig) -> Node {
    let outbox = Arc::new(Outbox::default());
    let engine = CoordinatorEngine::new(
        peer_id.to_string(),
        sk,
        config,
        SecurityManager::new(SecurityConfig::default()),
        SharedOutbox(outbox.clone()),
    )
    .unwrap();
    Node { engine, outbox }
}

fn is_establishing(msg: &LotusMessage) -> bool {
    matches!(msg, LotusMessage::ParticipantJoined(_) | LotusMessage::SessionReady(_))
}

/// Dispatches one message to `node`, as if it arrived from `from_peer`.
/// Returns the final signature if this delivery completed the session.
async fn deliver(node: &Node, msg: LotusMessage, from_peer: &str, now: u64) -> Option<[u8; 64]> {
    let engine = &node.engine;
    match msg {
        LotusMessage::SigningRequest(req) => {
            engine.handle_signing_request(req, now).await.unwrap();
            None
        }
        LotusMessage::ParticipantJoined(pj) => {
            engine.handle_participant_joined(pj, now).await.unwrap();
            None
        }
        LotusMessage::SessionReady(ready) => {
            engine.handle_session_ready(ready, from_peer, now).await.unwrap();
            None
        }
        LotusMessage::NonceCommit(c) => {
            engine.handle_nonce_commit(c, from_peer, now).await.unwrap();
            None
        }
        LotusMessage::NonceShare(s) => {
            engine.handle_nonce_share(s, from_peer, now).await.unwrap();
            None
        }
        LotusMessage::PartialSigShare(p) => engine.handle_partial_sig_share(p, from_peer, now).await.unwrap(),
        LotusMessage::NonceAck(_) | LotusMessage::PartialSigAck(_) | LotusMessage::SignatureFinalized(_) => None,
        other => panic!("unexpected message in test harness: {other:?}"),
    }
}

/// Pumps every node's outbound queue to every other node until all queues
/// are quiet. Within one round, session-establishing messages
/// (`ParticipantJoined`/`SessionReady`) are delivered system-wide before any
/// message that depends on the receiving session already existing — a real
/// per-peer ordered channel guarantees this; this harness enforces it
/// explicitly since all peers share one synchronous driver loop.
async fn pump(nodes: &HashMap<String, &Node>, now: u64) -> Option<[u8; 64]> {
    let mut signature = None;
    loop {
        let mut outgoing: Vec<(String, String, LotusMessage)> = Vec::new(); // (from, to, msg)
        let mut quiet = true;
        for (from, node) in nodes {
            let (direct, broadcasts) = node.outbox.drain();
            if !direct.is_empty() || !broadcasts.is_empty() {
                quiet = false;
            }
            for (to, msg) in direct {
                outgoing.push((from.clone(), to, msg));
            }
            for msg in broadcasts {
                for to in nodes.keys() {
                    if to != from {
                        outgoing.push((from.clone(), to.clone(), msg.clone()));
                    }
                }
            }
        }
        if quiet {
            break;
        }

        let (establishing, rest): (Vec<_>, Vec<_>) = outgoing.into_iter().partition(|(_, _, m)| is_establishing(m));
        for (from, to, msg) in establishing {
            deliver(nodes[&to], msg, &from, now).await;
        }
        for (from, to, msg) in rest {
            if let Some(sig) = deliver(nodes[&to], msg, &from, now).await {
                signature = Some(sig);
            }
        }
    }
    signature
}

async fn run_round_trip(seeds: &[u8]) -> (HashMap<String, Node>, [u8; 64], [u8; 32]) {
    let now = 1_000_000u64;
    let message = {
        use sha2::{Digest, Sha256};
        let digest: [u8; 32] = Sha256::digest(b"hello").into();
        digest
    };

    let mut nodes = HashMap::new();
    let mut pubkeys = Vec::new();
    for (i, &seed) in seeds.iter().enumerate() {
        let sk = privkey(seed);
        pubkeys.push(derive_pubkey(&sk).unwrap());
        nodes.insert(format!("peer{i}"), build_node(&format!("peer{i}"), sk));
    }

    let creator = nodes.get("peer0").unwrap();
    let session_id = creator
        .engine
        .create_signing_request(pubkeys.clone(), message, "transfer", now, 3600)
        .await
        .unwrap();

    let refs: HashMap<String, &Node> = nodes.iter().map(|(k, v)| (k.clone(), v)).collect();
    let signature = pump(&refs, now).await.expect("round trip should complete");

    for node in nodes.values() {
        assert_eq!(node.engine.session_phase(&session_id).await, Some(SessionPhase::Complete));
    }

    (nodes, signature, message)
}

#[tokio::test]
async fn two_of_two_round_trip() {
    let (_nodes, signature, message) = run_round_trip(&[1, 2]).await;
    let pk_a = derive_pubkey(&privkey(1)).unwrap();
    let pk_b = derive_pubkey(&privkey(2)).unwrap();
    let ctx = musig_key_agg(&[pk_a, pk_b]).unwrap();
    assert!(verify_schnorr(&signature, &ctx.effective_pubkey_bytes(), &message).unwrap());
}

#[tokio::test]
async fn three_of_three_round_trip() {
    let (_nodes, signature, message) = run_round_trip(&[1, 2, 3]).await;
    let pubkeys: Vec<_> = [1u8, 2, 3].iter().map(|&s| derive_pubkey(&privkey(s)).unwrap()).collect();
    let ctx = musig_key_agg(&pubkeys).unwrap();
    assert!(verify_schnorr(&signature, &ctx.effective_pubkey_bytes(), &message).unwrap());
}

#[tokio::test]
async fn late_joiner_after_roster_closed_is_rejected_without_disrupting_session() {
    let now = 1_000_000u64;
    let message = [0x42u8; 32];

    let sk_a = privkey(1);
    let sk_b = privkey(2);
    let sk_c = privkey(3);
    let pk_a = derive_pubkey(&sk_a).unwrap();
    let pk_b = derive_pubkey(&sk_b).unwrap();
    let pk_c = derive_pubkey(&sk_c).unwrap();

    let node_a = build_node("peerA", sk_a);
    let node_b = build_node("peerB", sk_b);

    let session_id = node_a
        .engine
        .create_signing_request(vec![pk_a, pk_b], message, "transfer", now, 3600)
        .await
        .unwrap();

    let mut nodes = HashMap::new();
    nodes.insert("peerA".to_string(), &node_a);
    nodes.insert("peerB".to_string(), &node_b);
    let signature = pump(&nodes, now).await.expect("2-of-2 should complete");

    // An out-of-band peer tries to join the already-closed roster.
    let late_join = ParticipantJoined {
        request_id: session_id.clone(),
        index: 0,
        peer_id: "peerC".into(),
        pubkey: pk_c,
        timestamp: now,
        signature: [0u8; 64],
    };
    let err = node_a.engine.handle_participant_joined(late_join, now).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownSession(_)));

    // The established session is unaffected.
    assert_eq!(node_a.engine.session_phase(&session_id).await, Some(SessionPhase::Complete));
    let ctx = musig_key_agg(&[pk_a, pk_b]).unwrap();
    assert!(verify_schnorr(&signature, &ctx.effective_pubkey_bytes(), &message).unwrap());
}

#[tokio::test]
async fn coordinator_failover_advances_and_eventually_exhausts() {
    let mut config = EngineConfig::default();
    config.enable_coordinator_election = true;
    config.enable_coordinator_failover = true;
    config.broadcast_timeout_secs = 300;

    let sk_a = privkey(1);
    let sk_b = privkey(2);
    let pk_a = derive_pubkey(&sk_a).unwrap();
    let pk_b = derive_pubkey(&sk_b).unwrap();

    let node_a = build_node_with_config("peerA", sk_a, config.clone());
    let node_b = build_node_with_config("peerB", sk_b, config);

    let start = 1_000_000u64;
    let message = [0x22u8; 32];
    node_a
        .engine
        .create_signing_request(vec![pk_a, pk_b], message, "transfer", start, 3600)
        .await
        .unwrap();

    let mut nodes = HashMap::new();
    nodes.insert("peerA".to_string(), &node_a);
    nodes.insert("peerB".to_string(), &node_b);
    // Deliver only up through the establishing messages and the first
    // nonce-commit round, then stop — emulating peerB going silent before
    // revealing its nonce, so the session stalls in NonceExchange.
    pump_until_stalled(&nodes, start).await;

    let ctx = musig_key_agg(&[pk_a, pk_b]).unwrap();
    let session_id = musig2_lotus_router::canonical::derive_session_id(&ctx.sorted_pubkeys, &message);
    assert_eq!(node_a.engine.session_phase(&session_id).await, Some(SessionPhase::NonceExchange));

    let first = node_a.engine.check_failover(&session_id, start + 301).await.unwrap();
    assert!(first, "first failover should advance the coordinator");

    // Immediately re-checking (no time elapsed since the advance) must not
    // advance again.
    let immediate = node_a.engine.check_failover(&session_id, start + 301).await.unwrap();
    assert!(!immediate);

    // Keep stalling past the timeout until attempts exceed the 2-party roster.
    let mut t = start + 301;
    let mut exhausted = false;
    for _ in 0..4 {
        t += 301;
        match node_a.engine.check_failover(&session_id, t).await {
            Ok(_) => {}
            Err(EngineError::FailoverExhausted(_)) => {
                exhausted = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert!(exhausted, "failover should eventually exhaust for a 2-party roster");
    assert_eq!(node_a.engine.session_phase(&session_id).await, Some(SessionPhase::Aborted));
}

#[tokio::test]
async fn equivocating_nonce_commit_aborts_session_and_penalizes_sender() {
    let now = 1_000_000u64;
    let message = [0x77u8; 32];

    let sk_a = privkey(1);
    let sk_b = privkey(2);
    let pk_a = derive_pubkey(&sk_a).unwrap();
    let pk_b = derive_pubkey(&sk_b).unwrap();

    let node_a = build_node("peerA", sk_a);
    let node_b = build_node("peerB", sk_b);

    let session_id = node_a
        .engine
        .create_signing_request(vec![pk_a, pk_b], message, "transfer", now, 3600)
        .await
        .unwrap();

    let mut nodes = HashMap::new();
    nodes.insert("peerA".to_string(), &node_a);
    nodes.insert("peerB".to_string(), &node_b);
    // Run the happy path up through the first genuine nonce-commit round so
    // peerB has already recorded peerA's real commitment.
    pump_until_stalled(&nodes, now).await;

    let ctx = musig_key_agg(&[pk_a, pk_b]).unwrap();
    let a_index = ctx.index_of(&pk_a).unwrap() as u8;

    // peerA (malicious, or compromised) sends a second, different
    // commitment for the same session and index.
    let forged = NonceCommit {
        session_id: session_id.clone(),
        signer_index: a_index,
        sequence: 2,
        commitment: [0xAAu8; 32],
    };
    let err = node_b.engine.handle_nonce_commit(forged, "peerA", now).await.unwrap_err();
    assert!(matches!(err, EngineError::Musig(MusigError::Equivocation(_))));

    assert_eq!(node_b.engine.session_phase(&session_id).await, Some(SessionPhase::Aborted));
}

/// Exercises `SecurityManager::validate_advertisement` directly — no engine
/// or transport involved, since advertisement validation is a standalone
/// security-layer concern that doesn't depend on an active session.
#[tokio::test]
async fn advertisement_with_flipped_signature_byte_is_rejected_and_penalized() {
    let sk = privkey(9);
    let pubkey: PubkeyBytes = derive_pubkey(&sk).unwrap();
    let now = 1_000_000u64;

    let mut ad = SignerAdvertisement {
        advertisement_id: "ad-1".into(),
        peer_id: "peerD".into(),
        addresses: vec![],
        pubkey,
        criteria: CapabilityCriteria {
            tx_kinds: vec!["transfer".into()],
            amount_range: None,
            min_reputation: None,
            tags: Default::default(),
        },
        metadata: None,
        created_at: now,
        expires_at: now + 900,
        signature: [0u8; 64],
    };
    ad.signature = sign_canonical(&sk, &advertisement_canonical_bytes(&ad)).unwrap();
    ad.signature[0] ^= 0xFF;

    let mut security = SecurityManager::new(SecurityConfig::default());
    let err = security.validate_advertisement(&ad, now).unwrap_err();
    assert!(matches!(err, musig2_lotus_security::SecurityError::SignatureVerificationFailed));
    assert_eq!(security.reputation.score("peerD"), 80);
}

/// Delivers session-establishing messages and the first nonce-commit round,
/// then drops anything that would let the session progress further.
async fn pump_until_stalled(nodes: &HashMap<String, &Node>, now: u64) {
    for _round in 0..3 {
        let mut outgoing: Vec<(String, String, LotusMessage)> = Vec::new();
        for (from, node) in nodes {
            let (direct, broadcasts) = node.outbox.drain();
            for (to, msg) in direct {
                outgoing.push((from.clone(), to, msg));
            }
            for msg in broadcasts {
                for to in nodes.keys() {
                    if to != from {
                        outgoing.push((from.clone(), to.clone(), msg.clone()));
                    }
                }
            }
        }
        if outgoing.is_empty() {
            break;
        }
        let (establishing, rest): (Vec<_>, Vec<_>) = outgoing.into_iter().partition(|(_, _, m)| is_establishing(m));
        for (from, to, msg) in establishing {
            deliver(nodes[&to], msg, &from, now).await;
        }
        for (from, to, msg) in rest {
            if matches!(msg, LotusMessage::NonceShare(_) | LotusMessage::PartialSigShare(_)) {
                continue;
            }
            deliver(nodes[&to], msg, &from, now).await;
        }
    }
}
