//! The coordinator/peer engine: one instance per node. Holds active
//! sessions keyed by session id, the broadcast-request-id -> session
//! mapping for request-style flows (where the request id and the session
//! id are the same string), and drives the happy-path flow, coordinator
//! election/failover, and the edge cases in response to inbound messages.

use std::collections::HashMap;

use musig2_lotus_core::crypto::{scalar_from_bytes, scalar_to_bytes, PubkeyBytes};
use musig2_lotus_core::session::ActiveSigningSession;
use musig2_lotus_router::canonical::{self, derive_session_id};
use musig2_lotus_router::messages::{
    NonceAck, NonceCommit, NonceShare, ParticipantJoined, PartialSigAck, PartialSigShare, SessionAbort,
    SessionReady, SignatureFinalized, SigningRequest,
};
use musig2_lotus_security::SecurityManager;
use tokio::sync::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::election::{elect_coordinator, next_coordinator};
use crate::error::EngineError;
use crate::signing::sign_canonical;
use crate::transport::Transport;

fn session_id_to_bytes(id: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    if let Ok(raw) = hex::decode(id) {
        let n = raw.len().min(32);
        out[..n].copy_from_slice(&raw[..n]);
    }
    out
}

struct SessionRecord {
    session: ActiveSigningSession,
    roster: Vec<(u8, String)>,
    coordinator_index: usize,
    failover_attempts: usize,
    created_at: u64,
    last_activity: u64,
}

struct PendingRequest {
    request: SigningRequest,
    joined: HashMap<u8, (String, PubkeyBytes)>,
}

pub struct CoordinatorEngine<T: Transport> {
    peer_id: String,
    privkey: [u8; 32],
    pubkey: PubkeyBytes,
    config: EngineConfig,
    security: Mutex<SecurityManager>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    pending_requests: RwLock<HashMap<String, PendingRequest>>,
    joined_requests: RwLock<HashMap<String, SigningRequest>>,
    transport: T,
}

impl<T: Transport> CoordinatorEngine<T> {
    pub fn new(
        peer_id: String,
        privkey: [u8; 32],
        config: EngineConfig,
        security: SecurityManager,
        transport: T,
    ) -> Result<Self, EngineError> {
        let pubkey = musig2_lotus_core::crypto::derive_pubkey(&privkey)?;
        Ok(Self {
            peer_id,
            privkey,
            pubkey,
            config,
            security: Mutex::new(security),
            sessions: RwLock::new(HashMap::new()),
            pending_requests: RwLock::new(HashMap::new()),
            joined_requests: RwLock::new(HashMap::new()),
            transport,
        })
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn pubkey(&self) -> PubkeyBytes {
        self.pubkey
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_phase(&self, session_id: &str) -> Option<musig2_lotus_core::session::SessionPhase> {
        self.sessions.read().await.get(session_id).map(|r| r.session.phase())
    }

    /// Step 1: build, self-sign, and broadcast a `SigningRequest`. The
    /// creator immediately records itself as joined (it is, by invariant,
    /// one of the required signers) so only the other participants need to
    /// reply with `ParticipantJoined`.
    pub async fn create_signing_request(
        &self,
        required_pubkeys: Vec<PubkeyBytes>,
        message: [u8; 32],
        tx_kind: &str,
        now: u64,
        ttl_secs: u64,
    ) -> Result<String, EngineError> {
        let ctx = musig2_lotus_core::crypto::musig_key_agg(&required_pubkeys)?;
        let session_id = derive_session_id(&ctx.sorted_pubkeys, &message);

        let mut req = SigningRequest {
            request_id: session_id.clone(),
            required_pubkeys: ctx.sorted_pubkeys.clone(),
            message,
            creator_peer_id: self.peer_id.clone(),
            creator_pubkey: self.pubkey,
            metadata: None,
            created_at: now,
            expires_at: now + ttl_secs,
            signature: [0u8; 64],
        };
        let bytes = canonical::signing_request_canonical_bytes(&req);
        req.signature = sign_canonical(&self.privkey, &bytes)?;

        let my_index = ctx
            .index_of(&self.pubkey)
            .ok_or(EngineError::Musig(musig2_lotus_core::error::MusigError::NotAParticipant(0)))?;

        let mut joined = HashMap::new();
        joined.insert(my_index as u8, (self.peer_id.clone(), self.pubkey));
        self.pending_requests
            .write()
            .await
            .insert(session_id.clone(), PendingRequest { request: req.clone(), joined });

        let topic = musig2_lotus_router::messages::discovery_topic(tx_kind);
        self.transport
            .broadcast(&topic, &musig2_lotus_router::messages::LotusMessage::SigningRequest(req))
            .await
            .map_err(EngineError::Transport)?;

        log::info!("peer {}: broadcast signing request {session_id} on {topic}", self.peer_id);
        Ok(session_id)
    }

    /// Step 2 (recipient side): if this node is one of the required
    /// signers, reply to the creator with a signed `ParticipantJoined`.
    pub async fn handle_signing_request(&self, req: SigningRequest, now: u64) -> Result<(), EngineError> {
        {
            let mut security = self.security.lock().await;
            security.validate_signing_request(&req, now)?;
        }

        if req.creator_pubkey == self.pubkey || !req.required_pubkeys.contains(&self.pubkey) {
            return Ok(());
        }

        let index = req
            .required_pubkeys
            .iter()
            .position(|pk| *pk == self.pubkey)
            .expect("checked contains above") as u8;

        let mut pj = ParticipantJoined {
            request_id: req.request_id.clone(),
            index,
            peer_id: self.peer_id.clone(),
            pubkey: self.pubkey,
            timestamp: now,
            signature: [0u8; 64],
        };
        let bytes = canonical::participant_joined_canonical_bytes(&pj);
        pj.signature = sign_canonical(&self.privkey, &bytes)?;

        self.joined_requests.write().await.insert(req.request_id.clone(), req.clone());

        self.transport
            .direct_send(
                &req.creator_peer_id,
                &musig2_lotus_router::messages::LotusMessage::ParticipantJoined(pj),
            )
            .await
            .map_err(EngineError::Transport)?;
        Ok(())
    }

    /// Step 2/3 (creator side): accumulate joiners; once every required
    /// index has joined, elect a coordinator, start the local session, and
    /// broadcast `SessionReady` to the roster.
    pub async fn handle_participant_joined(&self, pj: ParticipantJoined, now: u64) -> Result<(), EngineError> {
        {
            let mut security = self.security.lock().await;
            security.validate_participant_joined(&pj, now)?;
        }

        let mut pending_guard = self.pending_requests.write().await;
        let pending = pending_guard
            .get_mut(&pj.request_id)
            .ok_or_else(|| EngineError::UnknownSession(pj.request_id.clone()))?;

        let required = pending.request.required_pubkeys.len();
        if pending.joined.len() >= required && !pending.joined.contains_key(&pj.index) {
            return Err(EngineError::RosterClosed(pj.request_id));
        }
        if let Some((existing_peer, existing_pk)) = pending.joined.get(&pj.index) {
            if *existing_peer != pj.peer_id || *existing_pk != pj.pubkey {
                drop(pending_guard);
                self.security.lock().await.penalize_equivocation(&pj.peer_id);
                return Err(EngineError::RosterClosed(pj.request_id));
            }
            return Ok(());
        }
        pending.joined.insert(pj.index, (pj.peer_id.clone(), pj.pubkey));

        if pending.joined.len() < required {
            return Ok(());
        }

        let request = pending.request.clone();
        let mut roster: Vec<(u8, String)> = pending
            .joined
            .iter()
            .map(|(idx, (peer, _))| (*idx, peer.clone()))
            .collect();
        roster.sort_by_key(|(idx, _)| *idx);
        pending_guard.remove(&pj.request_id);
        drop(pending_guard);

        let sorted_pubkeys = request.required_pubkeys.clone();
        let coordinator_index = if self.config.enable_coordinator_election {
            elect_coordinator(self.config.election_method, &request.request_id, &sorted_pubkeys, &[])
        } else {
            sorted_pubkeys
                .iter()
                .position(|pk| *pk == request.creator_pubkey)
                .unwrap_or(0)
        };
        let coordinator_peer_id = roster[coordinator_index].1.clone();

        self.start_session(&request, &roster, coordinator_index, now).await?;

        let ready = SessionReady {
            session_id: request.request_id.clone(),
            roster: roster.clone(),
            coordinator_peer_id,
        };
        for (_, peer) in &roster {
            if *peer == self.peer_id {
                continue;
            }
            self.transport
                .direct_send(peer, &musig2_lotus_router::messages::LotusMessage::SessionReady(ready.clone()))
                .await
                .map_err(EngineError::Transport)?;
        }
        log::info!("session {} ready with {} participants", request.request_id, roster.len());
        Ok(())
    }

    /// Step 3 (non-creator side): a participant receives `SessionReady` and
    /// starts its own local session from the `SigningRequest` it joined.
    ///
    /// `SessionReady` is coordinator-only per the routing table (§4.3), but
    /// at this point the session doesn't exist locally yet to look up who
    /// its coordinator is — so the expected coordinator is recomputed the
    /// same deterministic way the real coordinator picked it (§4.4) and
    /// checked against who actually sent the message, rather than trusting
    /// the `coordinator_peer_id` field the message itself carries.
    pub async fn handle_session_ready(&self, ready: SessionReady, peer_id: &str, now: u64) -> Result<(), EngineError> {
        let request = self
            .joined_requests
            .read()
            .await
            .get(&ready.session_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownSession(ready.session_id.clone()))?;

        let coordinator_index = if self.config.enable_coordinator_election {
            elect_coordinator(self.config.election_method, &ready.session_id, &request.required_pubkeys, &[])
        } else {
            request
                .required_pubkeys
                .iter()
                .position(|pk| *pk == request.creator_pubkey)
                .unwrap_or(0)
        };
        let expected_peer = ready
            .roster
            .iter()
            .find(|(idx, _)| *idx as usize == coordinator_index)
            .map(|(_, peer)| peer.as_str());
        if expected_peer != Some(peer_id) {
            self.security.lock().await.penalize_equivocation(peer_id);
            return Err(EngineError::Router(musig2_lotus_router::error::RouterError::AuthorityViolation {
                kind: musig2_lotus_router::routing::MessageKind::SessionReady,
                required: musig2_lotus_router::routing::Authority::Coordinator,
                actual: musig2_lotus_router::routing::Authority::Participant,
            }));
        }
        self.start_session(&request, &ready.roster, coordinator_index, now).await
    }

    async fn start_session(
        &self,
        request: &SigningRequest,
        roster: &[(u8, String)],
        coordinator_index: usize,
        now: u64,
    ) -> Result<(), EngineError> {
        let session_id_bytes = session_id_to_bytes(&request.request_id);
        let mut session = ActiveSigningSession::create(
            session_id_bytes,
            &request.required_pubkeys,
            self.privkey,
            request.message,
            None,
        )?;
        let commitment = session.generate_nonces()?;
        let my_index = session.my_index() as u8;

        self.sessions.write().await.insert(
            request.request_id.clone(),
            SessionRecord {
                session,
                roster: roster.to_vec(),
                coordinator_index,
                failover_attempts: 0,
                created_at: now,
                last_activity: now,
            },
        );

        let commit_msg = musig2_lotus_router::messages::LotusMessage::NonceCommit(NonceCommit {
            session_id: request.request_id.clone(),
            signer_index: my_index,
            sequence: 1,
            commitment,
        });
        for (_, peer) in roster {
            if *peer == self.peer_id {
                continue;
            }
            self.transport.direct_send(peer, &commit_msg).await.map_err(EngineError::Transport)?;
        }
        Ok(())
    }

    /// Round 1a (receiving side): records a peer's nonce commitment, acks
    /// it, and — once every participant (including this one) has committed
    /// — reveals this party's own nonce via `NonceShare` to the roster, per
    /// the two-step commit/reveal (§5.2).
    pub async fn handle_nonce_commit(&self, msg: NonceCommit, peer_id: &str, now: u64) -> Result<(), EngineError> {
        self.guard_sequence(peer_id, &msg.session_id, msg.signer_index, msg.sequence).await?;
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&msg.session_id)
            .ok_or_else(|| EngineError::UnknownSession(msg.session_id.clone()))?;
        if let Err(e) = record.session.receive_nonce_commit(msg.signer_index as usize, msg.commitment) {
            let _ = record.session.abort();
            drop(sessions);
            self.security.lock().await.penalize_equivocation(peer_id);
            return Err(e.into());
        }
        record.last_activity = now;
        let my_index = record.session.my_index() as u8;
        let ready_to_reveal = record.session.all_commitments_received();
        if ready_to_reveal {
            record.session.begin_nonce_exchange();
        }
        let my_nonce = record.session.my_public_nonce();
        let roster = record.roster.clone();
        drop(sessions);

        self.transport
            .direct_send(
                peer_id,
                &musig2_lotus_router::messages::LotusMessage::NonceAck(NonceAck {
                    session_id: msg.session_id.clone(),
                    signer_index: my_index,
                    sequence: msg.sequence,
                }),
            )
            .await
            .map_err(EngineError::Transport)?;

        if ready_to_reveal {
            let public_nonce = my_nonce.expect("generate_nonces ran in start_session");
            let share = musig2_lotus_router::messages::LotusMessage::NonceShare(NonceShare {
                session_id: msg.session_id,
                signer_index: my_index,
                sequence: 1,
                public_nonce,
            });
            for (_, peer) in &roster {
                if *peer == self.peer_id {
                    continue;
                }
                self.transport.direct_send(peer, &share).await.map_err(EngineError::Transport)?;
            }
        }
        Ok(())
    }

    pub async fn handle_nonce_share(&self, msg: NonceShare, peer_id: &str, now: u64) -> Result<(), EngineError> {
        self.guard_sequence(peer_id, &msg.session_id, msg.signer_index, msg.sequence).await?;

        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&msg.session_id)
            .ok_or_else(|| EngineError::UnknownSession(msg.session_id.clone()))?;
        if let Err(e) = record.session.receive_nonce_share(msg.signer_index as usize, msg.public_nonce) {
            let _ = record.session.abort();
            drop(sessions);
            self.security.lock().await.penalize_equivocation(peer_id);
            return Err(e.into());
        }
        record.last_activity = now;

        if !record.session.all_nonces_received() {
            return Ok(());
        }

        let partial = record.session.create_partial_signature()?;
        let my_index = record.session.my_index() as u8;
        let roster = record.roster.clone();
        drop(sessions);

        let share = musig2_lotus_router::messages::LotusMessage::PartialSigShare(PartialSigShare {
            session_id: msg.session_id,
            signer_index: my_index,
            sequence: 1,
            partial_sig: scalar_to_bytes(&partial),
        });
        for (_, peer) in &roster {
            if *peer == self.peer_id {
                continue;
            }
            self.transport.direct_send(peer, &share).await.map_err(EngineError::Transport)?;
        }
        Ok(())
    }

    /// Returns `Some(signature)` once the final aggregate signature is
    /// available, after which the coordinator emits `SignatureFinalized`.
    pub async fn handle_partial_sig_share(
        &self,
        msg: PartialSigShare,
        peer_id: &str,
        now: u64,
    ) -> Result<Option<[u8; 64]>, EngineError> {
        self.guard_sequence(peer_id, &msg.session_id, msg.signer_index, msg.sequence).await?;

        let partial = scalar_from_bytes(&msg.partial_sig)?;
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(&msg.session_id)
            .ok_or_else(|| EngineError::UnknownSession(msg.session_id.clone()))?;

        if let Err(e) = record.session.receive_partial_sig(msg.signer_index as usize, partial) {
            let offending = msg.signer_index;
            let roster = record.roster.clone();
            record.session.abort().ok();
            drop(sessions);
            match &e {
                musig2_lotus_core::error::MusigError::InvalidPartialSignature(_) => {
                    self.security.lock().await.penalize_invalid_partial_signature(peer_id);
                }
                musig2_lotus_core::error::MusigError::Equivocation(_) => {
                    self.security.lock().await.penalize_equivocation(peer_id);
                }
                _ => {}
            }
            let abort = musig2_lotus_router::messages::LotusMessage::SessionAbort(SessionAbort {
                session_id: msg.session_id,
                reason: format!("{e}"),
                offending_index: Some(offending),
            });
            for (_, peer) in &roster {
                if *peer == self.peer_id {
                    continue;
                }
                let _ = self.transport.direct_send(peer, &abort).await;
            }
            return Err(e.into());
        }
        record.last_activity = now;

        if !record.session.all_partial_sigs_received() {
            let my_index = record.session.my_index() as u8;
            drop(sessions);
            self.transport
                .direct_send(
                    peer_id,
                    &musig2_lotus_router::messages::LotusMessage::PartialSigAck(PartialSigAck {
                        session_id: msg.session_id,
                        signer_index: my_index,
                        sequence: msg.sequence,
                    }),
                )
                .await
                .map_err(EngineError::Transport)?;
            return Ok(None);
        }

        let signature = record.session.get_final_signature()?;
        let coordinator_index = record.coordinator_index;
        let my_index = record.session.my_index();
        let roster = record.roster.clone();
        drop(sessions);

        if my_index == coordinator_index {
            let finalized = musig2_lotus_router::messages::LotusMessage::SignatureFinalized(SignatureFinalized {
                session_id: msg.session_id,
                signature: signature.to_vec(),
            });
            for (_, peer) in &roster {
                if *peer == self.peer_id {
                    continue;
                }
                self.transport.direct_send(peer, &finalized).await.map_err(EngineError::Transport)?;
            }
        }
        Ok(Some(signature))
    }

    async fn guard_sequence(&self, peer_id: &str, session_id: &str, signer_index: u8, sequence: u64) -> Result<(), EngineError> {
        if !self.config.enable_replay_protection {
            return Ok(());
        }
        self.security
            .lock()
            .await
            .check_sequence(peer_id, session_id, signer_index, sequence)
            .map_err(EngineError::Security)
    }

    /// Checks whether the current coordinator for `session_id` has missed
    /// its broadcast deadline (no `SessionReady`/`SignatureFinalized` within
    /// `broadcast_timeout_secs`) and, if so, advances to the next
    /// coordinator in election order. Returns `Err(FailoverExhausted)` once
    /// the attempt count exceeds the participant count.
    pub async fn check_failover(&self, session_id: &str, now: u64) -> Result<bool, EngineError> {
        if !self.config.enable_coordinator_failover {
            return Ok(false);
        }
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;

        let elapsed = now.saturating_sub(record.last_activity);
        if elapsed < self.config.broadcast_timeout_secs {
            return Ok(false);
        }
        record.failover_attempts += 1;
        if record.failover_attempts > record.roster.len() {
            record.session.abort().ok();
            return Err(EngineError::FailoverExhausted(session_id.to_string()));
        }
        record.coordinator_index = next_coordinator(record.coordinator_index, record.roster.len());
        record.last_activity = now;
        log::warn!(
            "session {session_id}: coordinator failover, attempt {}, new coordinator index {}",
            record.failover_attempts,
            record.coordinator_index
        );
        Ok(true)
    }

    /// Periodic sweep (spec §4.7): drops sessions past their absolute
    /// lifetime, aborts sessions stuck in a single round too long, and
    /// reports counts for the caller to log.
    pub async fn cleanup(&self, now: u64) -> (usize, usize) {
        let mut removed = 0;
        let mut aborted = 0;
        let mut sessions = self.sessions.write().await;
        let stuck_phases = [
            musig2_lotus_core::session::SessionPhase::NonceExchange,
            musig2_lotus_core::session::SessionPhase::PartialSigExchange,
        ];
        sessions.retain(|id, record| {
            if now.saturating_sub(record.created_at) > self.config.session_timeout_secs {
                log::info!("session {id}: removed (session timeout)");
                removed += 1;
                return false;
            }
            if stuck_phases.contains(&record.session.phase())
                && now.saturating_sub(record.last_activity) > self.config.stuck_session_timeout_secs
            {
                log::warn!("session {id}: aborting (stuck timeout)");
                record.session.abort().ok();
                aborted += 1;
            }
            true
        });
        (removed, aborted)
    }
}
