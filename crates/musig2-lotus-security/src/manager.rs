//! The security manager: every inbound message passes through here before
//! the router/engine ever interprets it (§4.4 "Inbound handling"). Order of
//! checks matters — cheap structural checks first, signature verification
//! (the expensive one) last, exactly so a flood of oversized or expired
//! garbage can't be used to burn CPU on curve operations.

use sha2::{Digest, Sha256};

use musig2_lotus_core::crypto::{verify_schnorr, PubkeyBytes};
use musig2_lotus_router::canonical;
use musig2_lotus_router::messages::{ParticipantJoined, SignerAdvertisement, SigningRequest};

use crate::config::SecurityConfig;
use crate::error::SecurityError;
use crate::rate_limit::RateLimiter;
use crate::replay::{ReplayGuard, SequenceCheck};
use crate::reputation::{ReputationStore, Violation};

pub struct SecurityManager {
    config: SecurityConfig,
    pub reputation: ReputationStore,
    rate_limiter: RateLimiter,
    replay_guard: ReplayGuard,
}

fn verify_self_signature(pubkey: &PubkeyBytes, canonical_bytes: &[u8], signature: &[u8; 64]) -> bool {
    let digest: [u8; 32] = Sha256::digest(canonical_bytes).into();
    verify_schnorr(signature, pubkey, &digest).unwrap_or(false)
}

impl SecurityManager {
    pub fn new(config: SecurityConfig) -> Self {
        let reputation = ReputationStore::new(&config);
        let rate_limiter = RateLimiter::new(&config);
        let replay_guard = ReplayGuard::new(config.max_sequence_gap);
        Self {
            config,
            reputation,
            rate_limiter,
            replay_guard,
        }
    }

    pub fn check_size(&self, encoded_len: usize) -> Result<(), SecurityError> {
        if encoded_len > self.config.max_message_size_bytes {
            return Err(SecurityError::OversizedMessage(self.config.max_message_size_bytes));
        }
        Ok(())
    }

    pub fn check_timestamp_skew(&self, timestamp: u64, now: u64) -> Result<(), SecurityError> {
        let skew = if timestamp > now { timestamp - now } else { now - timestamp };
        if skew > self.config.timestamp_skew_secs {
            return Err(SecurityError::TimestampSkew);
        }
        Ok(())
    }

    fn reject(&mut self, peer_id: &str, violation: Violation, err: SecurityError) -> SecurityError {
        self.reputation.penalize(peer_id, violation);
        log::warn!("dropping message from {peer_id}: {err}");
        err
    }

    /// Validates an advertisement: size already checked by the caller
    /// against the raw frame, so this covers timestamp skew, expiry, self
    /// signature, and the publish rate limit.
    pub fn validate_advertisement(
        &mut self,
        ad: &SignerAdvertisement,
        now: u64,
    ) -> Result<(), SecurityError> {
        if self.reputation.is_banned(&ad.peer_id) {
            return Err(SecurityError::Banned(ad.peer_id.clone()));
        }
        if let Err(e) = self.check_timestamp_skew(ad.created_at, now) {
            return Err(self.reject(&ad.peer_id, Violation::MalformedPayload, e));
        }
        if ad.is_expired(now) {
            return Err(self.reject(&ad.peer_id, Violation::MalformedPayload, SecurityError::Expired));
        }
        let bytes = canonical::advertisement_canonical_bytes(ad);
        if !verify_self_signature(&ad.pubkey, &bytes, &ad.signature) {
            return Err(self.reject(
                &ad.peer_id,
                Violation::InvalidSignature,
                SecurityError::SignatureVerificationFailed,
            ));
        }
        let tx_kind = ad
            .criteria
            .tx_kinds
            .first()
            .map(String::as_str)
            .unwrap_or("*");
        if !self.rate_limiter.allow_advertisement(&ad.peer_id, tx_kind, now) {
            return Err(self.reject(
                &ad.peer_id,
                Violation::RateLimitExceeded,
                SecurityError::RateLimited(ad.peer_id.clone(), "advertisement"),
            ));
        }
        Ok(())
    }

    pub fn validate_signing_request(
        &mut self,
        req: &SigningRequest,
        now: u64,
    ) -> Result<(), SecurityError> {
        if self.reputation.is_banned(&req.creator_peer_id) {
            return Err(SecurityError::Banned(req.creator_peer_id.clone()));
        }
        if let Err(e) = self.check_timestamp_skew(req.created_at, now) {
            return Err(self.reject(&req.creator_peer_id, Violation::MalformedPayload, e));
        }
        if req.is_expired(now) {
            return Err(self.reject(
                &req.creator_peer_id,
                Violation::MalformedPayload,
                SecurityError::Expired,
            ));
        }
        if !req.creator_is_participant() {
            return Err(self.reject(
                &req.creator_peer_id,
                Violation::MalformedPayload,
                SecurityError::SignatureVerificationFailed,
            ));
        }
        let bytes = canonical::signing_request_canonical_bytes(req);
        if !verify_self_signature(&req.creator_pubkey, &bytes, &req.signature) {
            return Err(self.reject(
                &req.creator_peer_id,
                Violation::InvalidSignature,
                SecurityError::SignatureVerificationFailed,
            ));
        }
        if !self.rate_limiter.allow_signing_request(&req.creator_peer_id, now) {
            return Err(self.reject(
                &req.creator_peer_id,
                Violation::RateLimitExceeded,
                SecurityError::RateLimited(req.creator_peer_id.clone(), "signing_request"),
            ));
        }
        Ok(())
    }

    pub fn validate_participant_joined(
        &mut self,
        pj: &ParticipantJoined,
        now: u64,
    ) -> Result<(), SecurityError> {
        if self.reputation.is_banned(&pj.peer_id) {
            return Err(SecurityError::Banned(pj.peer_id.clone()));
        }
        if let Err(e) = self.check_timestamp_skew(pj.timestamp, now) {
            return Err(self.reject(&pj.peer_id, Violation::MalformedPayload, e));
        }
        let bytes = canonical::participant_joined_canonical_bytes(pj);
        if !verify_self_signature(&pj.pubkey, &bytes, &pj.signature) {
            return Err(self.reject(
                &pj.peer_id,
                Violation::InvalidSignature,
                SecurityError::SignatureVerificationFailed,
            ));
        }
        Ok(())
    }

    /// Sequence/replay check for session-scoped direct messages
    /// (`NonceCommit`/`NonceShare`/`PartialSigShare`/…). Returns an error
    /// only on an outright replay; a large-but-forward gap is accepted and
    /// penalizes reputation as a side effect.
    pub fn check_sequence(
        &mut self,
        peer_id: &str,
        session_id: &str,
        signer_index: u8,
        sequence: u64,
    ) -> Result<(), SecurityError> {
        if self.reputation.is_banned(peer_id) {
            return Err(SecurityError::Banned(peer_id.to_string()));
        }
        match self.replay_guard.check(session_id, signer_index, sequence) {
            SequenceCheck::Accepted => Ok(()),
            SequenceCheck::AcceptedWithGapWarning => {
                self.reputation.penalize(peer_id, Violation::ReplayGap);
                Ok(())
            }
            SequenceCheck::Replayed => Err(self.reject(
                peer_id,
                Violation::ReplayGap,
                SecurityError::ReplayDetected(peer_id.to_string()),
            )),
        }
    }

    pub fn penalize_equivocation(&mut self, peer_id: &str) {
        self.reputation.penalize(peer_id, Violation::Equivocation);
    }

    pub fn penalize_invalid_partial_signature(&mut self, peer_id: &str) {
        self.reputation.penalize(peer_id, Violation::InvalidSignature);
    }
}
