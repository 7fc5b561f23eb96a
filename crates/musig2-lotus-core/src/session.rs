//! Per-party signing session state machine.
//!
//! One `ActiveSigningSession` exists per party per signing ceremony. It
//! owns that party's secret nonce between `generate_nonces` and
//! `create_partial_signature`, tracks the nonce-commit/nonce-share
//! handshake and partial-signature exchange for every other participant,
//! and enforces the phase ordering `Init -> NonceExchange ->
//! PartialSigExchange -> Complete`, with `Aborted` reachable from any
//! non-terminal phase.

use std::collections::HashMap;

use k256::ProjectivePoint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::crypto::{
    self, KeyAggContext, PubkeyBytes, PublicNoncePair, SecretNoncePair, SCALAR_LEN, SIG_LEN,
};
use crate::error::MusigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Init,
    NonceExchange,
    PartialSigExchange,
    Complete,
    Aborted,
}

impl SessionPhase {
    fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Complete | SessionPhase::Aborted)
    }
}

/// Binding hash-commitment to a signer's public nonce pair, sent before the
/// nonce itself is revealed. Prevents a last-mover from picking their nonce
/// adaptively after seeing everyone else's.
pub fn commit_to_nonce(signer_pubkey: &PubkeyBytes, nonce: &PublicNoncePair) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(signer_pubkey);
    hasher.update(nonce.r1);
    hasher.update(nonce.r2);
    hasher.finalize().into()
}

struct PerSignerState {
    commitment: Option<[u8; 32]>,
    public_nonce: Option<PublicNoncePair>,
    partial_sig: Option<k256::Scalar>,
}

impl PerSignerState {
    fn new() -> Self {
        Self {
            commitment: None,
            public_nonce: None,
            partial_sig: None,
        }
    }
}

pub struct ActiveSigningSession {
    pub session_id: [u8; 32],
    ctx: KeyAggContext,
    participants: Vec<PubkeyBytes>,
    my_index: usize,
    my_privkey: [u8; SCALAR_LEN],
    message: [u8; 32],
    phase: SessionPhase,
    secret_nonce: Option<SecretNoncePair>,
    per_signer: HashMap<usize, PerSignerState>,
    taproot_merkle_root: Option<[u8; 32]>,
}

impl Drop for ActiveSigningSession {
    fn drop(&mut self) {
        self.my_privkey.zeroize();
    }
}

impl ActiveSigningSession {
    /// Creates a session from the set of participant public keys (in any
    /// order — they are canonically sorted by `musig_key_agg`) and this
    /// party's own keypair. `taproot_merkle_root` flags the session as a
    /// Taproot-tweaked ceremony when `Some`.
    pub fn create(
        session_id: [u8; 32],
        participant_pubkeys: &[PubkeyBytes],
        my_privkey: [u8; SCALAR_LEN],
        message: [u8; 32],
        taproot_merkle_root: Option<[u8; 32]>,
    ) -> Result<Self, MusigError> {
        let my_pubkey = crypto::derive_pubkey(&my_privkey)?;
        let mut ctx = crypto::musig_key_agg(participant_pubkeys)?;
        let my_index = ctx
            .index_of(&my_pubkey)
            .ok_or(MusigError::NotAParticipant(0))?;

        if let Some(root) = taproot_merkle_root {
            crypto::apply_taproot_tweak(&mut ctx, root)?;
        }

        let mut per_signer = HashMap::with_capacity(ctx.sorted_pubkeys.len());
        for idx in 0..ctx.sorted_pubkeys.len() {
            per_signer.insert(idx, PerSignerState::new());
        }

        Ok(Self {
            session_id,
            participants: ctx.sorted_pubkeys.clone(),
            ctx,
            my_index,
            my_privkey,
            message,
            phase: SessionPhase::Init,
            secret_nonce: None,
            per_signer,
            taproot_merkle_root,
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn my_index(&self) -> usize {
        self.my_index
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn aggregate_pubkey(&self) -> PubkeyBytes {
        self.ctx.effective_pubkey_bytes()
    }

    fn require_phase(&self, expected: SessionPhase, attempted: &str) -> Result<(), MusigError> {
        self.require_phase_in(&[expected], attempted)
    }

    fn require_phase_in(&self, allowed: &[SessionPhase], attempted: &str) -> Result<(), MusigError> {
        if !allowed.contains(&self.phase) {
            return Err(MusigError::PhaseViolation {
                current: self.phase,
                attempted: attempted.to_string(),
            });
        }
        Ok(())
    }

    fn signer_state_mut(&mut self, signer_index: usize) -> Result<&mut PerSignerState, MusigError> {
        if signer_index >= self.participants.len() {
            return Err(MusigError::NotAParticipant(signer_index));
        }
        Ok(self.per_signer.get_mut(&signer_index).expect("every participant index has state"))
    }

    /// Generates this party's own nonce pair. Does **not** advance the
    /// phase — the caller advances `Init -> NonceExchange` via
    /// `begin_nonce_exchange` once a quorum of nonce commitments has been
    /// observed, so a commitment from another signer arriving before this
    /// party has called `generate_nonces` is still accepted. Returns the
    /// commitment to broadcast; the actual public nonce is obtained
    /// separately via `my_public_nonce` once the commit round has closed.
    pub fn generate_nonces(&mut self) -> Result<[u8; 32], MusigError> {
        self.require_phase(SessionPhase::Init, "generateNonces")?;
        let (secret, public) = crypto::musig_nonce_gen(&self.my_privkey, &self.ctx, &self.message, None)?;
        let my_pubkey = self.participants[self.my_index];
        let commitment = commit_to_nonce(&my_pubkey, &public);

        self.secret_nonce = Some(secret);
        let my_index = self.my_index;
        let state = self.signer_state_mut(my_index)?;
        state.commitment = Some(commitment);
        state.public_nonce = Some(public);
        Ok(commitment)
    }

    /// Advances `Init -> NonceExchange`. The caller invokes this once a
    /// quorum of nonce commitments has been observed; a call while already
    /// in `NonceExchange` is a no-op, since `receive_nonce_commit` and
    /// `receive_nonce_share` both accept either phase.
    pub fn begin_nonce_exchange(&mut self) {
        if self.phase == SessionPhase::Init {
            self.phase = SessionPhase::NonceExchange;
        }
    }

    pub fn my_public_nonce(&self) -> Option<PublicNoncePair> {
        self.per_signer.get(&self.my_index).and_then(|s| s.public_nonce)
    }

    /// Round 1a: records a signer's commitment to their (not yet revealed)
    /// nonce pair. Valid in `Init` as well as `NonceExchange`, since a peer's
    /// commitment may arrive before this party has called `generate_nonces`.
    /// Rejects a second, different commitment from the same signer as
    /// equivocation.
    pub fn receive_nonce_commit(&mut self, signer_index: usize, commitment: [u8; 32]) -> Result<(), MusigError> {
        self.require_phase_in(&[SessionPhase::Init, SessionPhase::NonceExchange], "receiveNonceCommit")?;
        let state = self.signer_state_mut(signer_index)?;
        match state.commitment {
            Some(existing) if existing != commitment => Err(MusigError::Equivocation(signer_index)),
            Some(_) => Ok(()),
            None => {
                state.commitment = Some(commitment);
                Ok(())
            }
        }
    }

    /// Round 1b: records a signer's revealed public nonce, checking it
    /// against their earlier commitment.
    pub fn receive_nonce_share(
        &mut self,
        signer_index: usize,
        nonce: PublicNoncePair,
    ) -> Result<(), MusigError> {
        self.require_phase_in(&[SessionPhase::Init, SessionPhase::NonceExchange], "receiveNonceShare")?;
        let signer_pubkey = *self
            .participants
            .get(signer_index)
            .ok_or(MusigError::NotAParticipant(signer_index))?;
        let expected_commitment = commit_to_nonce(&signer_pubkey, &nonce);

        let state = self.signer_state_mut(signer_index)?;
        match state.commitment {
            None => return Err(MusigError::InvalidInput("nonce share with no prior commitment".into())),
            Some(c) if c != expected_commitment => return Err(MusigError::Equivocation(signer_index)),
            Some(_) => {}
        }
        if let Some(existing) = state.public_nonce {
            if existing != nonce {
                return Err(MusigError::Equivocation(signer_index));
            }
            return Ok(());
        }
        state.public_nonce = Some(nonce);
        Ok(())
    }

    /// Whether every participant's public nonce has been recorded yet —
    /// callers driving the protocol from inbound messages use this to know
    /// when it's time to call `create_partial_signature` rather than
    /// guessing from a message count.
    pub fn all_nonces_received(&self) -> bool {
        self.per_signer.values().all(|s| s.public_nonce.is_some())
    }

    /// Whether every participant's commitment has arrived, i.e. it is time
    /// for this party to reveal its own nonce via `NonceShare`.
    pub fn all_commitments_received(&self) -> bool {
        self.per_signer.values().all(|s| s.commitment.is_some())
    }

    fn aggregate_nonces(&self) -> Result<(ProjectivePoint, ProjectivePoint), MusigError> {
        let mut ordered = Vec::with_capacity(self.participants.len());
        for idx in 0..self.participants.len() {
            let nonce = self
                .per_signer
                .get(&idx)
                .and_then(|s| s.public_nonce)
                .ok_or(MusigError::InvalidInput("nonce exchange incomplete".into()))?;
            ordered.push(nonce);
        }
        crypto::musig_nonce_agg(&ordered)
    }

    /// Produces and records this party's partial signature once every
    /// participant's nonce has been received; consumes (and wipes) the
    /// secret nonce pair and advances to `PartialSigExchange`.
    pub fn create_partial_signature(&mut self) -> Result<k256::Scalar, MusigError> {
        self.require_phase(SessionPhase::NonceExchange, "createPartialSignature")?;
        if !self.all_nonces_received() {
            return Err(MusigError::InvalidInput("not all nonces received yet".into()));
        }
        let secret_nonce = self
            .secret_nonce
            .take()
            .ok_or(MusigError::NonceReuse(self.my_index))?;
        let (agg_r1, agg_r2) = self.aggregate_nonces()?;
        let my_pubkey = self.participants[self.my_index];

        let partial = crypto::musig_partial_sign(
            secret_nonce,
            &self.my_privkey,
            &self.ctx,
            &my_pubkey,
            agg_r1,
            agg_r2,
            &self.message,
        )?;

        let my_index = self.my_index;
        self.signer_state_mut(my_index)?.partial_sig = Some(partial);
        self.phase = SessionPhase::PartialSigExchange;
        Ok(partial)
    }

    /// Records and verifies a partial signature from another participant.
    /// An invalid partial signature is an error for the caller to react to
    /// (drop the sender, adjust reputation) rather than something this
    /// method silently tolerates.
    pub fn receive_partial_sig(&mut self, signer_index: usize, partial_sig: k256::Scalar) -> Result<(), MusigError> {
        self.require_phase(SessionPhase::PartialSigExchange, "receivePartialSig")?;
        let signer_pubkey = *self
            .participants
            .get(signer_index)
            .ok_or(MusigError::NotAParticipant(signer_index))?;
        let signer_nonce = self
            .per_signer
            .get(&signer_index)
            .and_then(|s| s.public_nonce)
            .ok_or(MusigError::InvalidInput("signer has no recorded nonce".into()))?;

        if let Some(existing) = self.per_signer.get(&signer_index).and_then(|s| s.partial_sig) {
            if existing != partial_sig {
                return Err(MusigError::Equivocation(signer_index));
            }
            return Ok(());
        }

        let (agg_r1, agg_r2) = self.aggregate_nonces()?;
        let ok = crypto::musig_partial_sig_verify(
            &partial_sig,
            &self.ctx,
            &signer_pubkey,
            &signer_nonce,
            agg_r1,
            agg_r2,
            &self.message,
        )?;
        if !ok {
            return Err(MusigError::InvalidPartialSignature(signer_index));
        }

        self.signer_state_mut(signer_index)?.partial_sig = Some(partial_sig);
        Ok(())
    }

    /// Whether every participant's partial signature has been recorded —
    /// the counterpart to `all_nonces_received` for the second round.
    pub fn all_partial_sigs_received(&self) -> bool {
        self.per_signer.values().all(|s| s.partial_sig.is_some())
    }

    /// Aggregates every collected partial signature into the final 64-byte
    /// signature and advances to `Complete`.
    pub fn get_final_signature(&mut self) -> Result<[u8; SIG_LEN], MusigError> {
        self.require_phase(SessionPhase::PartialSigExchange, "getFinalSignature")?;
        if !self.all_partial_sigs_received() {
            return Err(MusigError::InvalidInput("not all partial signatures received yet".into()));
        }
        let (agg_r1, agg_r2) = self.aggregate_nonces()?;
        let mut ordered = Vec::with_capacity(self.participants.len());
        for idx in 0..self.participants.len() {
            ordered.push(self.per_signer[&idx].partial_sig.expect("checked above"));
        }
        let sig = crypto::musig_sig_agg(&self.ctx, agg_r1, agg_r2, &ordered, &self.message)?;
        self.phase = SessionPhase::Complete;
        Ok(sig)
    }

    /// Aborts the session from any non-terminal phase, wiping the secret
    /// nonce if one was outstanding.
    pub fn abort(&mut self) -> Result<(), MusigError> {
        if self.phase.is_terminal() {
            return Err(MusigError::PhaseViolation {
                current: self.phase,
                attempted: "abort".to_string(),
            });
        }
        self.secret_nonce = None;
        self.phase = SessionPhase::Aborted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privkey(seed: u8) -> [u8; 32] {
        let mut b = [0u8; 32];
        b[31] = seed;
        b[0] = 0x01;
        b
    }

    #[test]
    fn three_of_three_round_trip() {
        let sks = [privkey(1), privkey(2), privkey(3)];
        let pks: Vec<_> = sks.iter().map(|sk| crypto::derive_pubkey(sk).unwrap()).collect();
        let message = [0x42u8; 32];
        let session_id = [0x01u8; 32];

        let mut sessions: Vec<_> = sks
            .iter()
            .map(|sk| ActiveSigningSession::create(session_id, &pks, *sk, message, None).unwrap())
            .collect();

        let commitments: Vec<_> = sessions.iter_mut().map(|s| s.generate_nonces().unwrap()).collect();
        for (i, session) in sessions.iter_mut().enumerate() {
            for (j, commitment) in commitments.iter().enumerate() {
                if i != j {
                    session.receive_nonce_commit(j, *commitment).unwrap();
                }
            }
            // Quorum of commitments reached — the engine would drive this
            // transition; the test stands in for it.
            session.begin_nonce_exchange();
        }

        let public_nonces: Vec<_> = sessions.iter().map(|s| s.my_public_nonce().unwrap()).collect();
        for (i, session) in sessions.iter_mut().enumerate() {
            for (j, nonce) in public_nonces.iter().enumerate() {
                if i != j {
                    session.receive_nonce_share(j, *nonce).unwrap();
                }
            }
        }

        let partials: Vec<_> = sessions
            .iter_mut()
            .map(|s| s.create_partial_signature().unwrap())
            .collect();

        for (i, session) in sessions.iter_mut().enumerate() {
            for (j, partial) in partials.iter().enumerate() {
                if i != j {
                    session.receive_partial_sig(j, *partial).unwrap();
                }
            }
        }

        let sigs: Vec<_> = sessions
            .iter_mut()
            .map(|s| s.get_final_signature().unwrap())
            .collect();
        assert!(sigs.windows(2).all(|w| w[0] == w[1]));
        assert!(crypto::verify_schnorr(&sigs[0], &sessions[0].aggregate_pubkey(), &message).unwrap());
    }

    #[test]
    fn equivocating_nonce_commit_is_rejected() {
        let sks = [privkey(1), privkey(2)];
        let pks: Vec<_> = sks.iter().map(|sk| crypto::derive_pubkey(sk).unwrap()).collect();
        let message = [0x01u8; 32];
        let mut session = ActiveSigningSession::create([0u8; 32], &pks, sks[0], message, None).unwrap();
        session.generate_nonces().unwrap();

        session.receive_nonce_commit(1, [0x11u8; 32]).unwrap();
        let err = session.receive_nonce_commit(1, [0x22u8; 32]);
        assert!(matches!(err, Err(MusigError::Equivocation(1))));
    }

    #[test]
    fn abort_is_reachable_from_any_non_terminal_phase() {
        let sks = [privkey(1), privkey(2)];
        let pks: Vec<_> = sks.iter().map(|sk| crypto::derive_pubkey(sk).unwrap()).collect();
        let message = [0x01u8; 32];
        let mut session = ActiveSigningSession::create([0u8; 32], &pks, sks[0], message, None).unwrap();
        session.abort().unwrap();
        assert_eq!(session.phase(), SessionPhase::Aborted);
        assert!(session.abort().is_err());
    }
}
