//! Wire message types for the Lotus MuSig2 protocol.
//!
//! Every message is carried inside the [`LotusMessage`] envelope, tagged by
//! `"kind"` the same way the teacher's `CcdMessage` is tagged by
//! `"ccd_type"` — a closed, self-describing variant set rather than
//! open-world polymorphism (see the design notes on dynamic dispatch).

use musig2_lotus_core::crypto::{PubkeyBytes, PublicNoncePair};
use serde::{Deserialize, Serialize};

/// A signer's capability criteria, as advertised or as a lookup filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityCriteria {
    /// Transaction kinds this signer is willing to co-sign (e.g. "transfer").
    pub tx_kinds: Vec<String>,
    pub amount_range: Option<AmountRange>,
    pub min_reputation: Option<i64>,
    /// Exact-match custom tags, e.g. `{"network": "mainnet"}`.
    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: u64,
    pub max: u64,
}

impl AmountRange {
    pub fn contains(&self, amount: u64) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// A signer's signed self-description, published to `lotus/discovery/{txType}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignerAdvertisement {
    pub advertisement_id: String,
    pub peer_id: String,
    pub addresses: Vec<String>,
    pub pubkey: PubkeyBytes,
    pub criteria: CapabilityCriteria,
    pub metadata: Option<serde_json::Value>,
    pub created_at: u64,
    pub expires_at: u64,
    pub signature: [u8; 64],
}

impl SignerAdvertisement {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Withdrawal of a previously published advertisement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignerUnavailable {
    pub advertisement_id: String,
    pub peer_id: String,
}

/// A creator's signed broadcast asking `required_pubkeys` to jointly sign
/// `message`. Invariant: `creator_pubkey` is one of `required_pubkeys`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningRequest {
    pub request_id: String,
    pub required_pubkeys: Vec<PubkeyBytes>,
    pub message: [u8; 32],
    pub creator_peer_id: String,
    pub creator_pubkey: PubkeyBytes,
    pub metadata: Option<serde_json::Value>,
    pub created_at: u64,
    pub expires_at: u64,
    pub signature: [u8; 64],
}

impl SigningRequest {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    pub fn creator_is_participant(&self) -> bool {
        self.required_pubkeys.contains(&self.creator_pubkey)
    }
}

/// A recipient's signed reply announcing it will fill one of the required
/// signer slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantJoined {
    pub request_id: String,
    pub index: u8,
    pub peer_id: String,
    pub pubkey: PubkeyBytes,
    pub timestamp: u64,
    pub signature: [u8; 64],
}

/// Explicit request to join a session whose roster is still open.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionJoin {
    pub request_id: String,
    pub peer_id: String,
    pub pubkey: PubkeyBytes,
}

/// Coordinator's announcement that every required index has joined.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionReady {
    pub session_id: String,
    pub roster: Vec<(u8, String)>,
    pub coordinator_peer_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceCommit {
    pub session_id: String,
    pub signer_index: u8,
    pub sequence: u64,
    pub commitment: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceShare {
    pub session_id: String,
    pub signer_index: u8,
    pub sequence: u64,
    pub public_nonce: PublicNoncePair,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NonceAck {
    pub session_id: String,
    pub signer_index: u8,
    pub sequence: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoncesComplete {
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartialSigShare {
    pub session_id: String,
    pub signer_index: u8,
    pub sequence: u64,
    /// 32-byte big-endian scalar encoding of the partial signature.
    pub partial_sig: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartialSigAck {
    pub session_id: String,
    pub signer_index: u8,
    pub sequence: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartialSigsComplete {
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureFinalized {
    pub session_id: String,
    /// 64-byte `R.x || s`, optionally followed by one sighash byte.
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionAbort {
    pub session_id: String,
    pub reason: String,
    pub offending_index: Option<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationError {
    pub session_id: Option<String>,
    pub detail: String,
}

/// Unified protocol envelope. All inbound bytes are framed length-prefixed
/// and carry one of these tagged variants; the router's
/// [`crate::routing::ROUTING_TABLE`] is keyed by the discriminant below.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LotusMessage {
    SignerAdvertisement(SignerAdvertisement),
    SignerUnavailable(SignerUnavailable),
    SigningRequest(SigningRequest),
    ParticipantJoined(ParticipantJoined),
    SessionJoin(SessionJoin),
    SessionReady(SessionReady),
    NonceCommit(NonceCommit),
    NonceShare(NonceShare),
    NonceAck(NonceAck),
    NoncesComplete(NoncesComplete),
    PartialSigShare(PartialSigShare),
    PartialSigAck(PartialSigAck),
    PartialSigsComplete(PartialSigsComplete),
    SignatureFinalized(SignatureFinalized),
    SessionAbort(SessionAbort),
    ValidationError(ValidationError),
}

impl LotusMessage {
    pub fn kind(&self) -> crate::routing::MessageKind {
        use crate::routing::MessageKind as K;
        match self {
            LotusMessage::SignerAdvertisement(_) => K::SignerAdvertisement,
            LotusMessage::SignerUnavailable(_) => K::SignerUnavailable,
            LotusMessage::SigningRequest(_) => K::SigningRequest,
            LotusMessage::ParticipantJoined(_) => K::ParticipantJoined,
            LotusMessage::SessionJoin(_) => K::SessionJoin,
            LotusMessage::SessionReady(_) => K::SessionReady,
            LotusMessage::NonceCommit(_) => K::NonceCommit,
            LotusMessage::NonceShare(_) => K::NonceShare,
            LotusMessage::NonceAck(_) => K::NonceAck,
            LotusMessage::NoncesComplete(_) => K::NoncesComplete,
            LotusMessage::PartialSigShare(_) => K::PartialSigShare,
            LotusMessage::PartialSigAck(_) => K::PartialSigAck,
            LotusMessage::PartialSigsComplete(_) => K::PartialSigsComplete,
            LotusMessage::SignatureFinalized(_) => K::SignatureFinalized,
            LotusMessage::SessionAbort(_) => K::SessionAbort,
            LotusMessage::ValidationError(_) => K::ValidationError,
        }
    }

    /// The protocol identifier carried in the outer length-prefixed frame
    /// for direct streams.
    pub const PROTOCOL_ID: &'static str = "/lotus/musig2/1.0.0";

    pub fn encode(&self) -> Result<Vec<u8>, crate::error::RouterError> {
        serde_json::to_vec(self).map_err(|e| crate::error::RouterError::Malformed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::RouterError> {
        serde_json::from_slice(bytes).map_err(|e| crate::error::RouterError::Malformed(e.to_string()))
    }
}

pub fn discovery_topic(tx_kind: &str) -> String {
    format!("lotus/discovery/{tx_kind}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_json() {
        let msg = LotusMessage::SessionAbort(SessionAbort {
            session_id: "abc123".into(),
            reason: "Equivocation".into(),
            offending_index: Some(2),
        });
        let bytes = msg.encode().unwrap();
        let decoded = LotusMessage::decode(&bytes).unwrap();
        assert_eq!(decoded.kind(), msg.kind());
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(LotusMessage::decode(b"not json").is_err());
    }

    #[test]
    fn discovery_topic_is_namespaced_by_tx_kind() {
        assert_eq!(discovery_topic("transfer"), "lotus/discovery/transfer");
    }
}
