//! Error taxonomy for the crypto primitives and session state machine.
//!
//! Mirrors the categories a caller needs to distinguish: malformed input vs.
//! a session-lifecycle violation vs. a cryptographic failure. Router,
//! security, and engine crates each carry their own `thiserror` enum and
//! wrap this one via `#[from]` where a lower layer's error surfaces upward.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusigError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("signer index {0} is not a participant in this session")]
    NotAParticipant(usize),

    #[error("operation not valid in phase {current:?}: {attempted}")]
    PhaseViolation {
        current: crate::session::SessionPhase,
        attempted: String,
    },

    #[error("secret nonce for signer {0} was already used")]
    NonceReuse(usize),

    #[error("signer {0} sent conflicting values for the same round — equivocation")]
    Equivocation(usize),

    #[error("partial signature from signer {0} failed verification")]
    InvalidPartialSignature(usize),

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("session {0} timed out")]
    Timeout(String),

    #[error("session {0} aborted")]
    Aborted(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}
