//! # musig2-lotus-core
//!
//! Crypto primitives and per-party session state machine for Lotus MuSig2
//! multi-party signing: secp256k1 Schnorr aggregation with the Lotus
//! challenge encoding, key aggregation with rogue-key-resistant
//! coefficients, two-round nonce commit/reveal, and the Taproot tweak
//! variant. Everything above this crate (the router, security manager,
//! discovery, and coordinator/peer engine) builds on top of
//! [`crypto`] and [`session`].

pub mod crypto;
pub mod error;
pub mod field;
pub mod session;

pub use crypto::{KeyAggContext, PubkeyBytes, PublicNoncePair, SecretNoncePair};
pub use error::MusigError;
pub use session::{ActiveSigningSession, SessionPhase};
