//! # musig2-lotus-security
//!
//! Defenses applied to every inbound Lotus MuSig2 message before the
//! router/engine interprets it: size cap, timestamp skew, expiry,
//! self-signature verification, per-peer rate limiting, sequence-number
//! replay detection, and reputation tracking with graylist/blacklist
//! thresholds.

pub mod config;
pub mod error;
pub mod manager;
pub mod rate_limit;
pub mod replay;
pub mod reputation;

pub use config::SecurityConfig;
pub use error::SecurityError;
pub use manager::SecurityManager;
pub use reputation::{ReputationStatus, Violation};
