//! # musig2-lotus-engine
//!
//! The coordinator/peer engine: session table, inbound-message dispatch for
//! the full happy-path protocol flow, coordinator election/failover, and
//! the periodic cleanup sweep. Transport-agnostic — callers supply a
//! `Transport` implementation (Nostr-relay-backed in the node binary,
//! in-memory for tests).

pub mod config;
pub mod election;
pub mod engine;
pub mod error;
pub mod signing;
pub mod transport;

pub use config::EngineConfig;
pub use engine::CoordinatorEngine;
pub use error::EngineError;
pub use transport::Transport;
