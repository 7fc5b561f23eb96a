//! # musig2-lotus-router
//!
//! Message types for the Lotus MuSig2 peer-to-peer protocol, their
//! canonical byte encodings (for self-signatures), and the static
//! message-kind -> (channel, authority, delivery) routing table that the
//! coordinator/peer engine and security manager both consult before
//! acting on an inbound message.

pub mod canonical;
pub mod error;
pub mod messages;
pub mod routing;

pub use error::RouterError;
pub use messages::{discovery_topic, LotusMessage};
pub use routing::{authority_of, check_authority, check_channel, is_broadcast, is_direct, Authority, Channel, Delivery, MessageKind};
