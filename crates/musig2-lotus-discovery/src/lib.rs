//! # musig2-lotus-discovery
//!
//! Signer advertisement publication, filtered lookup, and real-time
//! subscription over Nostr relays, per the `lotus/discovery/{txType}`
//! topic convention.

pub mod cache;
pub mod client;
pub mod criteria;
pub mod error;
pub mod lookup;

pub use cache::LocalAdvertisementCache;
pub use client::DiscoveryClient;
pub use criteria::{matches, GeoFilter, GeoPoint, LookupCriteria};
pub use error::DiscoveryError;
pub use lookup::{find_signers, AdvertisementSource, Subscription};
