//! In-memory stand-in for the "persistent index (e.g. a DHT)" the spec
//! mentions as an example lookup backend. `find_signers` merges this cache
//! with a one-shot relay query; swapping in a real DHT client means
//! implementing the same read side behind [`crate::lookup::AdvertisementSource`]
//! and leaving this cache as the write-through layer fed by inbound
//! broadcast handlers.

use std::collections::HashMap;

use musig2_lotus_router::messages::SignerAdvertisement;

#[derive(Default)]
pub struct LocalAdvertisementCache {
    by_id: HashMap<String, SignerAdvertisement>,
}

impl LocalAdvertisementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ad: SignerAdvertisement) {
        self.by_id.insert(ad.advertisement_id.clone(), ad);
    }

    pub fn remove(&mut self, advertisement_id: &str) {
        self.by_id.remove(advertisement_id);
    }

    pub fn all(&self) -> impl Iterator<Item = &SignerAdvertisement> {
        self.by_id.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Drops every advertisement whose `expires_at` has passed.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.by_id.len();
        self.by_id.retain(|_, ad| !ad.is_expired(now));
        before - self.by_id.len()
    }
}
