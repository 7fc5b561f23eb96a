//! Merges the local cache with a one-shot relay query to answer
//! `find_signers`, and layers dedup-by-id subscription semantics over a
//! live relay stream.

use std::collections::HashSet;

use musig2_lotus_router::messages::SignerAdvertisement;
use musig2_lotus_security::reputation::ReputationStore;

use crate::cache::LocalAdvertisementCache;
use crate::criteria::{matches, LookupCriteria};

/// Anything that can answer "give me the advertisements you currently know
/// about for this topic" — the relay client implements this against
/// `nostr-sdk`; tests use an in-memory stub. Keeping the trait narrow means
/// swapping in a DHT-backed source later only touches this boundary.
#[async_trait::async_trait]
pub trait AdvertisementSource: Send + Sync {
    async fn query(&self, tx_kind: &str) -> Result<Vec<SignerAdvertisement>, crate::error::DiscoveryError>;
}

/// Merges `cache` with a one-shot `source.query()`, filters by `criteria`
/// and `reputation`, sorts by reputation descending (cache-resident entries
/// win ties since they're already known-reachable), and truncates to
/// `criteria.max_results`.
pub async fn find_signers(
    cache: &LocalAdvertisementCache,
    source: &dyn AdvertisementSource,
    reputation: &ReputationStore,
    tx_kind: &str,
    criteria: &LookupCriteria,
    now: u64,
) -> Result<Vec<SignerAdvertisement>, crate::error::DiscoveryError> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for ad in cache.all() {
        if ad.is_expired(now) || ad.criteria.tx_kinds.iter().all(|k| k != tx_kind) {
            continue;
        }
        seen.insert(ad.advertisement_id.clone());
        candidates.push((true, ad.clone()));
    }

    for ad in source.query(tx_kind).await? {
        if ad.is_expired(now) || !seen.contains(&ad.advertisement_id) {
            if !ad.is_expired(now) {
                seen.insert(ad.advertisement_id.clone());
                candidates.push((false, ad));
            }
        }
    }

    candidates.retain(|(_, ad)| {
        let rep = reputation.score(&ad.peer_id);
        matches(ad, criteria, rep)
    });

    candidates.sort_by(|(a_cached, a_ad), (b_cached, b_ad)| {
        let rep_a = reputation.score(&a_ad.peer_id);
        let rep_b = reputation.score(&b_ad.peer_id);
        rep_b
            .cmp(&rep_a)
            .then(b_cached.cmp(a_cached))
    });

    candidates.truncate(criteria.max_results);
    Ok(candidates.into_iter().map(|(_, ad)| ad).collect())
}

/// Deduplicating subscription sink: callers feed every inbound
/// `SignerAdvertisement` through `observe`, which returns `true` only the
/// first time a given advertisement id is seen. Optionally primed with
/// `find_signers` results so a late subscriber doesn't re-announce
/// advertisements it already received via the one-shot query.
pub struct Subscription {
    seen: HashSet<String>,
}

impl Subscription {
    pub fn new() -> Self {
        Self { seen: HashSet::new() }
    }

    /// Primes the dedup set with advertisements already delivered by
    /// `find_signers` when `fetch_existing` is requested by the caller.
    pub fn prime(&mut self, existing: &[SignerAdvertisement]) {
        for ad in existing {
            self.seen.insert(ad.advertisement_id.clone());
        }
    }

    /// Returns `true` if this is the first time `ad` has been observed.
    pub fn observe(&mut self, ad: &SignerAdvertisement) -> bool {
        self.seen.insert(ad.advertisement_id.clone())
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}
