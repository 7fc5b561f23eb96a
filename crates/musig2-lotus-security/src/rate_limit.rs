//! Per-peer rate limiting: minimum inter-advertisement interval, a cap on
//! advertisements per (peer, tx kind), and a sliding window cap on signing
//! requests per peer. All checks take `now` as an explicit unix-seconds
//! timestamp rather than reading the clock internally, so tests are
//! deterministic and the caller (engine/discovery) controls time.

use std::collections::HashMap;

use crate::config::SecurityConfig;

#[derive(Default)]
struct PeerAdState {
    last_published_at: HashMap<String, u64>,
    counts_by_tx_kind: HashMap<String, u32>,
}

#[derive(Default)]
struct PeerRequestState {
    /// Timestamps of signing requests within the current window.
    recent: Vec<u64>,
}

pub struct RateLimiter {
    ad_state: HashMap<String, PeerAdState>,
    request_state: HashMap<String, PeerRequestState>,
    min_interval_secs: u64,
    max_per_tx_kind: u32,
    window_secs: u64,
    max_per_window: u32,
}

impl RateLimiter {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            ad_state: HashMap::new(),
            request_state: HashMap::new(),
            min_interval_secs: config.advertisement_min_interval_secs,
            max_per_tx_kind: config.advertisement_max_per_tx_kind,
            window_secs: config.signing_request_window_secs,
            max_per_window: config.max_signing_requests_per_window,
        }
    }

    /// Call when peer `peer_id` publishes an advertisement for `tx_kind`
    /// at `now`. Returns `false` if the publish violates the minimum
    /// interval or the per-tx-kind cap (the caller should reject and
    /// penalize in that case); otherwise records the publish and returns
    /// `true`.
    pub fn allow_advertisement(&mut self, peer_id: &str, tx_kind: &str, now: u64) -> bool {
        let state = self.ad_state.entry(peer_id.to_string()).or_default();
        if let Some(&last) = state.last_published_at.get(tx_kind) {
            if now.saturating_sub(last) < self.min_interval_secs {
                return false;
            }
        }
        let count = state.counts_by_tx_kind.entry(tx_kind.to_string()).or_insert(0);
        if *count >= self.max_per_tx_kind {
            return false;
        }
        *count += 1;
        state.last_published_at.insert(tx_kind.to_string(), now);
        true
    }

    /// Call when peer `peer_id` broadcasts a signing request at `now`.
    /// Applies a sliding window: entries older than `window_secs` are
    /// dropped before counting.
    pub fn allow_signing_request(&mut self, peer_id: &str, now: u64) -> bool {
        let state = self.request_state.entry(peer_id.to_string()).or_default();
        state.recent.retain(|&t| now.saturating_sub(t) <= self.window_secs);
        if state.recent.len() as u32 >= self.max_per_window {
            return false;
        }
        state.recent.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertisement_interval_is_enforced() {
        let mut limiter = RateLimiter::new(&SecurityConfig::default());
        assert!(limiter.allow_advertisement("peerA", "transfer", 1000));
        assert!(!limiter.allow_advertisement("peerA", "transfer", 1010));
        assert!(limiter.allow_advertisement("peerA", "transfer", 1061));
    }

    #[test]
    fn advertisement_per_tx_kind_cap_is_enforced() {
        let mut config = SecurityConfig::default();
        config.advertisement_min_interval_secs = 0;
        config.advertisement_max_per_tx_kind = 2;
        let mut limiter = RateLimiter::new(&config);
        assert!(limiter.allow_advertisement("peerA", "transfer", 1));
        assert!(limiter.allow_advertisement("peerA", "transfer", 2));
        assert!(!limiter.allow_advertisement("peerA", "transfer", 3));
        // A different tx kind has its own independent counter.
        assert!(limiter.allow_advertisement("peerA", "mint", 3));
    }

    #[test]
    fn signing_request_sliding_window_resets() {
        let mut config = SecurityConfig::default();
        config.signing_request_window_secs = 60;
        config.max_signing_requests_per_window = 2;
        let mut limiter = RateLimiter::new(&config);
        assert!(limiter.allow_signing_request("peerA", 0));
        assert!(limiter.allow_signing_request("peerA", 10));
        assert!(!limiter.allow_signing_request("peerA", 20));
        assert!(limiter.allow_signing_request("peerA", 100));
    }
}
