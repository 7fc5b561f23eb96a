//! Per-peer reputation store. Invalid signatures, malformed payloads, and
//! equivocation each decrement a peer's score; peers below the blacklist
//! threshold are silently dropped, peers between the two thresholds are
//! graylisted (accepted but deprioritized by the engine/discovery layer).

use std::collections::HashMap;

use crate::config::SecurityConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReputationStatus {
    Trusted,
    Graylisted,
    Blacklisted,
}

/// Violation categories that decrement reputation, each with its own
/// penalty weight — equivocation and invalid signatures are worse than a
/// rate-limit brush since they indicate active misbehavior rather than a
/// misconfigured but honest peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    InvalidSignature,
    MalformedPayload,
    Equivocation,
    ReplayGap,
    RateLimitExceeded,
}

impl Violation {
    fn penalty(self) -> i64 {
        match self {
            Violation::InvalidSignature => 20,
            Violation::MalformedPayload => 10,
            Violation::Equivocation => 40,
            Violation::ReplayGap => 15,
            Violation::RateLimitExceeded => 5,
        }
    }
}

pub struct ReputationStore {
    scores: HashMap<String, i64>,
    starting: i64,
    graylist_threshold: i64,
    blacklist_threshold: i64,
}

impl ReputationStore {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            scores: HashMap::new(),
            starting: config.starting_reputation,
            graylist_threshold: config.graylist_threshold,
            blacklist_threshold: config.blacklist_threshold,
        }
    }

    pub fn score(&self, peer_id: &str) -> i64 {
        *self.scores.get(peer_id).unwrap_or(&self.starting)
    }

    pub fn status(&self, peer_id: &str) -> ReputationStatus {
        let score = self.score(peer_id);
        if score <= self.blacklist_threshold {
            ReputationStatus::Blacklisted
        } else if score <= self.graylist_threshold {
            ReputationStatus::Graylisted
        } else {
            ReputationStatus::Trusted
        }
    }

    pub fn penalize(&mut self, peer_id: &str, violation: Violation) -> i64 {
        let entry = self.scores.entry(peer_id.to_string()).or_insert(self.starting);
        *entry -= violation.penalty();
        log::warn!("peer {peer_id} penalized for {violation:?}, new score {entry}");
        *entry
    }

    pub fn is_banned(&self, peer_id: &str) -> bool {
        self.status(peer_id) == ReputationStatus::Blacklisted
    }
}
