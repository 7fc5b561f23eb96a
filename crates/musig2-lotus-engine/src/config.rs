//! Engine-level coordinator behavior: session lifetimes, replay protection,
//! coordinator election, and failover. Mirrors the teacher's
//! `ServerConfig`-section convention — one struct per concern, each field
//! `#[serde(default = "fn")]`, loaded and validated by the node binary.

use serde::{Deserialize, Serialize};

fn default_session_timeout_secs() -> u64 {
    600
}

fn default_stuck_session_timeout_secs() -> u64 {
    600
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_max_sequence_gap() -> u64 {
    100
}

fn default_election_method() -> ElectionMethod {
    ElectionMethod::LexicographicFirst
}

fn default_broadcast_timeout_secs() -> u64 {
    300
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElectionMethod {
    LexicographicFirst,
    LexicographicLast,
    FirstSigner,
    HashBased,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_stuck_session_timeout_secs")]
    pub stuck_session_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    #[serde(default = "default_true")]
    pub enable_replay_protection: bool,

    #[serde(default = "default_max_sequence_gap")]
    pub max_sequence_gap: u64,

    #[serde(default = "default_false")]
    pub enable_coordinator_election: bool,

    #[serde(default = "default_election_method")]
    pub election_method: ElectionMethod,

    #[serde(default = "default_false")]
    pub enable_coordinator_failover: bool,

    #[serde(default = "default_broadcast_timeout_secs")]
    pub broadcast_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            stuck_session_timeout_secs: default_stuck_session_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            enable_replay_protection: default_true(),
            max_sequence_gap: default_max_sequence_gap(),
            enable_coordinator_election: default_false(),
            election_method: default_election_method(),
            enable_coordinator_failover: default_false(),
            broadcast_timeout_secs: default_broadcast_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOTUS_SESSION_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.session_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LOTUS_STUCK_SESSION_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.stuck_session_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LOTUS_CLEANUP_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.cleanup_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LOTUS_ENABLE_COORDINATOR_ELECTION") {
            if let Ok(b) = v.parse() {
                self.enable_coordinator_election = b;
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.session_timeout_secs == 0 {
            return Err("session_timeout_secs must be greater than zero".into());
        }
        if self.stuck_session_timeout_secs == 0 {
            return Err("stuck_session_timeout_secs must be greater than zero".into());
        }
        if self.cleanup_interval_secs == 0 {
            return Err("cleanup_interval_secs must be greater than zero".into());
        }
        if self.enable_coordinator_failover && !self.enable_coordinator_election {
            return Err("enable_coordinator_failover requires enable_coordinator_election".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = EngineConfig::default();
        assert_eq!(config.session_timeout_secs, 600);
        assert_eq!(config.stuck_session_timeout_secs, 600);
        assert_eq!(config.cleanup_interval_secs, 60);
        assert!(config.enable_replay_protection);
        assert_eq!(config.max_sequence_gap, 100);
        assert!(!config.enable_coordinator_election);
        assert!(!config.enable_coordinator_failover);
        assert_eq!(config.broadcast_timeout_secs, 300);
    }

    #[test]
    fn failover_without_election_is_rejected() {
        let config = EngineConfig {
            enable_coordinator_election: false,
            enable_coordinator_failover: true,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_applies_parsed_value() {
        std::env::set_var("LOTUS_SESSION_TIMEOUT_SECS", "45");
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.session_timeout_secs, 45);
        std::env::remove_var("LOTUS_SESSION_TIMEOUT_SECS");
    }
}
