//! Node configuration — parsed from TOML file + environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use musig2_lotus_engine::EngineConfig;
use musig2_lotus_security::SecurityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// General node settings
    #[serde(default)]
    pub node: NodeSection,

    /// Relay / discovery settings
    #[serde(default)]
    pub relays: RelaySection,

    /// Session lifecycle, replay protection, and election/failover —
    /// loaded straight into `musig2_lotus_engine::EngineConfig`.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Size caps, rate limits, and reputation thresholds — loaded
    /// straight into `musig2_lotus_security::SecurityConfig`.
    #[serde(default)]
    pub security: SecurityConfig,

    /// This node's own advertised capabilities and republish cadence.
    #[serde(default)]
    pub advertisement: AdvertisementSection,
}

/// What this node advertises on `lotus/discovery/{txType}`, and how often.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvertisementSection {
    /// Transaction kinds this node is willing to co-sign. Empty means the
    /// node never publishes an advertisement.
    #[serde(default)]
    pub tx_kinds: Vec<String>,

    pub amount_range: Option<musig2_lotus_router::messages::AmountRange>,

    #[serde(default)]
    pub tags: std::collections::BTreeMap<String, String>,

    /// Multiaddresses/URLs advertised alongside the peer id.
    #[serde(default)]
    pub addresses: Vec<String>,

    /// How often to republish, in seconds.
    #[serde(default = "default_advertisement_interval_secs")]
    pub republish_interval_secs: u64,

    /// How long each advertisement is valid for, in seconds from publish time.
    #[serde(default = "default_advertisement_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for AdvertisementSection {
    fn default() -> Self {
        Self {
            tx_kinds: Vec::new(),
            amount_range: None,
            tags: std::collections::BTreeMap::new(),
            addresses: Vec::new(),
            republish_interval_secs: default_advertisement_interval_secs(),
            ttl_secs: default_advertisement_ttl_secs(),
        }
    }
}

fn default_advertisement_interval_secs() -> u64 {
    300
}

fn default_advertisement_ttl_secs() -> u64 {
    900
}

/// General node settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Data directory (cleanup checkpoints, local advertisement cache dump)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Hex-encoded 32-byte signing key for this node's MuSig2 identity and
    /// Nostr transport keypair.
    #[serde(default)]
    pub privkey_hex: String,

    /// Stable identifier this node announces itself as in session rosters.
    #[serde(default = "default_peer_id")]
    pub peer_id: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            privkey_hex: String::new(),
            peer_id: default_peer_id(),
            log_level: default_log_level(),
        }
    }
}

/// Nostr relay settings used by the discovery and direct-message transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_relays")]
    pub urls: Vec<String>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            urls: default_relays(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_peer_id() -> String {
    "unnamed-signer".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_relays() -> Vec<String> {
    vec![
        "wss://relay.damus.io".into(),
        "wss://relay.nostr.band".into(),
        "wss://nos.lol".into(),
    ]
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: NodeConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LOTUS_DATA_DIR`
    /// - `LOTUS_PRIVKEY_HEX`
    /// - `LOTUS_PEER_ID`
    /// - `LOTUS_LOG_LEVEL`
    /// - `LOTUS_RELAYS` (comma-separated)
    /// - plus the `musig2_lotus_engine::EngineConfig` overrides applied to `self.engine`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LOTUS_DATA_DIR") {
            self.node.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("LOTUS_PRIVKEY_HEX") {
            self.node.privkey_hex = v;
        }
        if let Ok(v) = std::env::var("LOTUS_PEER_ID") {
            self.node.peer_id = v;
        }
        if let Ok(v) = std::env::var("LOTUS_LOG_LEVEL") {
            self.node.log_level = v;
        }
        if let Ok(v) = std::env::var("LOTUS_RELAYS") {
            self.relays.urls = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        self.engine.apply_env_overrides();
    }

    /// Parse `node.privkey_hex` into the raw 32-byte signing key.
    pub fn privkey(&self) -> Result<[u8; 32]> {
        let raw = hex::decode(&self.node.privkey_hex).context("node.privkey_hex is not valid hex")?;
        anyhow::ensure!(raw.len() == 32, "node.privkey_hex must decode to 32 bytes");
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw);
        Ok(out)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.node.privkey_hex.is_empty(),
            "node.privkey_hex must not be empty"
        );
        self.privkey().context("node.privkey_hex is invalid")?;

        anyhow::ensure!(
            !self.node.peer_id.is_empty(),
            "node.peer_id must not be empty"
        );

        anyhow::ensure!(
            !self.relays.urls.is_empty(),
            "relays.urls must contain at least one relay"
        );

        self.engine
            .validate()
            .map_err(|e| anyhow::anyhow!("engine config: {e}"))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[node]
privkey_hex = "0101010101010101010101010101010101010101010101010101010101010101"
peer_id = "alice"
"#
    }

    fn full_toml() -> &'static str {
        r#"
[node]
data_dir = "/custom/data"
privkey_hex = "0202020202020202020202020202020202020202020202020202020202020202"
peer_id = "bob"
log_level = "debug"

[relays]
urls = ["wss://relay.damus.io", "wss://nos.lol"]

[engine]
session_timeout_secs = 900
enable_coordinator_election = true
election_method = "hash-based"
enable_coordinator_failover = true

[security]
max_message_size_bytes = 65536
"#
    }

    #[test]
    fn test_parse_minimal_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.node.peer_id, "alice");
        assert_eq!(config.node.log_level, "info"); // default
        assert_eq!(config.engine.session_timeout_secs, 600); // default
        assert!(!config.relays.urls.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", full_toml()).unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();

        assert_eq!(config.node.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.node.peer_id, "bob");
        assert_eq!(config.node.log_level, "debug");
        assert_eq!(config.relays.urls.len(), 2);
        assert_eq!(config.engine.session_timeout_secs, 900);
        assert!(config.engine.enable_coordinator_election);
        assert!(config.engine.enable_coordinator_failover);
        assert_eq!(config.security.max_message_size_bytes, 65536);
    }

    #[test]
    fn test_env_overrides() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();

        let mut config = NodeConfig::from_file(file.path()).unwrap();

        std::env::set_var("LOTUS_DATA_DIR", "/env/data");
        std::env::set_var("LOTUS_PEER_ID", "carol");
        std::env::set_var("LOTUS_SESSION_TIMEOUT_SECS", "45");

        config.apply_env_overrides();

        assert_eq!(config.node.data_dir, PathBuf::from("/env/data"));
        assert_eq!(config.node.peer_id, "carol");
        assert_eq!(config.engine.session_timeout_secs, 45);

        std::env::remove_var("LOTUS_DATA_DIR");
        std::env::remove_var("LOTUS_PEER_ID");
        std::env::remove_var("LOTUS_SESSION_TIMEOUT_SECS");
    }

    #[test]
    fn test_privkey_parsing() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.privkey().unwrap(), [1u8; 32]);
    }

    #[test]
    fn test_validation_ok() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = NodeConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_privkey() {
        let toml = r#"
[node]
peer_id = "alice"
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_failover_without_election() {
        let toml = r#"
[node]
privkey_hex = "0101010101010101010101010101010101010101010101010101010101010101"
peer_id = "alice"

[engine]
enable_coordinator_election = false
enable_coordinator_failover = true
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_advertisement_defaults_to_silent() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = NodeConfig::from_file(file.path()).unwrap();
        assert!(config.advertisement.tx_kinds.is_empty());
        assert_eq!(config.advertisement.republish_interval_secs, 300);
        assert_eq!(config.advertisement.ttl_secs, 900);
    }

    #[test]
    fn test_advertisement_section_parses() {
        let toml = r#"
[node]
privkey_hex = "0101010101010101010101010101010101010101010101010101010101010101"
peer_id = "alice"

[advertisement]
tx_kinds = ["transfer", "escrow-release"]
republish_interval_secs = 120
ttl_secs = 600

[advertisement.amount_range]
min = 1000
max = 500000
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        let config = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.advertisement.tx_kinds, vec!["transfer", "escrow-release"]);
        assert_eq!(config.advertisement.republish_interval_secs, 120);
        assert_eq!(
            config.advertisement.amount_range.unwrap().contains(2000),
            true
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", full_toml()).unwrap();

        let config = NodeConfig::from_file(file.path()).unwrap();
        let serialized = toml::to_string_pretty(&config).unwrap();

        let reparsed: NodeConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed.node.peer_id, config.node.peer_id);
        assert_eq!(
            reparsed.engine.session_timeout_secs,
            config.engine.session_timeout_secs
        );
    }
}
