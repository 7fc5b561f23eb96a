//! Security limits, collected the way the teacher collects its
//! `ServerConfig` sections — one struct, all fields defaulted, loaded as
//! part of the node's larger TOML config.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,

    #[serde(default = "default_timestamp_skew")]
    pub timestamp_skew_secs: u64,

    #[serde(default = "default_ad_min_interval")]
    pub advertisement_min_interval_secs: u64,

    #[serde(default = "default_ad_max_per_tx_kind")]
    pub advertisement_max_per_tx_kind: u32,

    #[serde(default = "default_request_window")]
    pub signing_request_window_secs: u64,

    #[serde(default = "default_max_requests_per_window")]
    pub max_signing_requests_per_window: u32,

    #[serde(default = "default_max_sequence_gap")]
    pub max_sequence_gap: u64,

    #[serde(default = "default_starting_reputation")]
    pub starting_reputation: i64,

    #[serde(default = "default_graylist_threshold")]
    pub graylist_threshold: i64,

    #[serde(default = "default_blacklist_threshold")]
    pub blacklist_threshold: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_message_size_bytes: default_max_message_size(),
            timestamp_skew_secs: default_timestamp_skew(),
            advertisement_min_interval_secs: default_ad_min_interval(),
            advertisement_max_per_tx_kind: default_ad_max_per_tx_kind(),
            signing_request_window_secs: default_request_window(),
            max_signing_requests_per_window: default_max_requests_per_window(),
            max_sequence_gap: default_max_sequence_gap(),
            starting_reputation: default_starting_reputation(),
            graylist_threshold: default_graylist_threshold(),
            blacklist_threshold: default_blacklist_threshold(),
        }
    }
}

fn default_max_message_size() -> usize {
    100 * 1024
}
fn default_timestamp_skew() -> u64 {
    5 * 60
}
fn default_ad_min_interval() -> u64 {
    60
}
fn default_ad_max_per_tx_kind() -> u32 {
    20
}
fn default_request_window() -> u64 {
    60
}
fn default_max_requests_per_window() -> u32 {
    10
}
fn default_max_sequence_gap() -> u64 {
    100
}
fn default_starting_reputation() -> i64 {
    100
}
fn default_graylist_threshold() -> i64 {
    50
}
fn default_blacklist_threshold() -> i64 {
    0
}
