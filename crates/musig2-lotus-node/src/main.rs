//! musig2-lotus-node — headless daemon for a Lotus MuSig2 coordinator/peer.
//!
//! Wires the crypto core, router, security manager, discovery, and engine
//! crates behind a Nostr-relay transport. Designed for Docker / server
//! deployment.
//!
//! # Usage
//!
//! ```bash
//! musig2-lotus-node --config /path/to/node.toml
//! musig2-lotus-node --check   # Run one cleanup sweep and exit
//! musig2-lotus-node --validate # Validate config and exit
//! ```

mod config;
mod daemon;
mod transport;

use anyhow::{Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    // Initialize rustls CryptoProvider before any Nostr/TLS operations.
    // Without this, WebSocket connections via nostr-sdk will panic.
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    // Parse CLI args (minimal — no clap dependency needed)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("/config/node.toml");
    let mut one_shot = false;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("musig2-lotus-node {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // Load config
    let mut node_config = config::NodeConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Apply env overrides
    node_config.apply_env_overrides();

    // Validate
    node_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    std::env::set_var("RUST_LOG", &node_config.node.log_level);
    env_logger::init();

    if validate_only {
        println!("Configuration is valid.");
        println!("  Peer id:             {}", node_config.node.peer_id);
        println!("  Relays:              {}", node_config.relays.urls.join(", "));
        println!(
            "  Session timeout:     {} secs",
            node_config.engine.session_timeout_secs
        );
        println!(
            "  Cleanup interval:    {} secs",
            node_config.engine.cleanup_interval_secs
        );
        println!(
            "  Coordinator election: {}",
            node_config.engine.enable_coordinator_election
        );
        println!(
            "  Coordinator failover: {}",
            node_config.engine.enable_coordinator_failover
        );
        println!(
            "  Replay protection:   {}",
            node_config.engine.enable_replay_protection
        );
        return Ok(());
    }

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if one_shot {
        log::info!("Running single cleanup sweep…");
        rt.block_on(daemon::run_check_cycle(&node_config))?;
        log::info!("Done.");
    } else {
        // Install Ctrl-C handler for graceful shutdown
        let shutdown = rt.block_on(async {
            tokio::select! {
                result = daemon::run(node_config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal. Exiting…");
                    Ok(())
                }
            }
        });

        if let Err(e) = shutdown {
            log::error!("Node error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"musig2-lotus-node — headless MuSig2 coordinator/peer daemon

USAGE:
    musig2-lotus-node [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: /config/node.toml)
    --check, --once       Run a single cleanup sweep and exit
    --validate            Validate config file and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    LOTUS_DATA_DIR                  Data directory path
    LOTUS_PRIVKEY_HEX               Hex-encoded 32-byte signing key
    LOTUS_PEER_ID                   This node's peer id
    LOTUS_LOG_LEVEL                 Log level (error/warn/info/debug/trace)
    LOTUS_RELAYS                    Comma-separated relay URLs
    LOTUS_SESSION_TIMEOUT_SECS      Session timeout in seconds
    LOTUS_STUCK_SESSION_TIMEOUT_SECS Stuck-session timeout in seconds
    LOTUS_CLEANUP_INTERVAL_SECS     Cleanup sweep interval in seconds
    LOTUS_ENABLE_COORDINATOR_ELECTION Enable coordinator election (true/false)

EXAMPLES:
    # Run as daemon with config file
    musig2-lotus-node --config /path/to/node.toml

    # Single cleanup sweep (useful for cron jobs)
    musig2-lotus-node --config node.toml --check

    # Validate configuration
    musig2-lotus-node --config node.toml --validate
"#
    );
}
