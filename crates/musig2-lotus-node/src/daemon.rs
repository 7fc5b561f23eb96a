//! The daemon loop — dispatches inbound protocol messages to the
//! coordinator/peer engine and periodically sweeps expired/stuck sessions.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use musig2_lotus_core::crypto::derive_pubkey;
use musig2_lotus_core::crypto::PubkeyBytes;
use musig2_lotus_discovery::DiscoveryClient;
use musig2_lotus_engine::signing::sign_canonical;
use musig2_lotus_engine::CoordinatorEngine;
use musig2_lotus_router::canonical::advertisement_canonical_bytes;
use musig2_lotus_router::messages::{CapabilityCriteria, LotusMessage, SignerAdvertisement};
use musig2_lotus_security::SecurityManager;
use nostr_sdk::prelude::*;
use sha2::{Digest, Sha256};

use crate::config::{AdvertisementSection, NodeConfig};
use crate::transport::NostrTransport;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Run the daemon: connect to relays, build the engine, and drive the
/// inbound-dispatch and cleanup tasks until cancelled.
pub async fn run(config: NodeConfig) -> Result<()> {
    log::info!("musig2-lotus-node starting…");
    log::info!("  Peer id:  {}", config.node.peer_id);
    log::info!("  Relays:   {}", config.relays.urls.join(", "));
    log::info!(
        "  Election: {} (method {:?})",
        config.engine.enable_coordinator_election,
        config.engine.election_method
    );
    log::info!("  Failover: {}", config.engine.enable_coordinator_failover);

    std::fs::create_dir_all(&config.node.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.node.data_dir.display()
        )
    })?;

    let privkey = config.privkey().context("invalid node.privkey_hex")?;
    let secret_key = SecretKey::from_slice(&privkey).context("invalid node signing key")?;
    let keys = Keys::new(secret_key);

    let transport = NostrTransport::connect(keys.clone(), &config.relays.urls)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect transport: {e}"))?;
    let listener = transport.clone();

    let security = SecurityManager::new(config.security.clone());
    let engine = Arc::new(
        CoordinatorEngine::new(
            config.node.peer_id.clone(),
            privkey,
            config.engine.clone(),
            security,
            transport,
        )
        .map_err(|e| anyhow::anyhow!("failed to build engine: {e}"))?,
    );

    let dispatch = tokio::spawn(run_dispatch_loop(engine.clone(), listener.clone()));
    let cleanup = tokio::spawn(run_cleanup_loop(engine.clone(), config.engine.cleanup_interval_secs));

    if config.advertisement.tx_kinds.is_empty() {
        log::info!("advertisement.tx_kinds is empty; this node will not publish advertisements");
        tokio::select! {
            result = dispatch => { result.context("dispatch task panicked")?; }
            result = cleanup => { result.context("cleanup task panicked")?; }
        }
    } else {
        let discovery = DiscoveryClient::connect(keys.clone(), &config.relays.urls)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect discovery client: {e}"))?;
        let advertise = tokio::spawn(run_advertisement_loop(
            discovery,
            config.node.peer_id.clone(),
            privkey,
            config.advertisement.clone(),
        ));

        tokio::select! {
            result = dispatch => { result.context("dispatch task panicked")?; }
            result = cleanup => { result.context("cleanup task panicked")?; }
            result = advertise => { result.context("advertisement task panicked")?; }
        }
    }

    listener.disconnect().await;
    Ok(())
}

/// Publishes a fresh, self-signed `SignerAdvertisement` on a fixed cadence,
/// the way the spec's discovery section expects a signer to keep its
/// capability listing alive on `lotus/discovery/{txType}`.
async fn run_advertisement_loop(
    discovery: DiscoveryClient,
    peer_id: String,
    privkey: [u8; 32],
    config: AdvertisementSection,
) -> Result<()> {
    let pubkey: PubkeyBytes = derive_pubkey(&privkey)
        .map_err(|e| anyhow::anyhow!("failed to derive pubkey for advertisement: {e}"))?;

    let mut interval = tokio::time::interval(Duration::from_secs(config.republish_interval_secs.max(1)));
    loop {
        interval.tick().await;
        let now = now_unix();

        let mut unsigned = SignerAdvertisement {
            advertisement_id: advertisement_id(&peer_id, now),
            peer_id: peer_id.clone(),
            addresses: config.addresses.clone(),
            pubkey,
            criteria: CapabilityCriteria {
                tx_kinds: config.tx_kinds.clone(),
                amount_range: config.amount_range,
                min_reputation: None,
                tags: config.tags.clone(),
            },
            metadata: None,
            created_at: now,
            expires_at: now + config.ttl_secs,
            signature: [0u8; 64],
        };

        let signature = match sign_canonical(&privkey, &advertisement_canonical_bytes(&unsigned)) {
            Ok(sig) => sig,
            Err(e) => {
                log::error!("failed to sign advertisement: {e}");
                continue;
            }
        };
        unsigned.signature = signature;

        match discovery.publish_advertisement(unsigned).await {
            Ok(id) => log::debug!("published advertisement {id}"),
            Err(e) => log::warn!("failed to publish advertisement: {e}"),
        }
    }
}

fn advertisement_id(peer_id: &str, now: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(peer_id.as_bytes());
    hasher.update(now.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Consumes relay notifications, decodes the envelope, and routes it to the
/// matching `CoordinatorEngine` handler. Messages the engine doesn't need to
/// act on (acks, completion notices, advertisements the discovery crate owns)
/// are logged at `debug!` and dropped.
async fn run_dispatch_loop(
    engine: Arc<CoordinatorEngine<NostrTransport>>,
    transport: NostrTransport,
) -> Result<()> {
    let mut notifications = transport.notifications().await;
    while let Ok(notification) = notifications.recv().await {
        let RelayPoolNotification::Event { event, .. } = notification else {
            continue;
        };

        let message = match LotusMessage::decode(event.content.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("discarding malformed envelope from {}: {e}", event.pubkey);
                continue;
            }
        };

        let peer_id = transport
            .decode_sender(&event.pubkey)
            .unwrap_or_else(|| event.pubkey.to_string());
        let now = now_unix();

        let result = match message {
            LotusMessage::SigningRequest(req) => engine.handle_signing_request(req, now).await,
            LotusMessage::ParticipantJoined(pj) => engine.handle_participant_joined(pj, now).await,
            LotusMessage::SessionReady(ready) => engine.handle_session_ready(ready, &peer_id, now).await,
            LotusMessage::NonceCommit(msg) => engine.handle_nonce_commit(msg, &peer_id, now).await,
            LotusMessage::NonceShare(msg) => engine.handle_nonce_share(msg, &peer_id, now).await,
            LotusMessage::PartialSigShare(msg) => engine.handle_partial_sig_share(msg, &peer_id, now).await,
            other => {
                log::debug!("not dispatched by the engine: {other:?}");
                continue;
            }
        };

        if let Err(e) = result {
            log::warn!("rejected message from {peer_id}: {e}");
        }
    }
    Ok(())
}

/// Periodic sweep: expire stuck/timed-out sessions and roll failover forward
/// for sessions whose coordinator has gone quiet.
async fn run_cleanup_loop(
    engine: Arc<CoordinatorEngine<NostrTransport>>,
    interval_secs: u64,
) -> Result<()> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        let now = now_unix();
        let (expired, stuck) = engine.cleanup(now).await;
        if expired > 0 || stuck > 0 {
            log::info!("cleanup sweep: {expired} expired, {stuck} stuck sessions purged");
        } else {
            log::debug!("cleanup sweep: nothing to purge");
        }
    }
}

/// Run a single cleanup sweep and report counts — used by `--check`/`--once`.
pub async fn run_check_cycle(config: &NodeConfig) -> Result<()> {
    log::info!("Running a single cleanup sweep…");

    let privkey = config.privkey().context("invalid node.privkey_hex")?;
    let secret_key = SecretKey::from_slice(&privkey).context("invalid node signing key")?;
    let keys = Keys::new(secret_key);

    let transport = NostrTransport::connect(keys, &config.relays.urls)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect transport: {e}"))?;

    let security = SecurityManager::new(config.security.clone());
    let engine = CoordinatorEngine::new(
        config.node.peer_id.clone(),
        privkey,
        config.engine.clone(),
        security,
        transport,
    )
    .map_err(|e| anyhow::anyhow!("failed to build engine: {e}"))?;

    let (expired, stuck) = engine.cleanup(now_unix()).await;
    log::info!("cleanup sweep complete: {expired} expired, {stuck} stuck sessions purged");
    Ok(())
}
