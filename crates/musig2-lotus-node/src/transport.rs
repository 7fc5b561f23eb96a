//! Nostr-relay-backed [`Transport`] implementation: direct messages go out
//! as NIP-44-encrypted DMs to a peer's Nostr pubkey, broadcasts go out as
//! custom-kind events tagged with the topic, exactly the way
//! `musig2-lotus-discovery`'s `DiscoveryClient` publishes advertisements.
//! Peer-id -> Nostr pubkey resolution is the roster the engine already
//! carries — this transport is handed peer pubkeys as they join.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nostr_sdk::prelude::*;

use musig2_lotus_engine::Transport;
use musig2_lotus_router::messages::LotusMessage;

/// Same custom kind the discovery crate reserves for Lotus traffic — direct
/// messages and broadcasts share one relay-side event kind, disambiguated by
/// the `p`-tag (direct) vs `t`-tag (broadcast) convention.
const LOTUS_KIND: Kind = Kind::Custom(30079);

/// Cheaply cloneable: `Client` wraps its relay pool in an `Arc` internally,
/// and the peer registry is shared so a listener clone sees every peer the
/// engine-owned half registers.
#[derive(Clone)]
pub struct NostrTransport {
    keys: Keys,
    client: Client,
    /// peer_id -> Nostr pubkey, populated as the engine learns roster members.
    peers: Arc<Mutex<HashMap<String, PublicKey>>>,
}

impl NostrTransport {
    pub async fn connect(keys: Keys, relay_urls: &[String]) -> Result<Self, String> {
        let client = Client::new(keys.clone());
        for url in relay_urls {
            client
                .add_relay(url.as_str())
                .await
                .map_err(|e| format!("failed to add relay {url}: {e}"))?;
        }
        client.connect().await;
        Ok(Self {
            keys,
            client,
            peers: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Registers (or updates) the Nostr pubkey a peer id resolves to. The
    /// node learns these out of band — from a `SignerAdvertisement`'s
    /// `pubkey` field, or from roster membership in a `SigningRequest`.
    pub fn register_peer(&self, peer_id: &str, pubkey: PublicKey) {
        self.peers.lock().unwrap().insert(peer_id.to_string(), pubkey);
    }

    /// Streams decoded inbound [`LotusMessage`]s and their sender peer id (when
    /// resolvable) until the underlying notification channel closes.
    pub async fn notifications(&self) -> nostr_sdk::prelude::Notifications {
        self.client.notifications()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn decode_sender(&self, pubkey: &PublicKey) -> Option<String> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .find(|(_, pk)| *pk == pubkey)
            .map(|(id, _)| id.clone())
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[async_trait]
impl Transport for NostrTransport {
    async fn direct_send(&self, peer_id: &str, message: &LotusMessage) -> Result<(), String> {
        let pubkey = self
            .peers
            .lock()
            .unwrap()
            .get(peer_id)
            .copied()
            .ok_or_else(|| format!("no known Nostr pubkey for peer {peer_id}"))?;

        let content = message
            .encode()
            .map_err(|e| format!("failed to encode message: {e}"))?;
        let content = String::from_utf8(content).map_err(|e| e.to_string())?;

        let event = EventBuilder::private_msg_rumor(pubkey, content)
            .sign_with_keys(&self.keys)
            .map_err(|e| format!("failed to build direct message: {e}"))?;

        self.client
            .send_event(&event)
            .await
            .map_err(|e| format!("failed to send direct message to {peer_id}: {e}"))?;
        Ok(())
    }

    async fn broadcast(&self, topic: &str, message: &LotusMessage) -> Result<(), String> {
        let content = message
            .encode()
            .map_err(|e| format!("failed to encode message: {e}"))?;
        let content = String::from_utf8(content).map_err(|e| e.to_string())?;

        let event = EventBuilder::new(LOTUS_KIND, content)
            .tag(Tag::hashtag(topic))
            .sign_with_keys(&self.keys)
            .map_err(|e| format!("failed to sign broadcast: {e}"))?;

        self.client
            .send_event(&event)
            .await
            .map_err(|e| format!("failed to publish broadcast on {topic}: {e}"))?;
        Ok(())
    }

    async fn subscribe_broadcast(&self, topic: &str) -> Result<(), String> {
        let filter = Filter::new().kind(LOTUS_KIND).hashtag(topic);
        self.client
            .subscribe(filter, None)
            .await
            .map_err(|e| format!("failed to subscribe to {topic}: {e}"))?;
        Ok(())
    }
}
