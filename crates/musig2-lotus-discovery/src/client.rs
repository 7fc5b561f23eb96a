//! Nostr-relay-backed discovery transport: publishes advertisements and
//! signing requests to `lotus/discovery/{txType}` topics, runs one-shot
//! queries against those topics, and exposes a live subscription stream.

use std::time::Duration;

use nostr_sdk::prelude::*;

use musig2_lotus_router::messages::{discovery_topic, LotusMessage, SignerAdvertisement, SigningRequest};

use crate::error::DiscoveryError;
use crate::lookup::AdvertisementSource;

/// Custom Nostr event kind carrying a JSON-encoded [`LotusMessage`] in its
/// content, tagged with the discovery topic via a `t` tag.
const LOTUS_DISCOVERY_KIND: Kind = Kind::Custom(30079);

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DiscoveryClient {
    keys: Keys,
    client: Client,
}

impl DiscoveryClient {
    pub async fn connect(keys: Keys, relay_urls: &[String]) -> Result<Self, DiscoveryError> {
        let client = Client::new(keys.clone());

        for url in relay_urls {
            client
                .add_relay(url.as_str())
                .await
                .map_err(|e| DiscoveryError::Relay(format!("failed to add relay {url}: {e}")))?;
        }

        client.connect().await;

        Ok(Self { keys, client })
    }

    async fn publish(&self, topic: &str, message: &LotusMessage) -> Result<EventId, DiscoveryError> {
        let content = message
            .encode()
            .map_err(|e| DiscoveryError::Malformed(e.to_string()))?;
        let content = String::from_utf8(content).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        let event = EventBuilder::new(LOTUS_DISCOVERY_KIND, content)
            .tag(Tag::hashtag(topic))
            .sign_with_keys(&self.keys)
            .map_err(|e| DiscoveryError::Relay(format!("failed to sign event: {e}")))?;

        let output = self
            .client
            .send_event(&event)
            .await
            .map_err(|e| DiscoveryError::Relay(format!("failed to publish: {e}")))?;

        Ok(*output.id())
    }

    pub async fn publish_advertisement(&self, ad: SignerAdvertisement) -> Result<EventId, DiscoveryError> {
        let mut ids = Vec::new();
        for tx_kind in &ad.criteria.tx_kinds {
            ids.push(
                self.publish(&discovery_topic(tx_kind), &LotusMessage::SignerAdvertisement(ad.clone()))
                    .await?,
            );
        }
        ids.into_iter()
            .next()
            .ok_or_else(|| DiscoveryError::Malformed("advertisement has no tx_kinds".into()))
    }

    pub async fn publish_signing_request(&self, req: SigningRequest, tx_kind: &str) -> Result<EventId, DiscoveryError> {
        self.publish(&discovery_topic(tx_kind), &LotusMessage::SigningRequest(req))
            .await
    }

    /// One-shot query for currently-live advertisements on a topic.
    pub async fn query_advertisements(&self, tx_kind: &str) -> Result<Vec<SignerAdvertisement>, DiscoveryError> {
        let topic = discovery_topic(tx_kind);
        let filter = Filter::new()
            .kind(LOTUS_DISCOVERY_KIND)
            .hashtag(topic)
            .limit(256);

        let events = self
            .client
            .fetch_events(filter, DEFAULT_FETCH_TIMEOUT)
            .await
            .map_err(|e| DiscoveryError::Relay(format!("fetch failed: {e}")))?;

        let mut ads = Vec::new();
        for event in events {
            match LotusMessage::decode(event.content.as_bytes()) {
                Ok(LotusMessage::SignerAdvertisement(ad)) => ads.push(ad),
                Ok(_) => continue,
                Err(e) => log::debug!("discarding malformed discovery event {}: {e}", event.id),
            }
        }
        Ok(ads)
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[async_trait::async_trait]
impl AdvertisementSource for DiscoveryClient {
    async fn query(&self, tx_kind: &str) -> Result<Vec<SignerAdvertisement>, DiscoveryError> {
        self.query_advertisements(tx_kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_kind_is_stable() {
        assert_eq!(LOTUS_DISCOVERY_KIND, Kind::Custom(30079));
    }
}
