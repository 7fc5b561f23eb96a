//! The only networking contract the engine depends on. Concrete transports
//! (an in-memory channel bus for tests, a libp2p/Nostr-relay-backed one for
//! production) live outside this crate and are supplied by the caller —
//! the engine itself never opens a socket or a relay connection.

use async_trait::async_trait;
use musig2_lotus_router::messages::LotusMessage;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a message on the direct (reliable, ordered) channel to a single peer.
    async fn direct_send(&self, peer_id: &str, message: &LotusMessage) -> Result<(), String>;

    /// Publishes a message on the broadcast (best-effort, unordered) channel.
    async fn broadcast(&self, topic: &str, message: &LotusMessage) -> Result<(), String>;

    /// Registers interest in a broadcast topic; delivered messages surface
    /// through whatever inbound-dispatch path the caller wires up.
    async fn subscribe_broadcast(&self, topic: &str) -> Result<(), String>;
}

/// In-memory transport used by this crate's own tests and by `tests/e2e`.
pub mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Records every send/broadcast/subscribe call for assertions in tests;
    /// does not actually deliver anything to other peers.
    #[derive(Default)]
    pub struct InMemoryTransport {
        pub direct: Mutex<Vec<(String, LotusMessage)>>,
        pub broadcasts: Mutex<Vec<(String, LotusMessage)>>,
        pub subscriptions: Mutex<HashMap<String, usize>>,
    }

    impl InMemoryTransport {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Transport for InMemoryTransport {
        async fn direct_send(&self, peer_id: &str, message: &LotusMessage) -> Result<(), String> {
            self.direct.lock().unwrap().push((peer_id.to_string(), message.clone()));
            Ok(())
        }

        async fn broadcast(&self, topic: &str, message: &LotusMessage) -> Result<(), String> {
            self.broadcasts.lock().unwrap().push((topic.to_string(), message.clone()));
            Ok(())
        }

        async fn subscribe_broadcast(&self, topic: &str) -> Result<(), String> {
            *self.subscriptions.lock().unwrap().entry(topic.to_string()).or_insert(0) += 1;
            Ok(())
        }
    }
}
