//! Message bus adapter: the pub/sub channel shared by all instances.
//!
//! The world server never talks to a broker directly; it goes through the
//! [`MessageBus`] trait, which models exactly what the sync layer needs:
//! fire-and-forget topic publishes, a per-topic subscription stream,
//! point-to-point delivery to one instance's private topic, and a
//! key-value snapshot slot for crash recovery.
//!
//! Two implementations ship: [`NatsBus`] for production deployments and
//! [`MemoryBus`] for single-process development and hermetic tests.
//! Delivery guarantees are the broker's own (order is preserved per topic
//! per publisher, nothing more), and publish failures are reported, logged
//! by the caller, and dropped. Presence data going momentarily stale is an
//! accepted trade-off for liveness; there is no retry queue.

pub mod memory;
pub mod nats;

pub use memory::{MemoryBus, MemoryBusHub};
pub use nats::NatsBus;

use async_trait::async_trait;
use plaza_protocol::InstanceId;
use tokio::sync::mpsc;

/// The single shared key under which instances overwrite the presence
/// snapshot (last writer wins).
pub const SNAPSHOT_KEY: &str = "presence";

/// One message delivered by a subscription.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Errors reported by a bus backend.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("snapshot slot error: {0}")]
    Snapshot(String),
}

/// Publish/subscribe channel shared by all server instances.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes raw bytes on a topic. Fire-and-forget: no delivery
    /// guarantee beyond the underlying broker's.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribes to the given topics. Each delivered message appears once
    /// on the returned channel; ordering is per-topic per-publisher only.
    /// The backend keeps the subscription alive (reconnecting in the
    /// background where the broker supports it) until the receiver is
    /// dropped.
    async fn subscribe(&self, topics: &[String]) -> Result<mpsc::UnboundedReceiver<BusMessage>, BusError>;

    /// Point-to-point delivery to one instance's private topic, used by the
    /// bootstrap exchange.
    async fn send_direct(&self, instance_id: InstanceId, payload: Vec<u8>) -> Result<(), BusError>;

    /// Overwrites the shared snapshot slot.
    async fn set_snapshot(&self, key: &str, blob: Vec<u8>) -> Result<(), BusError>;

    /// Reads the shared snapshot slot; `None` when nothing was ever written.
    async fn get_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>, BusError>;
}

/// The shared topic carrying every world event of a deployment.
pub fn events_topic(prefix: &str) -> String {
    format!("{prefix}.events")
}

/// The private topic of one instance, target of `send_direct`.
pub fn instance_topic(prefix: &str, instance_id: InstanceId) -> String {
    format!("{prefix}.instance.{instance_id}")
}
