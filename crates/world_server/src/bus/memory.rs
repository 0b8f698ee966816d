//! In-process message bus for development mode and hermetic tests.
//!
//! A [`MemoryBusHub`] plays the role of the broker; every [`MemoryBus`]
//! handle created from it shares the same topics and snapshot slot, so a
//! test can run several "instances" against one hub and observe real
//! cross-instance propagation without a broker.

use super::{instance_topic, BusError, BusMessage, MessageBus};
use async_trait::async_trait;
use plaza_protocol::InstanceId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

#[derive(Debug)]
struct HubInner {
    sender: broadcast::Sender<BusMessage>,
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
}

/// The process-local "broker" shared by all [`MemoryBus`] handles.
#[derive(Debug, Clone)]
pub struct MemoryBusHub {
    inner: Arc<HubInner>,
}

impl MemoryBusHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(HubInner {
                sender,
                snapshots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Creates a bus handle for one instance. All handles from the same hub
    /// see each other's traffic.
    pub fn handle(&self, subject_prefix: &str) -> MemoryBus {
        MemoryBus {
            inner: self.inner.clone(),
            prefix: subject_prefix.to_string(),
        }
    }
}

impl Default for MemoryBusHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One instance's handle onto a [`MemoryBusHub`].
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<HubInner>,
    prefix: String,
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // A hub with no subscribers drops the message, like a broker with
        // no interested parties.
        let _ = self.inner.sender.send(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[String],
    ) -> Result<mpsc::UnboundedReceiver<BusMessage>, BusError> {
        let wanted: HashSet<String> = topics.iter().cloned().collect();
        let mut hub_receiver = self.inner.sender.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                match hub_receiver.recv().await {
                    Ok(message) => {
                        if wanted.contains(&message.topic) && tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("In-memory bus subscriber lagged, skipped {skipped} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    async fn send_direct(&self, instance_id: InstanceId, payload: Vec<u8>) -> Result<(), BusError> {
        self.publish(&instance_topic(&self.prefix, instance_id), payload)
            .await
    }

    async fn set_snapshot(&self, key: &str, blob: Vec<u8>) -> Result<(), BusError> {
        self.inner
            .snapshots
            .lock()
            .await
            .insert(key.to_string(), blob);
        Ok(())
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>, BusError> {
        Ok(self.inner.snapshots.lock().await.get(key).cloned())
    }
}
