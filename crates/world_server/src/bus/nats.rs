//! NATS-backed message bus for production deployments.
//!
//! Core subjects carry the event traffic and the per-instance direct
//! topics; a JetStream key-value bucket provides the snapshot slot. The
//! client reconnects in the background (`retry_on_initial_connect` plus the
//! library's own reconnect loop), so bus outages degrade presence
//! propagation instead of failing requests.

use super::{instance_topic, BusError, BusMessage, MessageBus};
use crate::config::BusConfig;
use async_nats::jetstream;
use async_trait::async_trait;
use futures::StreamExt;
use plaza_protocol::InstanceId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Message bus adapter over a NATS deployment.
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    prefix: String,
    snapshot_bucket: String,
}

impl NatsBus {
    /// Connects to the configured NATS endpoint.
    ///
    /// Connectivity problems are not fatal here: the client retries the
    /// initial connect in the background and every later operation simply
    /// errors until the broker is reachable again. Only an unusable URL
    /// fails construction.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Connected => {
                        info!("🚌 Bus connection established");
                    }
                    async_nats::Event::Disconnected => {
                        warn!("🚌 Bus connection lost, reconnecting in background");
                    }
                    other => debug!("Bus client event: {other}"),
                }
            })
            .connect(config.url.as_str())
            .await
            .map_err(|e| BusError::Connection(format!("{}: {e}", config.url)))?;

        let jetstream = jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            prefix: config.subject_prefix.clone(),
            snapshot_bucket: config.snapshot_bucket.clone(),
        })
    }

    /// Opens the snapshot bucket, creating it on first use.
    ///
    /// Resolved per call rather than cached so that a bucket created while
    /// we were disconnected is picked up without a restart.
    async fn snapshot_store(&self) -> Result<jetstream::kv::Store, BusError> {
        if let Ok(store) = self.jetstream.get_key_value(self.snapshot_bucket.as_str()).await {
            return Ok(store);
        }
        self.jetstream
            .create_key_value(jetstream::kv::Config {
                bucket: self.snapshot_bucket.clone(),
                history: 1,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Snapshot(format!("bucket {}: {e}", self.snapshot_bucket)))
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic.to_string(), payload.into())
            .await
            .map_err(|e| BusError::Publish(format!("{topic}: {e}")))
    }

    async fn subscribe(
        &self,
        topics: &[String],
    ) -> Result<mpsc::UnboundedReceiver<BusMessage>, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();

        for topic in topics {
            let mut subscriber = self
                .client
                .subscribe(topic.clone())
                .await
                .map_err(|e| BusError::Subscribe(format!("{topic}: {e}")))?;
            let tx = tx.clone();
            let topic = topic.clone();

            tokio::spawn(async move {
                while let Some(message) = subscriber.next().await {
                    let delivered = tx.send(BusMessage {
                        topic: message.subject.to_string(),
                        payload: message.payload.to_vec(),
                    });
                    if delivered.is_err() {
                        break;
                    }
                }
                debug!("Bus subscription for {topic} ended");
            });
        }

        Ok(rx)
    }

    async fn send_direct(&self, instance_id: InstanceId, payload: Vec<u8>) -> Result<(), BusError> {
        self.publish(&instance_topic(&self.prefix, instance_id), payload)
            .await
    }

    async fn set_snapshot(&self, key: &str, blob: Vec<u8>) -> Result<(), BusError> {
        let store = self.snapshot_store().await?;
        store
            .put(key, blob.into())
            .await
            .map(|_| ())
            .map_err(|e| BusError::Snapshot(format!("put {key}: {e}")))
    }

    async fn get_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>, BusError> {
        let store = self.snapshot_store().await?;
        let entry = store
            .get(key)
            .await
            .map_err(|e| BusError::Snapshot(format!("get {key}: {e}")))?;
        Ok(entry.map(|bytes| bytes.to_vec()))
    }
}
