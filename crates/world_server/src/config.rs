//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the world server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the world server.
///
/// Contains all necessary parameters to configure server behavior including
/// network settings, interest management, presence reconciliation, and the
/// message bus connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Maximum accepted client frame size in bytes; larger frames are dropped
    pub max_message_size: usize,

    /// Euclidean distance beyond which movement updates are not forwarded
    /// to a room member
    pub interest_radius: f64,

    /// Interval of the presence reconciler (liveness sweep + snapshot
    /// export) in seconds
    pub reconcile_interval_secs: u64,

    /// Message bus connection settings
    pub bus: BusConfig,
}

/// Message bus connection settings shared by all bus backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus endpoint, e.g. `nats://127.0.0.1:4222`
    pub url: String,

    /// Prefix applied to every subject this deployment publishes on.
    /// All instances of one deployment must agree on it.
    pub subject_prefix: String,

    /// Name of the key-value bucket holding the recovery snapshot slot
    pub snapshot_bucket: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("Invalid default bind address"),
            max_connections: 1000,
            max_message_size: 64 * 1024, // 64KB
            interest_radius: 500.0,
            reconcile_interval_secs: 10,
            bus: BusConfig::default(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            subject_prefix: "plaza".to_string(),
            snapshot_bucket: "plaza-presence".to_string(),
        }
    }
}
