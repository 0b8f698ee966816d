//! Utility functions for server creation and management.
//!
//! This module provides convenience functions for creating server
//! instances with common configurations.

use crate::bus::MemoryBusHub;
use crate::config::ServerConfig;
use crate::server::WorldServer;
use crate::store::MemoryStore;
use std::sync::Arc;

/// Creates a world server with default configuration, an in-process bus,
/// and the sample record store.
///
/// This is the quickest way to get a single-instance server for testing
/// and development. Production deployments construct [`WorldServer`]
/// directly with a [`crate::bus::NatsBus`].
pub fn create_server() -> WorldServer {
    create_server_with_config(ServerConfig::default())
}

/// Creates a world server with a custom configuration, an in-process bus,
/// and the sample record store.
pub fn create_server_with_config(config: ServerConfig) -> WorldServer {
    let hub = MemoryBusHub::new();
    let bus = Arc::new(hub.handle(&config.bus.subject_prefix));
    let store = Arc::new(MemoryStore::with_sample_data());
    WorldServer::new(config, bus, store)
}
