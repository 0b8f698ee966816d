//! Connection manager for tracking and managing client connections.
//!
//! This module provides the central management system for all client
//! connections, handling connection lifecycle, player binding, and outbound
//! message queueing.

use super::{client::ClientConnection, ConnectionId};
use dashmap::DashMap;
use futures_util::stream::SplitSink;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::{tungstenite::Message, WebSocketStream};
use tracing::info;

type WsSender = Arc<tokio::sync::Mutex<SplitSink<WebSocketStream<tokio::net::TcpStream>, Message>>>;

/// Central manager for all client connections.
///
/// The `ConnectionManager` tracks active connections, assigns unique IDs,
/// binds player ids, and queues outbound messages. Lock-free maps keep every
/// operation non-blocking, so world-state code may call into the manager
/// while holding the state lock: a send only enqueues bytes on the broadcast
/// channel, and the per-connection outgoing task performs the socket I/O.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: DashMap<ConnectionId, ClientConnection>,

    /// WebSocket write halves, registered after the handshake and removed
    /// on disconnect. Presence in this map is the definition of "open" used
    /// by the liveness sweep.
    ws_senders: DashMap<ConnectionId, WsSender>,

    /// Atomic counter for generating unique connection IDs
    next_id: AtomicUsize,

    /// Broadcast sender for outgoing messages to specific connections
    sender: broadcast::Sender<(ConnectionId, Vec<u8>)>,
}

impl ConnectionManager {
    /// Creates a new connection manager with an outbound queue sized for
    /// bursty fan-out.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1000);
        Self {
            connections: DashMap::new(),
            ws_senders: DashMap::new(),
            next_id: AtomicUsize::new(1),
            sender,
        }
    }

    /// Adds a new connection and returns its unique ID.
    pub fn add_connection(&self, remote_addr: SocketAddr) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .insert(connection_id, ClientConnection::new(remote_addr));
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        connection_id
    }

    /// Registers the WebSocket write half for a connection.
    pub fn register_ws_sender(&self, connection_id: ConnectionId, ws_sender: WsSender) {
        self.ws_senders.insert(connection_id, ws_sender);
    }

    /// Removes the WebSocket write half for a connection. After this call
    /// the connection counts as closed for liveness purposes.
    pub fn remove_ws_sender(&self, connection_id: ConnectionId) {
        self.ws_senders.remove(&connection_id);
    }

    /// Removes a connection from the manager and logs the disconnect.
    pub fn remove_connection(&self, connection_id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&connection_id) {
            info!(
                "❌ Connection {} from {} disconnected",
                connection_id, connection.remote_addr
            );
        }
    }

    /// Binds a player id to a connection.
    ///
    /// Called when an `enter_world` from this connection is admitted.
    pub fn set_player_id(&self, connection_id: ConnectionId, player_id: &str) {
        if let Some(mut connection) = self.connections.get_mut(&connection_id) {
            connection.player_id = Some(player_id.to_string());
        }
    }

    /// Retrieves the player id bound to a connection, if any.
    pub fn get_player_id(&self, connection_id: ConnectionId) -> Option<String> {
        self.connections
            .get(&connection_id)
            .and_then(|c| c.player_id.clone())
    }

    /// Queues a message for delivery to the specified connection.
    ///
    /// Fire-and-forget: if the connection's outgoing task is gone, the
    /// bytes are dropped.
    pub fn send_to_connection(&self, connection_id: ConnectionId, message: Vec<u8>) {
        if let Err(e) = self.sender.send((connection_id, message)) {
            tracing::trace!(
                "No outgoing task for connection {}: {:?}",
                connection_id,
                e
            );
        }
    }

    /// Whether the connection still has a registered, open socket.
    pub fn is_connection_open(&self, connection_id: ConnectionId) -> bool {
        self.ws_senders.contains_key(&connection_id)
    }

    /// Creates a new receiver for outgoing messages.
    ///
    /// Each connection handler calls this to get a receiver for messages
    /// targeted at its specific connection.
    pub fn subscribe(&self) -> broadcast::Receiver<(ConnectionId, Vec<u8>)> {
        self.sender.subscribe()
    }

    /// Number of currently tracked connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
