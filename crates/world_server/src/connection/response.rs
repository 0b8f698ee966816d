//! Response sender seam between world state and the socket layer.
//!
//! World rooms and the presence reconciler never touch sockets directly;
//! they talk to a [`ResponseSender`], and the production implementation
//! forwards to the [`ConnectionManager`]. Tests substitute a recording
//! implementation to assert on fan-out without any networking.

use super::manager::ConnectionManager;
use super::ConnectionId;
use std::fmt;
use std::sync::Arc;

/// Outbound delivery and liveness interface used by the world model.
///
/// Every method is synchronous and non-blocking: a send must only enqueue,
/// because callers invoke it while holding the world-state lock.
pub trait ResponseSender: Send + Sync + fmt::Debug {
    /// Queues raw bytes for delivery to one connection. Bytes addressed to
    /// a connection that is gone are silently dropped.
    fn send_to_connection(&self, connection_id: ConnectionId, data: Vec<u8>);

    /// Whether the connection still has an open socket. The liveness sweep
    /// treats `false` as "the client is gone".
    fn is_connection_open(&self, connection_id: ConnectionId) -> bool;

    /// Records which player a connection belongs to, for disconnect
    /// resolution and log context.
    fn bind_player(&self, connection_id: ConnectionId, player_id: &str);
}

/// Production [`ResponseSender`] backed by the connection manager.
#[derive(Clone, Debug)]
pub struct WorldResponseSender {
    /// Reference to the connection manager for looking up and messaging
    /// connections
    connection_manager: Arc<ConnectionManager>,
}

impl WorldResponseSender {
    /// Creates a new response sender with the given connection manager.
    pub fn new(connection_manager: Arc<ConnectionManager>) -> Self {
        Self { connection_manager }
    }
}

impl ResponseSender for WorldResponseSender {
    fn send_to_connection(&self, connection_id: ConnectionId, data: Vec<u8>) {
        self.connection_manager.send_to_connection(connection_id, data);
    }

    fn is_connection_open(&self, connection_id: ConnectionId) -> bool {
        self.connection_manager.is_connection_open(connection_id)
    }

    fn bind_player(&self, connection_id: ConnectionId, player_id: &str) {
        self.connection_manager.set_player_id(connection_id, player_id);
    }
}
