//! Client connection representation and management.
//!
//! This module defines the structure and behavior of individual client
//! connections, tracking their state and metadata.

use std::net::SocketAddr;
use std::time::SystemTime;

/// Represents an individual client connection to the server.
///
/// Tracks the essential information about a connected client: the player id
/// bound to the connection once an `enter_world` is applied, the network
/// address, and the connection timestamp.
#[derive(Debug)]
pub struct ClientConnection {
    /// The player id bound to this connection (None until the client enters
    /// a world)
    pub player_id: Option<String>,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was established
    pub connected_at: SystemTime,
}

impl ClientConnection {
    /// Creates a new client connection with the specified remote address.
    ///
    /// The connection starts without a player bound and records the current
    /// time as the connection timestamp.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            player_id: None,
            remote_addr,
            connected_at: SystemTime::now(),
        }
    }
}
