//! Identity and payload types referenced by the wire envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one running server instance.
///
/// Generated at startup and attached to every envelope the instance
/// publishes on the bus, so that the instance can discard its own echo
/// when the shared topic delivers the message back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Creates a new random instance ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an instance ID from its string representation.
    pub fn from_str(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Spawn coordinates stored on a player record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub x: f64,
    pub y: f64,
}

/// Public display attributes of a player, as sent to other clients in
/// roster replies and `enter_world` notices.
///
/// This is the record-store document minus server-side fields (the owning
/// user id never leaves the server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: String,
    pub name: String,
    pub wealth: i64,
    pub spritesheet: String,
    pub checkpoint: Checkpoint,
}

/// Movement payload carried by `move` events and notices.
///
/// `timestamp` is a client-supplied monotonic value (milliseconds since
/// epoch in practice). Receivers drop any movement older than the last one
/// they applied, so out-of-order bus delivery degrades to a skipped frame
/// rather than a position rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveData {
    pub x: f64,
    pub y: f64,
    pub animation: Option<String>,
    pub timestamp: u64,
}

/// One session as captured in the recovery snapshot: the public profile
/// plus the last known position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub player: PlayerProfile,
    pub x: f64,
    pub y: f64,
}

/// Presence within a single world, as recorded in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPresence {
    pub world_id: String,
    pub players: Vec<SessionRecord>,
}

/// The projection of one instance's locally-connected sessions, written to
/// the bus's shared slot by the presence reconciler.
///
/// A snapshot seeds a cold-starting instance's view of the rooms; it is
/// never consulted for runtime routing, so a stale snapshot costs at most
/// one bootstrap exchange of accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    pub instance_id: InstanceId,
    pub worlds: Vec<WorldPresence>,
}
