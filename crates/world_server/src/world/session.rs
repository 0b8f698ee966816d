//! Per-player presence sessions.

use crate::connection::ConnectionId;
use crate::store::PlayerRecord;
use plaza_protocol::{Checkpoint, PlayerProfile, SessionRecord};

/// Where a session's live socket is, if anywhere.
///
/// Exactly one instance holds a given player as `Local` at a time (best
/// effort; convergence, not consensus, enforces it). `Remote` sessions
/// exist so routing and proximity math stay locally answerable; they never
/// receive traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    /// This instance owns the live socket.
    Local { connection_id: ConnectionId },
    /// The player is online on some other instance.
    Remote,
}

/// One player's presence on this instance.
///
/// Created when an `enter_world` is first applied for the player (from a
/// direct client connection, a bus replay, a snapshot, or a bootstrap
/// response) and deleted when a `leave_world` is applied.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub player_id: String,
    pub world_id: String,
    pub name: String,
    pub wealth: i64,
    pub spritesheet: String,
    pub checkpoint: Checkpoint,
    /// Last known position, starting at the checkpoint.
    pub x: f64,
    pub y: f64,
    /// Timestamp of the last applied movement; older moves are dropped.
    pub last_move_timestamp: u64,
    pub locality: Locality,
}

impl PlayerSession {
    /// Builds a session from a store record, spawning at the checkpoint.
    pub fn from_record(record: &PlayerRecord, locality: Locality) -> Self {
        Self {
            player_id: record.id.clone(),
            world_id: record.world_id.clone(),
            name: record.name.clone(),
            wealth: record.wealth,
            spritesheet: record.spritesheet.clone(),
            checkpoint: record.checkpoint,
            x: record.checkpoint.x,
            y: record.checkpoint.y,
            last_move_timestamp: 0,
            locality: Locality::Remote,
        }
        .with_locality(locality)
    }

    /// Rebuilds a remote session from a recovery snapshot record,
    /// preserving the recorded position.
    pub fn from_snapshot(world_id: &str, record: &SessionRecord) -> Self {
        Self {
            player_id: record.player.id.clone(),
            world_id: world_id.to_string(),
            name: record.player.name.clone(),
            wealth: record.player.wealth,
            spritesheet: record.player.spritesheet.clone(),
            checkpoint: record.player.checkpoint,
            x: record.x,
            y: record.y,
            last_move_timestamp: 0,
            locality: Locality::Remote,
        }
    }

    fn with_locality(mut self, locality: Locality) -> Self {
        self.locality = locality;
        self
    }

    /// The public profile other clients see in roster and enter notices.
    pub fn profile(&self) -> PlayerProfile {
        PlayerProfile {
            id: self.player_id.clone(),
            name: self.name.clone(),
            wealth: self.wealth,
            spritesheet: self.spritesheet.clone(),
            checkpoint: self.checkpoint,
        }
    }

    /// The projection stored in the recovery snapshot.
    pub fn session_record(&self) -> SessionRecord {
        SessionRecord {
            player: self.profile(),
            x: self.x,
            y: self.y,
        }
    }

    /// The live socket connection, when this instance owns one.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self.locality {
            Locality::Local { connection_id } => Some(connection_id),
            Locality::Remote => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.locality, Locality::Local { .. })
    }

    /// Euclidean distance from this session's last known position.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        (dx * dx + dy * dy).sqrt()
    }
}
