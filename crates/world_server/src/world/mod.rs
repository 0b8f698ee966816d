//! The in-memory world model: sessions, registry, and rooms.
//!
//! All mutable presence state of one instance lives in [`WorldState`],
//! which the server wraps in a single `tokio::sync::RwLock`. Routing every
//! mutation through that one lock is what makes concurrent `enter_world`
//! events for the same player collapse into one session; convergence across
//! instances then needs no coordination at all, because every transition is
//! an idempotent no-op when replayed.

pub mod registry;
pub mod room;
pub mod session;

pub use registry::{SessionRef, SessionRegistry};
pub use room::{MoveOutcome, WorldRoom};
pub use session::{Locality, PlayerSession};

use crate::connection::{ConnectionId, ResponseSender};
use plaza_protocol::{MoveData, Notice, PlayerProfile, WorldPresence};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Presence counters reported by the monitoring loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceCounts {
    pub local_sessions: usize,
    pub remote_sessions: usize,
    pub rooms: usize,
}

/// All presence state of one instance, guarded by one lock.
#[derive(Debug)]
pub struct WorldState {
    registry: SessionRegistry,
    rooms: HashMap<String, WorldRoom>,
    interest_radius: f64,
}

impl WorldState {
    pub fn new(interest_radius: f64) -> Self {
        Self {
            registry: SessionRegistry::new(),
            rooms: HashMap::new(),
            interest_radius,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn room(&self, world_id: &str) -> Option<&WorldRoom> {
        self.rooms.get(world_id)
    }

    /// Admits a session and adds it to its world room, creating the room
    /// lazily.
    ///
    /// Returns `None` when the player already has a session (idempotent
    /// no-op), otherwise the roster of the *other* members that were
    /// already present; the router replies with it when the entry came
    /// from a live socket.
    pub fn enter(
        &mut self,
        session: PlayerSession,
        sink: &dyn ResponseSender,
    ) -> Option<Vec<PlayerProfile>> {
        if !self
            .registry
            .admit(&session.player_id, &session.world_id, session.locality)
        {
            trace!("Duplicate enter for {} ignored", session.player_id);
            return None;
        }

        let interest_radius = self.interest_radius;
        let room = self
            .rooms
            .entry(session.world_id.clone())
            .or_insert_with(|| WorldRoom::new(session.world_id.clone(), interest_radius));

        let roster: Vec<PlayerProfile> = room.members().map(|member| member.profile()).collect();
        let player_id = session.player_id.clone();
        if !room.add_player(session, sink) {
            // Registry and room disagreed; undo the admission rather than
            // leave a dangling entry.
            self.registry.remove(&player_id);
            return None;
        }
        Some(roster)
    }

    /// Removes a player from their room (broadcasting `leave_world`) and
    /// from the registry. No-op if the player has no session.
    pub fn leave(&mut self, player_id: &str, sink: &dyn ResponseSender) -> Option<PlayerSession> {
        let entry = self.registry.remove(player_id)?;
        self.rooms
            .get_mut(&entry.world_id)
            .and_then(|room| room.remove_player(player_id, sink))
    }

    /// Applies a movement event to the mover's room.
    pub fn apply_move(
        &mut self,
        player_id: &str,
        data: &MoveData,
        sink: &dyn ResponseSender,
    ) -> MoveOutcome {
        let world_id = match self.registry.get(player_id) {
            Some(entry) => entry.world_id.clone(),
            None => return MoveOutcome::NotMember,
        };
        match self.rooms.get_mut(&world_id) {
            Some(room) => room.apply_move(player_id, data, sink),
            None => MoveOutcome::NotMember,
        }
    }

    /// Delivers a chat message to the listed recipients.
    ///
    /// Recipients without a `Local` session are silently skipped; their
    /// own instance delivers to them. The client-supplied list is also
    /// re-validated against authoritative positions: anyone farther than
    /// the interest radius from the sender's last known position is
    /// skipped. Returns the number of deliveries queued.
    pub fn deliver_talk(
        &self,
        from: &str,
        recipients: &[String],
        message: &str,
        sink: &dyn ResponseSender,
    ) -> usize {
        let sender = match self
            .registry
            .get(from)
            .and_then(|entry| self.rooms.get(&entry.world_id))
            .and_then(|room| room.member(from))
        {
            Some(sender) => sender,
            None => {
                debug!("Dropping talk from unknown player {from}");
                return 0;
            }
        };

        let notice = Notice::Talk {
            from: from.to_string(),
            message: message.to_string(),
        };
        let bytes = match serde_json::to_vec(&notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Failed to serialize talk notice: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        for recipient_id in recipients {
            if recipient_id == from {
                continue;
            }
            let recipient = match self
                .registry
                .get(recipient_id)
                .filter(|entry| entry.world_id == sender.world_id)
                .and_then(|entry| self.rooms.get(&entry.world_id))
                .and_then(|room| room.member(recipient_id))
            {
                Some(recipient) => recipient,
                None => continue,
            };
            if recipient.distance_to(sender.x, sender.y) > self.interest_radius {
                trace!("Talk recipient {recipient_id} out of range of {from}");
                continue;
            }
            if let Some(connection_id) = recipient.connection_id() {
                if sink.is_connection_open(connection_id) {
                    sink.send_to_connection(connection_id, bytes.clone());
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Resolves a connection back to the player it carries, if any.
    pub fn by_connection(&self, connection_id: ConnectionId) -> Option<String> {
        self.registry.by_connection(connection_id)
    }

    /// Player ids of every session whose live socket this instance owns.
    pub fn local_player_ids(&self) -> Vec<String> {
        self.registry
            .local_entries()
            .map(|(player_id, _)| player_id.clone())
            .collect()
    }

    /// Local sessions whose socket is no longer open, as found by the
    /// liveness sweep.
    pub fn dead_local_sessions(&self, sink: &dyn ResponseSender) -> Vec<String> {
        self.registry
            .local_entries()
            .filter_map(|(player_id, entry)| match entry.locality {
                Locality::Local { connection_id } if !sink.is_connection_open(connection_id) => {
                    Some(player_id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Projects all local sessions, grouped by world, for the recovery
    /// snapshot.
    pub fn snapshot_worlds(&self) -> Vec<WorldPresence> {
        let mut worlds = Vec::new();
        for room in self.rooms.values() {
            let players: Vec<_> = room
                .members()
                .filter(|session| session.is_local())
                .map(|session| session.session_record())
                .collect();
            if !players.is_empty() {
                worlds.push(WorldPresence {
                    world_id: room.world_id().to_string(),
                    players,
                });
            }
        }
        worlds
    }

    pub fn counts(&self) -> PresenceCounts {
        let local_sessions = self.registry.local_entries().count();
        PresenceCounts {
            local_sessions,
            remote_sessions: self.registry.len() - local_sessions,
            rooms: self.rooms.len(),
        }
    }
}
