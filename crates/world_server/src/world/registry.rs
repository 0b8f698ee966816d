//! Session registry: the per-instance index of who is online.
//!
//! The registry is the admission gate (idempotent entry, never two sessions
//! for one player) and the reverse index from a socket back to its player.
//! Full session data (position, profile, membership) lives in the world
//! rooms; the registry only answers "is this player online, where, and
//! through which socket".

use super::session::Locality;
use crate::connection::ConnectionId;
use std::collections::HashMap;

/// Routing entry for one online player.
#[derive(Debug, Clone)]
pub struct SessionRef {
    pub world_id: String,
    pub locality: Locality,
}

/// Per-instance mapping from player id to live session reference.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<String, SessionRef>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Admits a player. Returns `false` without touching anything when the
    /// player is already present, so a duplicated bus event or a racing
    /// bootstrap never double-creates state.
    pub fn admit(&mut self, player_id: &str, world_id: &str, locality: Locality) -> bool {
        if self.entries.contains_key(player_id) {
            return false;
        }
        self.entries.insert(
            player_id.to_string(),
            SessionRef {
                world_id: world_id.to_string(),
                locality,
            },
        );
        true
    }

    /// Removes a player's entry. No-op if absent.
    pub fn remove(&mut self, player_id: &str) -> Option<SessionRef> {
        self.entries.remove(player_id)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.entries.contains_key(player_id)
    }

    pub fn get(&self, player_id: &str) -> Option<&SessionRef> {
        self.entries.get(player_id)
    }

    /// Resolves a closed connection back to its player.
    pub fn by_connection(&self, connection_id: ConnectionId) -> Option<String> {
        self.entries.iter().find_map(|(player_id, entry)| {
            match entry.locality {
                Locality::Local { connection_id: conn } if conn == connection_id => {
                    Some(player_id.clone())
                }
                _ => None,
            }
        })
    }

    /// Iterates over players whose live socket this instance owns.
    pub fn local_entries(&self) -> impl Iterator<Item = (&String, &SessionRef)> {
        self.entries
            .iter()
            .filter(|(_, entry)| matches!(entry.locality, Locality::Local { .. }))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
