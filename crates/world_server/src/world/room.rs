//! World rooms: membership and broadcast fan-out for one world.

use super::session::PlayerSession;
use crate::connection::ResponseSender;
use plaza_protocol::{MoveData, Notice};
use tracing::{trace, warn};

/// Result of applying a movement event to a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Position updated and the move fanned out to interested members.
    Applied,
    /// The player is not a member of this room; dropped silently.
    NotMember,
    /// The timestamp was older than the last applied move; dropped silently.
    Stale,
}

/// The set of sessions currently present in one world, local or remote.
///
/// Created lazily on first entry and never destroyed; every instance with
/// at least one relevant player re-derives an identical room. Fan-out
/// primitives queue bytes through the [`ResponseSender`] and never block.
#[derive(Debug)]
pub struct WorldRoom {
    world_id: String,
    members: std::collections::HashMap<String, PlayerSession>,
    /// Members farther than this from a mover's new position do not
    /// receive that move broadcast.
    interest_radius: f64,
}

impl WorldRoom {
    pub fn new(world_id: impl Into<String>, interest_radius: f64) -> Self {
        Self {
            world_id: world_id.into(),
            members: std::collections::HashMap::new(),
            interest_radius,
        }
    }

    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// Adds a session to the room and announces it to every other member.
    ///
    /// No-op (returning `false`) when the player is already present or the
    /// session belongs to a different world. Remote members have no socket
    /// and simply drop the announcement.
    pub fn add_player(&mut self, session: PlayerSession, sink: &dyn ResponseSender) -> bool {
        if self.members.contains_key(&session.player_id) {
            return false;
        }
        if session.world_id != self.world_id {
            warn!(
                "Player {} belongs to world {} but was offered to room {}",
                session.player_id, session.world_id, self.world_id
            );
            return false;
        }

        let notice = Notice::EnterWorld {
            player: session.profile(),
        };
        let player_id = session.player_id.clone();
        self.members.insert(player_id.clone(), session);
        self.emit(&notice, &player_id, sink);
        true
    }

    /// Removes a session and broadcasts `leave_world` to everyone left.
    /// No-op if the player was not a member.
    pub fn remove_player(
        &mut self,
        player_id: &str,
        sink: &dyn ResponseSender,
    ) -> Option<PlayerSession> {
        let session = self.members.remove(player_id)?;
        let notice = Notice::LeaveWorld {
            player_id: player_id.to_string(),
        };
        self.broadcast(&notice, sink);
        Some(session)
    }

    /// Applies a movement event.
    ///
    /// Rejects non-members and stale timestamps (strictly older than the
    /// last applied move; equal timestamps pass). On success the move is
    /// forwarded to every member within the interest radius of the *new*
    /// position, never including the mover itself. The interest set is
    /// recomputed per move; there are no standing subscriptions to go
    /// stale.
    pub fn apply_move(
        &mut self,
        player_id: &str,
        data: &MoveData,
        sink: &dyn ResponseSender,
    ) -> MoveOutcome {
        let session = match self.members.get_mut(player_id) {
            Some(session) => session,
            None => return MoveOutcome::NotMember,
        };
        if data.timestamp < session.last_move_timestamp {
            trace!(
                "Dropping stale move for {} ({} < {})",
                player_id,
                data.timestamp,
                session.last_move_timestamp
            );
            return MoveOutcome::Stale;
        }

        session.x = data.x;
        session.y = data.y;
        session.last_move_timestamp = data.timestamp;

        let notice = Notice::Move {
            player_id: player_id.to_string(),
            data: data.clone(),
        };
        let bytes = match serde_json::to_vec(&notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize move notice: {e}");
                return MoveOutcome::Applied;
            }
        };

        for member in self.members.values() {
            if member.player_id == player_id {
                continue;
            }
            if member.distance_to(data.x, data.y) > self.interest_radius {
                continue;
            }
            if let Some(connection_id) = member.connection_id() {
                sink.send_to_connection(connection_id, bytes.clone());
            }
        }

        MoveOutcome::Applied
    }

    /// Sends a notice to every member except `excluded_player`.
    pub fn emit(&self, notice: &Notice, excluded_player: &str, sink: &dyn ResponseSender) {
        let bytes = match serde_json::to_vec(notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize notice for room {}: {e}", self.world_id);
                return;
            }
        };
        for member in self.members.values() {
            if member.player_id == excluded_player {
                continue;
            }
            if let Some(connection_id) = member.connection_id() {
                sink.send_to_connection(connection_id, bytes.clone());
            }
        }
    }

    /// Sends a notice to every member of the room.
    pub fn broadcast(&self, notice: &Notice, sink: &dyn ResponseSender) {
        let bytes = match serde_json::to_vec(notice) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize notice for room {}: {e}", self.world_id);
                return;
            }
        };
        for member in self.members.values() {
            if let Some(connection_id) = member.connection_id() {
                sink.send_to_connection(connection_id, bytes.clone());
            }
        }
    }

    pub fn member(&self, player_id: &str) -> Option<&PlayerSession> {
        self.members.get(player_id)
    }

    pub fn members(&self) -> impl Iterator<Item = &PlayerSession> {
        self.members.values()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.contains_key(player_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::store::PlayerRecord;
    use crate::world::session::Locality;
    use plaza_protocol::{Checkpoint, Notice};
    use std::sync::Mutex;

    /// Test sink that records every queued frame.
    #[derive(Debug, Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
    }

    impl RecordingSender {
        fn notices_for(&self, connection_id: ConnectionId) -> Vec<Notice> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(conn, _)| *conn == connection_id)
                .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
                .collect()
        }

        fn clear(&self) {
            self.sent.lock().unwrap().clear();
        }
    }

    impl ResponseSender for RecordingSender {
        fn send_to_connection(&self, connection_id: ConnectionId, data: Vec<u8>) {
            self.sent.lock().unwrap().push((connection_id, data));
        }

        fn is_connection_open(&self, _connection_id: ConnectionId) -> bool {
            true
        }

        fn bind_player(&self, _connection_id: ConnectionId, _player_id: &str) {}
    }

    fn record(player_id: &str, world_id: &str) -> PlayerRecord {
        PlayerRecord {
            id: player_id.to_string(),
            user_id: format!("user_{player_id}"),
            world_id: world_id.to_string(),
            name: player_id.to_uppercase(),
            wealth: 100,
            spritesheet: "GENERIC".to_string(),
            checkpoint: Checkpoint { x: 100.0, y: 100.0 },
        }
    }

    fn local_session(player_id: &str, connection_id: ConnectionId) -> PlayerSession {
        PlayerSession::from_record(&record(player_id, "world_0"), Locality::Local { connection_id })
    }

    fn move_data(x: f64, y: f64, timestamp: u64) -> MoveData {
        MoveData {
            x,
            y,
            animation: Some("walk_down".to_string()),
            timestamp,
        }
    }

    #[test]
    fn add_announces_to_others_but_not_newcomer() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);

        assert!(room.add_player(local_session("p1", 1), &sink));
        assert!(room.add_player(local_session("p2", 2), &sink));

        // p1 heard about p2; p2 got nothing (roster replies are the
        // router's job, not the room's).
        let p1_notices = sink.notices_for(1);
        assert_eq!(p1_notices.len(), 1);
        match &p1_notices[0] {
            Notice::EnterWorld { player } => assert_eq!(player.id, "p2"),
            other => panic!("unexpected notice: {other:?}"),
        }
        assert!(sink.notices_for(2).is_empty());
    }

    #[test]
    fn duplicate_add_is_noop() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);

        assert!(room.add_player(local_session("p1", 1), &sink));
        assert!(!room.add_player(local_session("p1", 9), &sink));
        assert_eq!(room.len(), 1);
        // The original session (and its connection) must survive.
        assert_eq!(room.member("p1").unwrap().connection_id(), Some(1));
    }

    #[test]
    fn world_mismatch_add_is_noop() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_1", 500.0);

        assert!(!room.add_player(local_session("p1", 1), &sink));
        assert!(room.is_empty());
    }

    #[test]
    fn remove_broadcasts_leave_to_remaining() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        room.add_player(local_session("p1", 1), &sink);
        room.add_player(local_session("p2", 2), &sink);
        sink.clear();

        assert!(room.remove_player("p2", &sink).is_some());
        let p1_notices = sink.notices_for(1);
        assert_eq!(p1_notices.len(), 1);
        match &p1_notices[0] {
            Notice::LeaveWorld { player_id } => assert_eq!(player_id, "p2"),
            other => panic!("unexpected notice: {other:?}"),
        }

        assert!(room.remove_player("p2", &sink).is_none());
    }

    #[test]
    fn move_excludes_members_beyond_interest_radius() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        room.add_player(local_session("mover", 1), &sink);
        room.add_player(local_session("near", 2), &sink);
        room.add_player(local_session("far", 3), &sink);

        // Place the bystanders: "near" within 500 of the new position,
        // "far" beyond it.
        room.apply_move("near", &move_data(100.0, 0.0, 1), &sink);
        room.apply_move("far", &move_data(900.0, 0.0, 1), &sink);
        sink.clear();

        assert_eq!(
            room.apply_move("mover", &move_data(0.0, 0.0, 2), &sink),
            MoveOutcome::Applied
        );

        assert_eq!(sink.notices_for(2).len(), 1);
        assert!(sink.notices_for(3).is_empty());
        // The mover never receives its own echo.
        assert!(sink.notices_for(1).is_empty());
    }

    #[test]
    fn member_exactly_on_cutoff_still_receives() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        room.add_player(local_session("mover", 1), &sink);
        room.add_player(local_session("edge", 2), &sink);
        room.apply_move("edge", &move_data(500.0, 0.0, 1), &sink);
        sink.clear();

        room.apply_move("mover", &move_data(0.0, 0.0, 2), &sink);
        assert_eq!(sink.notices_for(2).len(), 1);
    }

    #[test]
    fn stale_move_is_dropped_and_position_kept() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        room.add_player(local_session("p1", 1), &sink);

        assert_eq!(
            room.apply_move("p1", &move_data(10.0, 20.0, 100), &sink),
            MoveOutcome::Applied
        );
        assert_eq!(
            room.apply_move("p1", &move_data(5.0, 5.0, 50), &sink),
            MoveOutcome::Stale
        );

        let session = room.member("p1").unwrap();
        assert_eq!((session.x, session.y), (10.0, 20.0));
        assert_eq!(session.last_move_timestamp, 100);
    }

    #[test]
    fn equal_timestamp_move_is_applied() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        room.add_player(local_session("p1", 1), &sink);

        room.apply_move("p1", &move_data(10.0, 20.0, 100), &sink);
        assert_eq!(
            room.apply_move("p1", &move_data(11.0, 21.0, 100), &sink),
            MoveOutcome::Applied
        );
        let session = room.member("p1").unwrap();
        assert_eq!((session.x, session.y), (11.0, 21.0));
    }

    #[test]
    fn move_for_non_member_is_rejected() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        assert_eq!(
            room.apply_move("ghost", &move_data(1.0, 1.0, 1), &sink),
            MoveOutcome::NotMember
        );
    }

    #[test]
    fn remote_members_drop_sends() {
        let sink = RecordingSender::default();
        let mut room = WorldRoom::new("world_0", 500.0);
        let remote = PlayerSession::from_record(&record("ghost", "world_0"), Locality::Remote);
        room.add_player(remote, &sink);
        room.add_player(local_session("p1", 1), &sink);
        sink.clear();

        room.apply_move("p1", &move_data(1.0, 1.0, 1), &sink);
        // Only the remote member was in range, and it has no socket.
        assert!(sink.sent.lock().unwrap().is_empty());
    }
}
