//! The event router: one dispatch path for every envelope.
//!
//! Client sockets and the bus deliver the same envelope shape, and both go
//! through [`EventRouter::dispatch`], an exhaustive match over the event
//! union, so an unhandled event type is a compile error, not a silent drop.
//! The differences between the two origins are confined to the edges:
//! socket-originated world events are re-published to the bus tagged with
//! this instance's id, and bus-originated envelopes are discarded outright
//! when that tag names ourselves (self-echo).

use crate::bus::{events_topic, MessageBus};
use crate::connection::{ConnectionId, ResponseSender};
use crate::error::ServerError;
use crate::store::RecordStore;
use crate::world::{Locality, PlayerSession, WorldState};
use plaza_protocol::{Envelope, Event, InstanceId, MoveData, Notice};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// Where an envelope entered this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A live client socket on this instance.
    Socket(ConnectionId),
    /// The shared bus or a direct topic; the session it creates is remote.
    Bus,
    /// Synthesized by this instance (socket close, liveness sweep).
    Internal,
}

/// Validates and dispatches envelopes, and mirrors locally-originated
/// events onto the bus.
pub struct EventRouter {
    instance_id: InstanceId,
    state: Arc<RwLock<WorldState>>,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn ResponseSender>,
    events_topic: String,
}

impl EventRouter {
    pub fn new(
        instance_id: InstanceId,
        state: Arc<RwLock<WorldState>>,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn ResponseSender>,
        subject_prefix: &str,
    ) -> Self {
        Self {
            instance_id,
            state,
            bus,
            store,
            sink,
            events_topic: events_topic(subject_prefix),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Handles one text frame from a client socket.
    ///
    /// Malformed JSON and unknown event types surface as an error the
    /// connection handler logs; the connection stays open. World events are
    /// mirrored to the bus before local dispatch, matching the
    /// publish-then-apply order peers observe.
    pub async fn handle_client_message(
        &self,
        connection_id: ConnectionId,
        text: &str,
    ) -> Result<(), ServerError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ServerError::Internal(format!("Invalid envelope: {e}")))?;
        let event = envelope.event;

        if matches!(
            event,
            Event::BootstrapRequest { .. } | Event::BootstrapResponse { .. }
        ) {
            warn!(
                "Ignoring {} event from client connection {connection_id}",
                event.kind()
            );
            return Ok(());
        }

        trace!(
            "📨 Routing {} event from connection {connection_id}",
            event.kind()
        );
        self.publish_world_event(&event).await;
        self.dispatch(event, Origin::Socket(connection_id)).await
    }

    /// Handles one message delivered by the bus subscription.
    ///
    /// Parse failures and dispatch failures are logged and dropped; a peer
    /// cannot take this instance down.
    pub async fn handle_bus_message(&self, payload: &[u8]) {
        let envelope: Envelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed bus message: {e}");
                return;
            }
        };

        if envelope.origin_instance_id == Some(self.instance_id) {
            trace!("Discarding self-echo of {} event", envelope.event.kind());
            return;
        }

        let kind = envelope.event.kind();
        if let Err(e) = self.dispatch(envelope.event, Origin::Bus).await {
            warn!("Failed to apply {kind} event from bus: {e}");
        }
    }

    /// Reacts to a closed socket: resolves the connection back to its
    /// player and synthesizes the `leave_world` the client never sent.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        let player_id = { self.state.read().await.by_connection(connection_id) };
        if let Some(player_id) = player_id {
            debug!("🔌 Connection {connection_id} closed, player {player_id} leaves");
            self.synthesize_leave(&player_id).await;
        }
    }

    /// Applies and publishes a `leave_world` on behalf of a player, as if
    /// the client had sent it. Used by the disconnect path and the
    /// reconciler's liveness sweep.
    pub async fn synthesize_leave(&self, player_id: &str) {
        let event = Event::LeaveWorld {
            player_id: player_id.to_string(),
        };
        self.publish_world_event(&event).await;
        if let Err(e) = self.dispatch(event, Origin::Internal).await {
            warn!("Failed to apply synthesized leave for {player_id}: {e}");
        }
    }

    /// The single dispatch table. Every envelope, whatever its origin,
    /// goes through this match.
    async fn dispatch(&self, event: Event, origin: Origin) -> Result<(), ServerError> {
        match event {
            Event::EnterWorld { player_id } => self.apply_enter(&player_id, origin).await,
            Event::LeaveWorld { player_id } => self.apply_leave(&player_id).await,
            Event::Move { player_id, data } => self.apply_move(&player_id, data).await,
            Event::Talk {
                from,
                players,
                message,
            } => self.apply_talk(&from, &players, &message).await,
            Event::BootstrapRequest { instance_id } => {
                self.answer_bootstrap_request(instance_id).await
            }
            Event::BootstrapResponse {
                instance_id,
                players,
            } => self.apply_bootstrap_response(instance_id, players).await,
        }
    }

    async fn apply_enter(&self, player_id: &str, origin: Origin) -> Result<(), ServerError> {
        // Cheap pre-check before touching the store; the authoritative
        // idempotence check reruns under the write lock.
        if self.state.read().await.registry().contains(player_id) {
            trace!("Player {player_id} already has a session");
            return Ok(());
        }

        let record = self
            .store
            .get_player(player_id)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let Some(record) = record else {
            debug!("enter_world for unknown player {player_id}");
            return Ok(());
        };
        let world = self
            .store
            .get_world(&record.world_id)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        if world.is_none() {
            debug!(
                "enter_world for player {player_id} names unknown world {}",
                record.world_id
            );
            return Ok(());
        }

        let locality = match origin {
            Origin::Socket(connection_id) => Locality::Local { connection_id },
            Origin::Bus | Origin::Internal => Locality::Remote,
        };
        let session = PlayerSession::from_record(&record, locality);

        let roster = {
            let mut state = self.state.write().await;
            state.enter(session, self.sink.as_ref())
        };
        let Some(roster) = roster else {
            return Ok(()); // lost the race to another enter; nothing to do
        };

        info!(
            "👋 Player {player_id} entered world {} ({:?})",
            record.world_id, locality
        );

        // Only a live socket gets the roster reply; bus replays have no one
        // to answer.
        if let Origin::Socket(connection_id) = origin {
            self.sink.bind_player(connection_id, player_id);
            for profile in roster {
                let notice = Notice::EnterWorld { player: profile };
                match serde_json::to_vec(&notice) {
                    Ok(bytes) => self.sink.send_to_connection(connection_id, bytes),
                    Err(e) => warn!("Failed to serialize roster entry: {e}"),
                }
            }
        }
        Ok(())
    }

    async fn apply_leave(&self, player_id: &str) -> Result<(), ServerError> {
        let removed = {
            let mut state = self.state.write().await;
            state.leave(player_id, self.sink.as_ref())
        };
        if let Some(session) = removed {
            info!("👋 Player {player_id} left world {}", session.world_id);
        }
        Ok(())
    }

    async fn apply_move(&self, player_id: &str, data: MoveData) -> Result<(), ServerError> {
        let outcome = {
            let mut state = self.state.write().await;
            state.apply_move(player_id, &data, self.sink.as_ref())
        };
        trace!("Move for {player_id}: {outcome:?}");
        Ok(())
    }

    async fn apply_talk(
        &self,
        from: &str,
        players: &[String],
        message: &str,
    ) -> Result<(), ServerError> {
        let delivered = {
            let state = self.state.read().await;
            state.deliver_talk(from, players, message, self.sink.as_ref())
        };
        trace!(
            "💬 Talk from {from} delivered to {delivered} of {} listed recipients",
            players.len()
        );
        Ok(())
    }

    /// A peer instance asked for our presence: answer on its private topic
    /// with every player we hold a live socket for.
    async fn answer_bootstrap_request(&self, requester: InstanceId) -> Result<(), ServerError> {
        let players = { self.state.read().await.local_player_ids() };
        debug!(
            "🤝 Answering bootstrap request from {requester} with {} players",
            players.len()
        );

        let envelope = Envelope::from_instance(
            Event::BootstrapResponse {
                instance_id: self.instance_id,
                players,
            },
            self.instance_id,
        );
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => {
                if let Err(e) = self.bus.send_direct(requester, bytes).await {
                    warn!("Failed to answer bootstrap request from {requester}: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize bootstrap response: {e}"),
        }
        Ok(())
    }

    /// A peer told us which players it holds locally: replay each as a
    /// remote enter. Already-known players are idempotent no-ops.
    async fn apply_bootstrap_response(
        &self,
        responder: InstanceId,
        players: Vec<String>,
    ) -> Result<(), ServerError> {
        debug!(
            "🤝 Bootstrap response from {responder} lists {} players",
            players.len()
        );
        for player_id in players {
            self.apply_enter(&player_id, Origin::Bus).await?;
        }
        Ok(())
    }

    /// Mirrors a locally-originated event onto the shared topic, tagged
    /// with this instance's id. Failures are logged and the event is
    /// dropped; presence going stale on peers beats blocking a client.
    async fn publish_world_event(&self, event: &Event) {
        let envelope = Envelope::from_instance(event.clone(), self.instance_id);
        match serde_json::to_vec(&envelope) {
            Ok(bytes) => {
                if let Err(e) = self.bus.publish(&self.events_topic, bytes).await {
                    warn!("📡 Failed to publish {} event: {e}", event.kind());
                }
            }
            Err(e) => warn!("Failed to serialize {} envelope: {e}", event.kind()),
        }
    }
}
