//! Presence reconciler: liveness sweep, snapshot export, and bootstrap.
//!
//! The reconciler is the safety net around the event-driven paths. Every
//! interval it sweeps local sessions whose socket silently died and exports
//! a snapshot of local presence to the bus's shared slot; at startup it
//! replays the last snapshot and runs the gossip bootstrap so a fresh
//! instance converges on global presence without a consistent datastore.
//! The two recovery paths are complementary: the snapshot gives fast bulk
//! recovery after a full outage, the bootstrap exchange corrects for
//! snapshot staleness between writes.

use crate::bus::{events_topic, MessageBus, SNAPSHOT_KEY};
use crate::connection::ResponseSender;
use crate::messaging::EventRouter;
use crate::world::{PlayerSession, WorldState};
use plaza_protocol::{Envelope, Event, InstanceId, PresenceSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

/// Periodic task reconciling in-memory presence with reality.
pub struct PresenceReconciler {
    instance_id: InstanceId,
    state: Arc<RwLock<WorldState>>,
    bus: Arc<dyn MessageBus>,
    router: Arc<EventRouter>,
    sink: Arc<dyn ResponseSender>,
    interval: Duration,
    events_topic: String,
}

impl PresenceReconciler {
    pub fn new(
        instance_id: InstanceId,
        state: Arc<RwLock<WorldState>>,
        bus: Arc<dyn MessageBus>,
        router: Arc<EventRouter>,
        sink: Arc<dyn ResponseSender>,
        interval: Duration,
        subject_prefix: &str,
    ) -> Self {
        Self {
            instance_id,
            state,
            bus,
            router,
            sink,
            interval,
            events_topic: events_topic(subject_prefix),
        }
    }

    /// Startup recovery: snapshot replay, then the bootstrap exchange.
    ///
    /// A missing or unreachable snapshot degrades to gossip-only recovery
    /// with a warning; an unreachable bus degrades to serving local clients
    /// only. Neither is fatal.
    pub async fn recover(&self) {
        match self.bus.get_snapshot(SNAPSHOT_KEY).await {
            Ok(Some(blob)) => match serde_json::from_slice::<PresenceSnapshot>(&blob) {
                Ok(snapshot) => self.replay_snapshot(snapshot).await,
                Err(e) => warn!("Ignoring undecodable presence snapshot: {e}"),
            },
            Ok(None) => info!("No presence snapshot available, relying on bootstrap exchange"),
            Err(e) => warn!("Snapshot slot unavailable at startup: {e}"),
        }

        let request = Envelope::from_instance(
            Event::BootstrapRequest {
                instance_id: self.instance_id,
            },
            self.instance_id,
        );
        match serde_json::to_vec(&request) {
            Ok(bytes) => {
                if let Err(e) = self.bus.publish(&self.events_topic, bytes).await {
                    warn!("Failed to publish bootstrap request: {e}");
                } else {
                    info!("🤝 Bootstrap request published");
                }
            }
            Err(e) => warn!("Failed to serialize bootstrap request: {e}"),
        }
    }

    /// Replays every recorded presence as a remote session. The owning
    /// instance still holds the real socket; this only rebuilds a locally
    /// useful view of the rooms.
    async fn replay_snapshot(&self, snapshot: PresenceSnapshot) {
        let mut restored = 0usize;
        {
            let mut state = self.state.write().await;
            for world in &snapshot.worlds {
                for record in &world.players {
                    let session = PlayerSession::from_snapshot(&world.world_id, record);
                    if state.enter(session, self.sink.as_ref()).is_some() {
                        restored += 1;
                    }
                }
            }
        }
        info!(
            "📦 Restored {restored} remote sessions from snapshot written by {}",
            snapshot.instance_id
        );
    }

    /// One liveness sweep: finds local sessions whose socket is no longer
    /// open and synthesizes their `leave_world` (applied and published).
    /// Returns how many sessions were swept.
    pub async fn run_sweep(&self) -> usize {
        let dead = {
            let state = self.state.read().await;
            state.dead_local_sessions(self.sink.as_ref())
        };
        for player_id in &dead {
            info!("🧹 Sweeping dead session for player {player_id}");
            self.router.synthesize_leave(player_id).await;
        }
        dead.len()
    }

    /// Exports the current local presence to the shared snapshot slot,
    /// overwriting the previous value. Last writer wins: the snapshot is a
    /// recovery aid, not a ledger.
    pub async fn export_snapshot(&self) {
        let worlds = { self.state.read().await.snapshot_worlds() };
        let snapshot = PresenceSnapshot {
            instance_id: self.instance_id,
            worlds,
        };
        match serde_json::to_vec(&snapshot) {
            Ok(blob) => {
                if let Err(e) = self.bus.set_snapshot(SNAPSHOT_KEY, blob).await {
                    warn!("Failed to export presence snapshot: {e}");
                } else {
                    trace!("Presence snapshot exported");
                }
            }
            Err(e) => warn!("Failed to serialize presence snapshot: {e}"),
        }
    }

    /// Spawns the interval loop, running sweep + export every tick until
    /// shutdown.
    pub fn spawn(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // interval fires immediately; recovery already ran, so skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_sweep().await;
                        self.export_snapshot().await;
                    }
                    _ = shutdown.recv() => {
                        info!("🕒 Presence reconciler stopping - shutdown initiated");
                        break;
                    }
                }
            }
        })
    }
}
