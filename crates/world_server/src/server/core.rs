//! Core world server implementation.
//!
//! This module contains the main `WorldServer` struct and its
//! implementation, providing the central orchestration of all server
//! components: the bus consumer, the presence reconciler, and the
//! WebSocket accept loop.

use crate::{
    bus::{events_topic, instance_topic, MessageBus},
    config::ServerConfig,
    connection::{ConnectionManager, ResponseSender, WorldResponseSender},
    error::ServerError,
    messaging::EventRouter,
    reconciler::PresenceReconciler,
    server::handlers::handle_connection,
    store::RecordStore,
    world::WorldState,
};
use plaza_protocol::InstanceId;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Aggregate counters for the monitoring loop.
#[derive(Debug, Clone, Copy)]
pub struct ServerStats {
    pub connections: usize,
    pub local_sessions: usize,
    pub remote_sessions: usize,
    pub rooms: usize,
}

/// The core world server structure.
///
/// `WorldServer` wires the presence components together: the connection
/// manager for sockets, the world state behind its single lock, the event
/// router, the bus adapter, and the presence reconciler. It is
/// deliberately free of game rules: movement validation and interest
/// management live in the world model, and everything else is
/// infrastructure.
///
/// # Concurrency
///
/// * One task per client connection (incoming + outgoing halves)
/// * One bus consumer task feeding the router
/// * One timer task for the reconciler
///
/// All of them funnel mutations through the shared `WorldState` lock, so
/// racing events for the same player serialize on one instance and
/// converge across instances by idempotent replay.
pub struct WorldServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Identifier of this instance, tagged onto every published envelope
    instance_id: InstanceId,

    /// Manager for client connections and outbound queueing
    connection_manager: Arc<ConnectionManager>,

    /// All presence state, behind the single coordinating lock
    state: Arc<RwLock<WorldState>>,

    /// Dispatcher for client-, bus-, and internally-originated envelopes
    router: Arc<EventRouter>,

    /// Periodic liveness sweep, snapshot export, and startup recovery
    reconciler: Arc<PresenceReconciler>,

    /// Message bus shared with peer instances
    bus: Arc<dyn MessageBus>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl WorldServer {
    /// Creates a new world server with the specified configuration,
    /// message bus, and record store.
    pub fn new(
        config: ServerConfig,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let instance_id = InstanceId::new();
        let connection_manager = Arc::new(ConnectionManager::new());
        let sink: Arc<dyn ResponseSender> =
            Arc::new(WorldResponseSender::new(connection_manager.clone()));
        let state = Arc::new(RwLock::new(WorldState::new(config.interest_radius)));

        let router = Arc::new(EventRouter::new(
            instance_id,
            state.clone(),
            bus.clone(),
            store,
            sink.clone(),
            &config.bus.subject_prefix,
        ));
        let reconciler = Arc::new(PresenceReconciler::new(
            instance_id,
            state.clone(),
            bus.clone(),
            router.clone(),
            sink,
            Duration::from_secs(config.reconcile_interval_secs),
            &config.bus.subject_prefix,
        ));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            instance_id,
            connection_manager,
            state,
            router,
            reconciler,
            bus,
            shutdown_sender,
        }
    }

    /// Starts the server and accepts connections until shutdown.
    ///
    /// # Startup Sequence
    ///
    /// 1. Subscribe to the shared event topic and this instance's direct
    ///    topic, feeding the router from a dedicated task
    /// 2. Run startup recovery (snapshot replay + bootstrap request)
    /// 3. Spawn the presence reconciler interval task
    /// 4. Bind the listener and accept connections
    ///
    /// A bus that is unreachable at startup downgrades to local-only
    /// service with a warning; presence resumes propagating when the bus
    /// client reconnects.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting world server on {}", self.config.bind_address);
        info!("🌐 Instance ID: {}", self.instance_id);

        let prefix = &self.config.bus.subject_prefix;
        let topics = vec![
            events_topic(prefix),
            instance_topic(prefix, self.instance_id),
        ];
        match self.bus.subscribe(&topics).await {
            Ok(mut receiver) => {
                let router = self.router.clone();
                let mut shutdown = self.shutdown_sender.subscribe();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            message = receiver.recv() => match message {
                                Some(message) => router.handle_bus_message(&message.payload).await,
                                None => {
                                    warn!("📡 Bus subscription stream ended");
                                    break;
                                }
                            },
                            _ = shutdown.recv() => break,
                        }
                    }
                });
                info!("📡 Subscribed to bus topics: {topics:?}");
            }
            Err(e) => {
                warn!("📡 Bus subscription unavailable, serving local clients only: {e}");
            }
        }

        self.reconciler.recover().await;
        let _reconciler_handle = self
            .reconciler
            .clone()
            .spawn(self.shutdown_sender.subscribe());
        info!(
            "🕒 Presence reconciler started with interval: {}s",
            self.config.reconcile_interval_secs
        );

        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| {
                ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address))
            })?;

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        if self.connection_manager.connection_count() >= self.config.max_connections {
                            warn!("🚫 Connection limit reached, rejecting {addr}");
                            continue;
                        }
                        let connection_manager = self.connection_manager.clone();
                        let router = self.router.clone();
                        let max_message_size = self.config.max_message_size;

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                addr,
                                connection_manager,
                                router,
                                max_message_size,
                            )
                            .await
                            {
                                error!("Connection error: {:?}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {e}");
                        break;
                    }
                },
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    /// Initiates server shutdown: accept loop, bus consumer, and
    /// reconciler all stop on the broadcast signal.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    /// Current aggregate counters.
    pub async fn stats(&self) -> ServerStats {
        let counts = { self.state.read().await.counts() };
        ServerStats {
            connections: self.connection_manager.connection_count(),
            local_sessions: counts.local_sessions,
            remote_sessions: counts.remote_sessions,
            rooms: counts.rooms,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Gets the event router, for components that inject envelopes
    /// directly (and for tests).
    pub fn event_router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    /// Gets the shared world state handle.
    pub fn world_state(&self) -> Arc<RwLock<WorldState>> {
        self.state.clone()
    }

    /// Gets the connection manager.
    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        self.connection_manager.clone()
    }

    /// Gets the presence reconciler.
    pub fn reconciler(&self) -> Arc<PresenceReconciler> {
        self.reconciler.clone()
    }
}
