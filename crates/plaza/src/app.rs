//! Main application logic and lifecycle management.
//!
//! This module contains the core `Application` struct that orchestrates
//! server startup, monitoring, and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use world_server::bus::{MemoryBusHub, MessageBus, NatsBus};
use world_server::store::{MemoryStore, RecordStore};
use world_server::WorldServer;

/// Main application struct managing the complete lifecycle of the Plaza
/// server: configuration loading, bus and store construction, server
/// startup, health monitoring, and graceful shutdown handling.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// World server instance
    server: WorldServer,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// Loads configuration, applies CLI overrides, validates settings, and
    /// initializes the world server with its bus and record store.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration; any failure here is fatal
    /// 4. Display startup banner
    /// 5. Construct the record store (seed file or built-in samples)
    /// 6. Connect the message bus (NATS, or in-process in memory mode)
    /// 7. Initialize the world server
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        // Apply CLI overrides
        if let Some(bind_address) = args.bind_address {
            config.server.bind_address = bind_address;
        }

        if let Some(bus_url) = args.bus_url {
            config.bus.url = bus_url;
        }

        if args.memory_bus {
            config.bus.memory = true;
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        // Validate configuration; a bad bus URL or bind address must stop
        // the process here, never mid-run.
        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        // Display banner after logging is setup
        display_banner();

        let store: Arc<dyn RecordStore> = match &config.store.seed_path {
            Some(path) => {
                let store = MemoryStore::from_seed_file(path).await?;
                info!(
                    "🗄️ Record store seeded from {path}: {} players, {} worlds",
                    store.player_count(),
                    store.world_count()
                );
                Arc::new(store)
            }
            None => {
                let store = MemoryStore::with_sample_data();
                info!(
                    "🗄️ Record store using built-in samples: {} players, {} worlds",
                    store.player_count(),
                    store.world_count()
                );
                Arc::new(store)
            }
        };

        let server_config = config.to_server_config()?;
        let bus: Arc<dyn MessageBus> = if config.bus.memory {
            info!("🚌 Using in-process message bus (single-instance mode)");
            Arc::new(MemoryBusHub::new().handle(&config.bus.subject_prefix))
        } else {
            info!("🚌 Connecting message bus at {}", config.bus.url);
            Arc::new(NatsBus::connect(&server_config.bus).await?)
        };

        let server = WorldServer::new(server_config, bus, store);

        info!("🚀 Plaza World Server v{}", env!("CARGO_PKG_VERSION"));
        info!("🏗️ Architecture: WebSocket edge + shared event bus + presence reconciler");
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self { config, server })
    }

    /// Runs the application until a shutdown signal arrives.
    ///
    /// Starts the server in the background, reports health statistics every
    /// 60 seconds, and performs a bounded-time graceful shutdown when a
    /// signal is received.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Plaza Server Application");

        self.log_configuration_summary();

        let server = Arc::new(self.server);

        // Start server in background
        let server_handle = {
            let server = server.clone();
            tokio::spawn(async move {
                match server.start().await {
                    Ok(()) => info!("✅ Server completed successfully"),
                    Err(e) => {
                        error!("❌ Server error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            })
        };

        // Start monitoring task for real-time statistics
        let monitoring_handle = {
            let server = server.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(60));
                interval.tick().await; // skip the immediate first tick

                loop {
                    interval.tick().await;
                    let stats = server.stats().await;
                    info!(
                        "📊 System Health - {} connections | {} local / {} remote sessions | {} rooms",
                        stats.connections,
                        stats.local_sessions,
                        stats.remote_sessions,
                        stats.rooms
                    );
                }
            })
        };

        info!("✅ Plaza Server is now running!");
        info!(
            "🎮 Ready to accept connections on {}",
            self.config.server.bind_address
        );
        info!("🔍 Health monitoring active - stats every 60 seconds");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        // Wait for shutdown signal
        wait_for_shutdown_signal().await?;

        // A second signal skips the graceful path entirely.
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up second-signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("🛑 Shutdown signal received, beginning graceful shutdown...");

        monitoring_handle.abort();
        server.shutdown().await?;

        info!("⏳ Waiting for server task to complete gracefully...");
        match tokio::time::timeout(tokio::time::Duration::from_secs(8), server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(e) => warn!(
                "⏰ Server task did not complete within timeout, proceeding with cleanup: {e:?}"
            ),
        }

        // Give time for connection cleanup
        info!("⏳ Waiting for connections to close...");
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

        let final_stats = server.stats().await;
        info!("📊 Final Statistics:");
        info!("  - Open connections: {}", final_stats.connections);
        info!(
            "  - Sessions: {} local / {} remote",
            final_stats.local_sessions, final_stats.remote_sessions
        );
        info!("  - Rooms: {}", final_stats.rooms);

        info!("✅ Plaza server shutdown complete");
        info!("👋 Thank you for using Plaza!");

        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!(
            "  🚌 Bus: {}",
            if self.config.bus.memory {
                "in-process (single instance)".to_string()
            } else {
                self.config.bus.url.clone()
            }
        );
        info!("  🧭 Interest radius: {:.0} units", self.config.server.interest_radius);
        info!(
            "  🕒 Reconcile interval: {}s",
            self.config.server.reconcile_interval_secs
        );
        info!("  👥 Max connections: {}", self.config.server.max_connections);
    }
}
