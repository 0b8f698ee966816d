//! # Plaza World Server - Main Entry Point
//!
//! Distributed presence backend for a real-time multiplayer town. This
//! entry point handles CLI parsing, configuration loading, and application
//! lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! plaza
//!
//! # Specify custom configuration
//! plaza --config production.toml
//!
//! # Override specific settings
//! plaza --bind 0.0.0.0:8080 --bus-url nats://bus:4222 --log-level debug
//!
//! # Single-instance mode without a broker
//! plaza --memory-bus
//!
//! # JSON logging for production
//! plaza --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default:
//! `config.toml`). If the file doesn't exist, a default configuration will
//! be created. An unusable bus URL or bind address is a fatal startup
//! error; nothing fails fatally once the server is serving.
//!
//! ## Signal Handling
//!
//! The server shuts down gracefully on:
//! - SIGINT (Ctrl+C)
//! - SIGTERM (Unix systems)

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Main entry point for the Plaza world server.
///
/// Handles the complete application lifecycle including:
/// 1. Command-line argument parsing
/// 2. Configuration loading and validation
/// 3. Logging system initialization
/// 4. Application creation and execution
/// 5. Error handling and cleanup
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments first
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    // Setup logging before anything else
    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    // Create and run application
    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
