//! Configuration management for the Plaza world server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use world_server::{BusConfig, ServerConfig};

/// Default reconcile interval for serde deserialization
fn default_reconcile_interval() -> u64 {
    10
}

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

/// Default for max_message_size
fn default_max_message_size() -> usize {
    64 * 1024
}

/// Default for interest_radius
fn default_interest_radius() -> f64 {
    500.0
}

fn default_bus_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_subject_prefix() -> String {
    "plaza".to_string()
}

fn default_snapshot_bucket() -> String {
    "plaza-presence".to_string()
}

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server
/// settings including networking, the message bus, the record store, and
/// logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Message bus configuration settings
    pub bus: BusSettings,
    /// Record store configuration settings
    #[serde(default)]
    pub store: StoreSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls network binding, connection limits, interest management, and
/// the presence reconciler cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum accepted client frame size in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Distance cutoff for movement broadcast fan-out
    #[serde(default = "default_interest_radius")]
    pub interest_radius: f64,
    /// Interval of the liveness sweep and snapshot export, in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

/// Message bus configuration.
///
/// All instances of one deployment must share the same endpoint, subject
/// prefix, and snapshot bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Bus endpoint URL
    #[serde(default = "default_bus_url")]
    pub url: String,
    /// Subject prefix for every topic of this deployment
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Key-value bucket holding the recovery snapshot
    #[serde(default = "default_snapshot_bucket")]
    pub snapshot_bucket: String,
    /// Use the in-process bus instead of a broker (single-instance mode)
    #[serde(default)]
    pub memory: bool,
}

/// Record store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Optional JSON seed file with `{players: [...], worlds: [...]}`.
    /// When absent, the built-in sample records are used.
    #[serde(default)]
    pub seed_path: Option<String>,
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    pub file_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:8080".to_string(),
                max_connections: default_max_connections(),
                max_message_size: default_max_message_size(),
                interest_radius: default_interest_radius(),
                reconcile_interval_secs: default_reconcile_interval(),
            },
            bus: BusSettings {
                url: default_bus_url(),
                subject_prefix: default_subject_prefix(),
                snapshot_bucket: default_snapshot_bucket(),
                memory: false,
            },
            store: StoreSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
                file_path: None,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config file
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration to a world server
    /// configuration.
    ///
    /// This method translates the TOML-based configuration into the types
    /// expected by the server core.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            max_message_size: self.server.max_message_size,
            interest_radius: self.server.interest_radius,
            reconcile_interval_secs: self.server.reconcile_interval_secs,
            bus: BusConfig {
                url: self.bus.url.clone(),
                subject_prefix: self.bus.subject_prefix.clone(),
                snapshot_bucket: self.bus.snapshot_bucket.clone(),
            },
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks the bind address, bus settings, interest management, and
    /// logging values. A failure here is fatal at startup; the process
    /// must never come up half-configured.
    pub fn validate(&self) -> Result<(), String> {
        // Validate bind address
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        // Validate bus settings (ignored entirely in memory mode)
        if !self.bus.memory {
            if self.bus.url.is_empty() {
                return Err("Bus URL cannot be empty".to_string());
            }
            if !self.bus.url.contains("://") {
                return Err(format!("Bus URL has no scheme: {}", &self.bus.url));
            }
        }
        if self.bus.subject_prefix.is_empty() {
            return Err("Bus subject prefix cannot be empty".to_string());
        }

        if self.server.interest_radius <= 0.0 {
            return Err("Interest radius must be greater than 0".to_string());
        }

        if self.server.reconcile_interval_secs == 0 {
            return Err("Reconcile interval must be greater than 0".to_string());
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
