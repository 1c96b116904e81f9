//! Configuration management for the fleet orchestrator daemon.
//!
//! This module handles loading, validation, and conversion of orchestrator
//! configuration from TOML files and command-line arguments.

use fleet_orchestrator::OrchestratorConfig;
use fleet_orchestrator::playlist::RotatingPlaylist;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Default matchmaking poll tick in milliseconds
fn default_poll_interval_ms() -> u64 {
    250
}

/// Default per-call status query timeout in seconds
fn default_status_timeout_secs() -> u64 {
    5
}

fn default_admin_header() -> String {
    "x-admin-key".to_string()
}

fn default_max_players() -> u32 {
    50
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public surface settings
    pub orchestrator: OrchestratorSettings,
    /// Worker pool settings
    pub workers: WorkerSettings,
    /// Matchmaking loop settings
    #[serde(default)]
    pub matchmaking: MatchmakingSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Public-surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Network address the public port binds to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Environment name reported by `GET /api/env`
    pub game_env: Option<String>,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Number of worker processes; fixed for the orchestrator's lifetime
    pub count: usize,
    /// First worker port; worker `i` listens on `base_port + i`
    pub base_port: u16,
    /// Program used to launch each worker
    pub command: String,
    /// Arguments passed to the worker program
    #[serde(default)]
    pub args: Vec<String>,
    /// Header name carrying the shared admin token on control calls
    #[serde(default = "default_admin_header")]
    pub admin_header: String,
}

/// Matchmaking loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingSettings {
    /// Poll tick period in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per-lobby status query timeout in seconds
    #[serde(default = "default_status_timeout_secs")]
    pub status_timeout_secs: u64,
    /// Map rotation for scheduled public lobbies
    #[serde(default)]
    pub maps: Vec<String>,
    /// Player cap for scheduled public lobbies
    #[serde(default = "default_max_players")]
    pub max_players: u32,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            status_timeout_secs: default_status_timeout_secs(),
            maps: vec![],
            max_players: default_max_players(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorSettings {
                bind_address: "127.0.0.1:3000".to_string(),
                game_env: Some("dev".to_string()),
            },
            workers: WorkerSettings {
                count: 2,
                base_port: 3001,
                command: "fleet-worker".to_string(),
                args: vec![],
                admin_header: default_admin_header(),
            },
            matchmaking: MatchmakingSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at
    /// the specified path and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration into the orchestrator core's
    /// configuration type.
    pub fn to_orchestrator_config(&self) -> anyhow::Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            bind_address: self.orchestrator.bind_address.parse()?,
            num_workers: self.workers.count,
            worker_base_port: self.workers.base_port,
            worker_command: self.workers.command.clone(),
            worker_args: self.workers.args.clone(),
            admin_header: self.workers.admin_header.clone(),
            poll_interval: Duration::from_millis(self.matchmaking.poll_interval_ms),
            status_timeout: Duration::from_secs(self.matchmaking.status_timeout_secs),
            game_env: self.orchestrator.game_env.clone(),
        })
    }

    /// Builds the lobby playlist from the matchmaking settings.
    pub fn playlist(&self) -> RotatingPlaylist {
        if self.matchmaking.maps.is_empty() {
            RotatingPlaylist::default()
        } else {
            RotatingPlaylist::new(self.matchmaking.maps.clone(), self.matchmaking.max_players)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self
            .orchestrator
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(format!(
                "Invalid bind address: {}",
                &self.orchestrator.bind_address
            ));
        }

        if self.workers.count == 0 {
            return Err("Worker count must be at least 1".to_string());
        }
        if self.workers.command.is_empty() {
            return Err("Worker command cannot be empty".to_string());
        }
        if self.matchmaking.poll_interval_ms == 0 {
            return Err("Poll interval must be non-zero".to_string());
        }

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
