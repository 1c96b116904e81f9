//! Orchestrator configuration types and defaults.
//!
//! This module contains the configuration structure used to initialize the
//! orchestrator: the public bind address, the worker pool shape, the worker
//! launch command, and the matchmaking poll cadence.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the fleet orchestrator.
///
/// Pool size is fixed for the process lifetime: changing it invalidates
/// existing game-ID routings, so there is deliberately no way to resize a
/// running pool.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The public socket address all external traffic enters on
    pub bind_address: SocketAddr,

    /// Number of worker processes in the pool
    pub num_workers: usize,

    /// First worker port; worker `i` listens on `worker_base_port + i`
    pub worker_base_port: u16,

    /// Program used to launch each worker process
    pub worker_command: String,

    /// Arguments passed to the worker program
    pub worker_args: Vec<String>,

    /// Header name carrying the shared admin token on orchestrator-to-worker
    /// control calls
    pub admin_header: String,

    /// Matchmaking poll tick period; sub-second so a zero-lobby condition is
    /// remedied with low latency
    pub poll_interval: Duration,

    /// Hard timeout applied to each per-lobby status query
    pub status_timeout: Duration,

    /// Environment name reported by `GET /api/env` (500 when unset)
    pub game_env: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".parse().expect("Attempted to use OrchestratorConfig::default(), but field `bind_address` is not parsable in the source code"),
            num_workers: 2,
            worker_base_port: 3001,
            worker_command: "fleet-worker".to_string(),
            worker_args: vec![],
            admin_header: "x-admin-key".to_string(),
            poll_interval: Duration::from_millis(250),
            status_timeout: Duration::from_secs(5),
            game_env: None,
        }
    }
}

impl OrchestratorConfig {
    /// Basic consistency checks before the orchestrator starts.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_workers == 0 {
            return Err("num_workers must be at least 1".to_string());
        }
        if self.worker_base_port as usize + self.num_workers > u16::MAX as usize {
            return Err(format!(
                "worker port range {}..{} exceeds the maximum port number",
                self.worker_base_port,
                self.worker_base_port as usize + self.num_workers
            ));
        }
        if self.worker_command.is_empty() {
            return Err("worker_command cannot be empty".to_string());
        }
        if self.admin_header.is_empty() {
            return Err("admin_header cannot be empty".to_string());
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be non-zero".to_string());
        }
        Ok(())
    }
}
