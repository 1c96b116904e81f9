//! Worker pool supervision: process launch, readiness tracking, and
//! crash-restart with identity preservation.
//!
//! Each worker index is owned by a dedicated supervision task for the
//! lifetime of the orchestrator. The task launches the worker process with
//! its identity injected through the environment, relays the child's stdout
//! control channel, and relaunches the process under the same index
//! whenever it exits - so a crashed worker can never come back under a
//! different identity.
//!
//! Restarts are unlimited in count but paced by exponential backoff (250ms
//! doubling to a 10s ceiling, reset once a worker stays up for 30s), so a
//! worker that dies on every launch cannot pin a CPU with a tight
//! relaunch loop.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::routing;
use crate::secret::AdminToken;

/// Environment variable carrying the worker's assigned index.
pub const ENV_WORKER_INDEX: &str = "FLEET_WORKER_INDEX";
/// Environment variable carrying the worker's assigned listen port.
pub const ENV_WORKER_PORT: &str = "FLEET_WORKER_PORT";
/// Environment variable carrying the shared admin token.
pub const ENV_ADMIN_TOKEN: &str = "FLEET_ADMIN_TOKEN";

/// Initial delay before relaunching a crashed worker.
const RESTART_BACKOFF_FLOOR: Duration = Duration::from_millis(250);
/// Maximum relaunch delay.
const RESTART_BACKOFF_CEILING: Duration = Duration::from_secs(10);
/// Uptime after which a worker is considered healthy and its backoff resets.
const HEALTHY_UPTIME: Duration = Duration::from_secs(30);

/// Message a worker sends the orchestrator over the out-of-band control
/// channel (one JSON object per stdout line).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// The worker has completed boot and its listener is up.
    Ready {
        /// The worker's assigned index
        index: usize,
    },
}

/// Supervises a fixed pool of worker processes.
///
/// The pool-ready event fires exactly once per orchestrator run, after
/// every one of the N workers has signaled ready, regardless of arrival
/// order. Workers that crash later do not un-fire it; the readiness set
/// only ever grows.
pub struct WorkerPool {
    config: Arc<OrchestratorConfig>,
    token: AdminToken,
    readiness: Arc<DashSet<usize>>,
    pool_ready: watch::Sender<bool>,
    control_events: broadcast::Sender<ControlMessage>,
    shutdown: broadcast::Sender<()>,
}

impl WorkerPool {
    /// Creates a pool supervisor; no processes are launched until
    /// [`WorkerPool::start`].
    pub fn new(
        config: Arc<OrchestratorConfig>,
        token: AdminToken,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        let (pool_ready, _) = watch::channel(false);
        let (control_events, _) = broadcast::channel(64);
        Self {
            config,
            token,
            readiness: Arc::new(DashSet::new()),
            pool_ready,
            control_events,
            shutdown,
        }
    }

    /// Launches one supervision task per worker index.
    ///
    /// A failure to spawn the initial process for an index is a hard error:
    /// per the launch contract it is not retried here and propagates to the
    /// caller.
    pub fn start(&self) -> Result<(), FleetError> {
        info!(
            "Launching worker pool: {} worker(s), ports {}..={}",
            self.config.num_workers,
            self.config.worker_base_port,
            routing::worker_port(self.config.worker_base_port, self.config.num_workers - 1),
        );
        for index in 0..self.config.num_workers {
            let child = self.spawn_worker(index)?;
            let supervisor = WorkerSupervisor {
                config: self.config.clone(),
                token: self.token.clone(),
                readiness: self.readiness.clone(),
                pool_ready: self.pool_ready.clone(),
                control_events: self.control_events.clone(),
                shutdown: self.shutdown.subscribe(),
                index,
            };
            tokio::spawn(supervisor.run(child));
        }
        Ok(())
    }

    /// Watch channel that flips to `true` when the pool becomes ready.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.pool_ready.subscribe()
    }

    /// Waits until every worker has signaled ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.pool_ready.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of workers that have signaled ready so far.
    pub fn ready_count(&self) -> usize {
        self.readiness.len()
    }

    /// Subscribes to control messages as they arrive from workers.
    pub fn subscribe_control(&self) -> broadcast::Receiver<ControlMessage> {
        self.control_events.subscribe()
    }

    fn spawn_worker(&self, index: usize) -> Result<Child, FleetError> {
        spawn_worker(&self.config, &self.token, index)
    }
}

/// Launches the worker process for `index` with its identity and the shared
/// token injected through the environment, stdout piped as the control
/// channel.
fn spawn_worker(
    config: &OrchestratorConfig,
    token: &AdminToken,
    index: usize,
) -> Result<Child, FleetError> {
    let port = routing::worker_port(config.worker_base_port, index);
    Command::new(&config.worker_command)
        .args(&config.worker_args)
        .env(ENV_WORKER_INDEX, index.to_string())
        .env(ENV_WORKER_PORT, port.to_string())
        .env(ENV_ADMIN_TOKEN, token.expose())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FleetError::Worker(format!("Failed to launch worker {index}: {e}")))
}

/// Per-index supervision task state.
struct WorkerSupervisor {
    config: Arc<OrchestratorConfig>,
    token: AdminToken,
    readiness: Arc<DashSet<usize>>,
    pool_ready: watch::Sender<bool>,
    control_events: broadcast::Sender<ControlMessage>,
    shutdown: broadcast::Receiver<()>,
    index: usize,
}

impl WorkerSupervisor {
    /// Supervises one worker index until orchestrator shutdown: relays the
    /// control channel, and relaunches the process with the same index and
    /// token on every exit.
    async fn run(mut self, first_child: Child) {
        let mut child = Some(first_child);
        let mut backoff = RESTART_BACKOFF_FLOOR;

        loop {
            let mut current = match child.take() {
                Some(c) => c,
                None => match spawn_worker(&self.config, &self.token, self.index) {
                    Ok(c) => c,
                    Err(e) => {
                        // Relaunch failures stay on the backoff path rather
                        // than abandoning the index.
                        error!("{e}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RESTART_BACKOFF_CEILING);
                        continue;
                    }
                },
            };
            let launched_at = Instant::now();
            debug!("Worker {} launched (pid {:?})", self.index, current.id());

            let status = self.monitor(&mut current).await;
            let status = match status {
                Monitored::Exited(status) => status,
                Monitored::Shutdown => {
                    current.kill().await.ok();
                    return;
                }
            };

            match status {
                Ok(status) => warn!("Worker {} exited: {status}", self.index),
                Err(e) => error!("Worker {} wait failed: {e}", self.index),
            }

            if launched_at.elapsed() >= HEALTHY_UPTIME {
                backoff = RESTART_BACKOFF_FLOOR;
            }
            warn!(
                "Restarting worker {} with the same identity in {:?}",
                self.index, backoff
            );
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(RESTART_BACKOFF_CEILING);
        }
    }

    /// Relays control lines until the child exits or shutdown is requested.
    async fn monitor(&mut self, child: &mut Child) -> Monitored {
        let stdout = child.stdout.take();
        let mut lines = stdout.map(|out| BufReader::new(out).lines());

        loop {
            tokio::select! {
                line = next_line(&mut lines) => match line {
                    Some(line) => self.handle_control_line(&line),
                    // Control channel closed; keep waiting for the exit.
                    None => {
                        tokio::select! {
                            status = child.wait() => return Monitored::Exited(status),
                            _ = self.shutdown.recv() => return Monitored::Shutdown,
                        }
                    }
                },
                status = child.wait() => return Monitored::Exited(status),
                _ = self.shutdown.recv() => return Monitored::Shutdown,
            }
        }
    }

    fn handle_control_line(&self, line: &str) {
        match serde_json::from_str::<ControlMessage>(line) {
            Ok(message) => {
                if let ControlMessage::Ready { index } = &message {
                    if *index != self.index {
                        warn!(
                            "Worker {} sent ready signal claiming index {index}; using its assigned identity",
                            self.index
                        );
                    }
                    mark_ready(
                        &self.readiness,
                        &self.pool_ready,
                        self.index,
                        self.config.num_workers,
                    );
                }
                let _ = self.control_events.send(message);
            }
            // Anything that isn't a control message is worker log output.
            Err(_) => debug!("Worker {} stdout: {line}", self.index),
        }
    }
}

enum Monitored {
    Exited(std::io::Result<std::process::ExitStatus>),
    Shutdown,
}

async fn next_line(
    lines: &mut Option<tokio::io::Lines<BufReader<tokio::process::ChildStdout>>>,
) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        // No stdout to read; park this branch forever so select polls the
        // exit and shutdown branches.
        None => std::future::pending().await,
    }
}

/// Records a worker's readiness and fires the pool-ready event when the set
/// reaches the full pool size. The event fires at most once per run.
fn mark_ready(
    readiness: &DashSet<usize>,
    pool_ready: &watch::Sender<bool>,
    index: usize,
    num_workers: usize,
) {
    if readiness.insert(index) {
        info!("Worker {index} ready ({}/{num_workers})", readiness.len());
    }
    if readiness.len() >= num_workers && !*pool_ready.borrow() {
        info!("All {num_workers} workers ready - pool is up");
        pool_ready.send_replace(true);
    }
}
