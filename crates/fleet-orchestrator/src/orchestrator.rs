//! The orchestrator core: the single owning instance of all shared state.
//!
//! `FleetOrchestrator` wires the worker pool, the matchmaking loop
//! (aggregator + scheduler), and the public proxy together. All mutable
//! shared state - the tracked-lobby set, the readiness set, the published
//! listing - lives behind this one instance; there are no ambient globals.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

use crate::aggregator::LobbyAggregator;
use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::lobby::LobbyRegistry;
use crate::playlist::{Playlist, RotatingPlaylist};
use crate::proxy::RequestProxy;
use crate::scheduler::LobbyScheduler;
use crate::secret::AdminToken;
use crate::supervisor::WorkerPool;

/// The coordinating process core.
///
/// # Startup sequence
///
/// 1. Mint the shared admin token (once per run)
/// 2. Launch the worker pool; each worker gets its index, port, and the
///    token through its environment
/// 3. Once every worker has signaled ready, start the matchmaking loop
/// 4. Serve the public proxy until shutdown
pub struct FleetOrchestrator {
    config: Arc<OrchestratorConfig>,
    registry: Arc<LobbyRegistry>,
    pool: WorkerPool,
    aggregator: Arc<LobbyAggregator>,
    scheduler: Arc<LobbyScheduler>,
    shutdown_sender: broadcast::Sender<()>,
}

impl FleetOrchestrator {
    /// Creates an orchestrator with the default rotating playlist.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self::with_playlist(config, Arc::new(RotatingPlaylist::default()))
    }

    /// Creates an orchestrator drawing lobby configurations from a custom
    /// playlist generator.
    pub fn with_playlist(config: OrchestratorConfig, playlist: Arc<dyn Playlist>) -> Self {
        let config = Arc::new(config);
        let token = AdminToken::mint();
        let registry = Arc::new(LobbyRegistry::new());
        let (shutdown_sender, _) = broadcast::channel(1);
        let client = reqwest::Client::new();

        let pool = WorkerPool::new(config.clone(), token.clone(), shutdown_sender.clone());
        let aggregator = Arc::new(LobbyAggregator::new(
            config.clone(),
            token.clone(),
            registry.clone(),
            client.clone(),
        ));
        let scheduler = Arc::new(LobbyScheduler::new(
            config.clone(),
            token,
            registry.clone(),
            playlist,
            client,
        ));

        Self {
            config,
            registry,
            pool,
            aggregator,
            scheduler,
            shutdown_sender,
        }
    }

    /// Runs the orchestrator until shutdown: worker pool up, matchmaking
    /// loop gated on pool-ready, proxy serving the public port.
    pub async fn start(&self) -> Result<(), FleetError> {
        info!("Starting fleet orchestrator on {}", self.config.bind_address);
        self.pool.start()?;
        self.spawn_matchmaking();
        let proxy = self.bind_proxy()?;
        proxy.serve().await
    }

    /// Binds the public proxy without serving yet.
    pub fn bind_proxy(&self) -> Result<RequestProxy, FleetError> {
        RequestProxy::bind(
            self.config.clone(),
            self.registry.clone(),
            self.shutdown_sender.clone(),
        )
    }

    /// Starts the poll loop that aggregates lobby status and schedules
    /// replacements, once the pool is ready.
    ///
    /// The scheduler's zero-check is deliberately not atomic with a
    /// concurrently finishing aggregation cycle; a lobby created against a
    /// stale zero-count is reconciled by the next cycle.
    pub fn spawn_matchmaking(&self) {
        let mut ready = self.pool.ready();
        let mut shutdown_rx = self.shutdown_sender.subscribe();
        let aggregator = self.aggregator.clone();
        let scheduler = self.scheduler.clone();
        let poll_interval = self.config.poll_interval;

        tokio::spawn(async move {
            while !*ready.borrow() {
                tokio::select! {
                    changed = ready.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = shutdown_rx.recv() => return,
                }
            }
            info!("Pool ready - matchmaking loop starting");

            let mut ticker = interval(poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let tracked = aggregator.aggregate().await;
                        if let Err(e) = scheduler.maybe_schedule(tracked).await {
                            // Scheduling failures do not stop the loop; the
                            // tracked ID self-heals next cycle.
                            warn!("{e}");
                        }
                    }
                    _ = shutdown_rx.recv() => return,
                }
            }
        });
    }

    /// Initiates orchestrator shutdown: workers are killed, loops stop,
    /// the proxy drains.
    pub fn shutdown(&self) {
        info!("Shutting down orchestrator");
        let _ = self.shutdown_sender.send(());
    }

    /// The worker pool supervisor.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The tracked-lobby registry and listing cache.
    pub fn registry(&self) -> Arc<LobbyRegistry> {
        self.registry.clone()
    }

    /// The lobby aggregator.
    pub fn aggregator(&self) -> Arc<LobbyAggregator> {
        self.aggregator.clone()
    }

    /// The lobby scheduler.
    pub fn scheduler(&self) -> Arc<LobbyScheduler> {
        self.scheduler.clone()
    }
}
