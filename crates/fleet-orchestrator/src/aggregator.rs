//! Lobby aggregation: fan-out status queries and the published listing.
//!
//! Every poll cycle the aggregator asks each tracked lobby's owning worker
//! for that lobby's status, merges the self-reports into one cluster-wide
//! view, and prunes entries that are finished, full, or unreachable. Each
//! query fails independently - a single slow or dead worker never blocks or
//! corrupts the other lobbies' results.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::lobby::{epoch_ms, LobbyRegistry, LobbySnapshot, LobbyStatus};
use crate::routing;
use crate::secret::AdminToken;

/// Polls workers for lobby status and republishes the aggregated listing.
pub struct LobbyAggregator {
    config: Arc<OrchestratorConfig>,
    token: AdminToken,
    registry: Arc<LobbyRegistry>,
    client: reqwest::Client,
}

impl LobbyAggregator {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        token: AdminToken,
        registry: Arc<LobbyRegistry>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            token,
            registry,
            client,
        }
    }

    /// Runs one full aggregation cycle.
    ///
    /// Snapshots the tracked set at call start, queries every lobby's owning
    /// worker concurrently, removes lobbies that failed, are about to start,
    /// or are full, and replaces the published listing wholesale with the
    /// survivors. Returns the number of lobbies still tracked, which drives
    /// the scheduler.
    pub async fn aggregate(&self) -> usize {
        let ids = self.registry.snapshot_ids();
        if ids.is_empty() {
            self.registry.publish(&[]).await;
            return 0;
        }

        let queries = ids.iter().map(|id| self.fetch_status(id));
        let results = join_all(queries).await;

        let now_ms = epoch_ms();
        let mut snapshots = Vec::with_capacity(ids.len());
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(status) => {
                    let snapshot = LobbySnapshot::derive(status, now_ms);
                    if snapshot.should_retire() {
                        debug!(
                            "Retiring lobby {id}: starts in {}ms, {} client(s)",
                            snapshot.ms_until_start, snapshot.num_clients
                        );
                        self.registry.untrack(id);
                    } else {
                        snapshots.push(snapshot);
                    }
                }
                Err(e) => {
                    warn!("Dropping unreachable lobby {id}: {e}");
                    self.registry.untrack(id);
                }
            }
        }

        self.registry.publish(&snapshots).await;
        self.registry.count()
    }

    /// Authenticated status query to the lobby's owning worker, bounded by
    /// the configured per-call timeout. A non-2xx response is a failure like
    /// any other.
    async fn fetch_status(&self, game_id: &str) -> Result<LobbyStatus, FleetError> {
        let index = routing::worker_index(game_id, self.config.num_workers);
        let port = routing::worker_port(self.config.worker_base_port, index);
        let url = format!("http://127.0.0.1:{port}/api/game/{game_id}");

        let response = self
            .client
            .get(&url)
            .header(self.config.admin_header.as_str(), self.token.expose())
            .timeout(self.config.status_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FleetError::Network(format!(
                "Worker {index} returned {} for lobby {game_id}",
                response.status()
            )));
        }

        Ok(response.json::<LobbyStatus>().await?)
    }
}
