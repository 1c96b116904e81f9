//! Lobby scheduling: keeps a public lobby joinable whenever the aggregated
//! count drops to zero.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::lobby::LobbyRegistry;
use crate::playlist::Playlist;
use crate::routing;
use crate::secret::AdminToken;

/// Creates new public lobbies when the cluster has none.
pub struct LobbyScheduler {
    config: Arc<OrchestratorConfig>,
    token: AdminToken,
    registry: Arc<LobbyRegistry>,
    playlist: Arc<dyn Playlist>,
    client: reqwest::Client,
}

impl LobbyScheduler {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        token: AdminToken,
        registry: Arc<LobbyRegistry>,
        playlist: Arc<dyn Playlist>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            token,
            registry,
            playlist,
            client,
        }
    }

    /// Schedules exactly one new lobby if no lobbies are currently tracked.
    ///
    /// The fresh identifier is registered *before* the create call is
    /// confirmed: a create failure leaves an orphaned tracked ID that the
    /// next aggregation cycle prunes through its failure path. This trades a
    /// short-lived inconsistent listing for simplicity and is intentional -
    /// do not make registration transactional.
    pub async fn maybe_schedule(&self, tracked: usize) -> Result<(), FleetError> {
        if tracked != 0 {
            return Ok(());
        }

        let game_id = Uuid::new_v4().simple().to_string();
        let index = routing::worker_index(&game_id, self.config.num_workers);
        let port = routing::worker_port(self.config.worker_base_port, index);
        self.registry.track(game_id.clone());

        let config = self.playlist.next_config();
        info!("Scheduling public lobby {game_id} on worker {index}");

        let url = format!("http://127.0.0.1:{port}/api/create_game/{game_id}");
        let response = self
            .client
            .post(&url)
            .header(self.config.admin_header.as_str(), self.token.expose())
            .timeout(self.config.status_timeout)
            .json(&config)
            .send()
            .await
            .map_err(|e| {
                FleetError::Scheduling(format!("Create call for lobby {game_id} failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(FleetError::Scheduling(format!(
                "Worker {index} rejected lobby {game_id}: {}",
                response.status()
            )));
        }

        Ok(())
    }
}
