//! Public lobby state: wire types, the tracked-lobby registry, and the
//! published listing cache.
//!
//! The orchestrator exclusively owns the set of tracked lobby IDs and the
//! serialized listing; workers exclusively own the lobbies themselves. The
//! listing is a cache that may be stale between aggregation cycles.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Lobby configuration as produced by the playlist generator and echoed back
/// by workers.
///
/// Only `max_players` is interpreted by the orchestrator (for the lobby-full
/// removal rule); everything else passes through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// Maximum number of players the lobby accepts
    #[serde(rename = "maxPlayers", skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,

    /// Remaining configuration fields, relayed without interpretation
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One lobby's status as self-reported by its owning worker
/// (`GET /api/game/{id}`).
///
/// Fields other than the identifier are optional on the wire; defaulting
/// rules live in [`LobbySnapshot::derive`].
#[derive(Debug, Clone, Deserialize)]
pub struct LobbyStatus {
    /// The lobby identifier
    #[serde(rename = "gameID")]
    pub game_id: String,

    /// Currently connected clients
    #[serde(default)]
    pub clients: Option<Vec<serde_json::Value>>,

    /// Effective lobby configuration
    #[serde(rename = "gameConfig")]
    pub game_config: Option<GameConfig>,

    /// Absolute epoch milliseconds at which the lobby starts
    #[serde(rename = "msUntilStart")]
    pub ms_until_start: Option<u64>,
}

/// Cached view of one lobby's public state, rebuilt wholesale every
/// aggregation cycle and never partially mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySnapshot {
    /// The lobby identifier
    #[serde(rename = "gameID")]
    pub game_id: String,

    /// Connected client count (0 when the worker omitted the field)
    #[serde(rename = "numClients")]
    pub num_clients: u32,

    /// Effective lobby configuration
    #[serde(rename = "gameConfig", skip_serializing_if = "Option::is_none")]
    pub game_config: Option<GameConfig>,

    /// Milliseconds until the lobby starts; non-positive once it should
    /// already have started
    #[serde(rename = "msUntilStart")]
    pub ms_until_start: i64,
}

impl LobbySnapshot {
    /// Derives a snapshot from a worker status report.
    ///
    /// Client count defaults to 0 when absent. Time-until-start is the
    /// reported absolute start time (or `now_ms` when absent) minus
    /// `now_ms`, so it is always present and becomes non-positive once the
    /// lobby should have started.
    pub fn derive(status: LobbyStatus, now_ms: u64) -> Self {
        let num_clients = status
            .clients
            .as_ref()
            .map(|clients| clients.len() as u32)
            .unwrap_or(0);
        let start_ms = status.ms_until_start.unwrap_or(now_ms);
        Self {
            game_id: status.game_id,
            num_clients,
            game_config: status.game_config,
            ms_until_start: start_ms as i64 - now_ms as i64,
        }
    }

    /// Whether the lobby should be dropped from the public listing.
    ///
    /// A lobby that starts within 250ms is effectively started and no longer
    /// joinable; a lobby whose client count has reached its configured
    /// maximum is full. The full check is a no-op when the worker reported
    /// no maximum.
    pub fn should_retire(&self) -> bool {
        if self.ms_until_start <= 250 {
            return true;
        }
        match self.game_config.as_ref().and_then(|c| c.max_players) {
            Some(max) => self.num_clients >= max,
            None => false,
        }
    }
}

/// Current epoch time in milliseconds, the time base for snapshot
/// derivation.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Thread-safe registry of tracked public lobbies and the published listing.
///
/// Membership in the tracked set means "believed still open". The listing
/// string is replaced wholesale after each aggregation cycle; concurrent
/// readers either see the previous complete cycle or the new one, never a
/// partial mix.
pub struct LobbyRegistry {
    tracked: DashSet<String>,
    listing: RwLock<Arc<String>>,
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyRegistry {
    /// Creates an empty registry with an empty published listing.
    pub fn new() -> Self {
        Self {
            tracked: DashSet::new(),
            listing: RwLock::new(Arc::new(r#"{"lobbies":[]}"#.to_string())),
        }
    }

    /// Starts tracking a lobby identifier.
    pub fn track(&self, game_id: String) {
        self.tracked.insert(game_id);
    }

    /// Stops tracking a lobby identifier.
    pub fn untrack(&self, game_id: &str) {
        self.tracked.remove(game_id);
    }

    /// Number of lobbies currently tracked.
    pub fn count(&self) -> usize {
        self.tracked.len()
    }

    /// Whether the identifier is currently tracked.
    pub fn is_tracked(&self, game_id: &str) -> bool {
        self.tracked.contains(game_id)
    }

    /// Snapshot of the tracked identifiers, taken at call start so the
    /// aggregator never iterates a set it is mutating.
    pub fn snapshot_ids(&self) -> Vec<String> {
        self.tracked.iter().map(|id| id.key().clone()).collect()
    }

    /// Serializes the surviving snapshots and replaces the published
    /// listing wholesale.
    pub async fn publish(&self, snapshots: &[LobbySnapshot]) {
        let listing = serde_json::json!({ "lobbies": snapshots }).to_string();
        *self.listing.write().await = Arc::new(listing);
    }

    /// The listing from the last successful aggregation cycle.
    pub async fn listing(&self) -> Arc<String> {
        self.listing.read().await.clone()
    }
}
