//! # Fleet Orchestrator - Worker Pool and Matchmaking Infrastructure
//!
//! A single coordinating process that supervises a fixed pool of isolated
//! game-simulation worker processes, routes all inbound traffic (plain HTTP
//! and WebSocket upgrades) to the correct worker, and continuously schedules
//! and retires public matchmaking lobbies across the pool.
//!
//! ## Design Philosophy
//!
//! The orchestrator contains **no game logic** - it only provides
//! infrastructure around independently owned worker processes:
//!
//! * **Routing** - Deterministic game-ID to worker addressing
//! * **Worker supervision** - Process launch, readiness tracking, and
//!   crash-restart with identity preservation
//! * **Lobby aggregation** - Cluster-wide public lobby view rebuilt from
//!   worker self-reports every poll cycle
//! * **Lobby scheduling** - Keeps at least one public lobby joinable at
//!   (almost) all times
//! * **Request proxying** - Byte-level relay of HTTP and WebSocket traffic
//!   to the owning worker
//!
//! Each worker exclusively owns its lobby and simulation state; the
//! orchestrator holds only a cache that may be stale between poll cycles.
//!
//! ## Component Overview
//!
//! * [`FleetOrchestrator`] - the single owning instance wiring everything
//! * [`routing`] - pure addressing functions
//! * [`supervisor::WorkerPool`] - process lifecycle management
//! * [`aggregator::LobbyAggregator`] - status fan-out and listing republish
//! * [`scheduler::LobbyScheduler`] - zero-lobby detection and creation
//! * [`proxy::RequestProxy`] - the public HTTP/WebSocket surface
//!
//! ## Thread Safety
//!
//! All shared state is owned by the orchestrator and safe under concurrent
//! access: the tracked-lobby set and readiness set are `DashSet`s, and the
//! published listing is an `Arc<String>` replaced wholesale behind an async
//! `RwLock` - readers never observe a partially aggregated cycle.

pub use config::OrchestratorConfig;
pub use error::FleetError;
pub use orchestrator::FleetOrchestrator;
pub use secret::AdminToken;

// Public module declarations
pub mod aggregator;
pub mod config;
pub mod error;
pub mod lobby;
pub mod playlist;
pub mod proxy;
pub mod routing;
pub mod scheduler;
pub mod secret;
pub mod supervisor;

mod orchestrator;
