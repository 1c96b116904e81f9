//! Playlist generation for scheduled public lobbies.
//!
//! The scheduler draws each new lobby's configuration from a playlist
//! generator. The generator is a trait seam so deployments can plug in
//! their own rotation policy; the default cycles through a fixed map list.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::lobby::GameConfig;

/// Source of lobby configurations for newly scheduled public lobbies.
pub trait Playlist: Send + Sync {
    /// Produces the configuration for the next scheduled lobby.
    fn next_config(&self) -> GameConfig;
}

/// Default playlist cycling through a fixed set of maps with a shared
/// player cap.
pub struct RotatingPlaylist {
    maps: Vec<String>,
    max_players: u32,
    cursor: AtomicUsize,
}

impl RotatingPlaylist {
    pub fn new(maps: Vec<String>, max_players: u32) -> Self {
        Self {
            maps,
            max_players,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RotatingPlaylist {
    fn default() -> Self {
        Self::new(
            vec![
                "continents".to_string(),
                "archipelago".to_string(),
                "pangaea".to_string(),
            ],
            50,
        )
    }
}

impl Playlist for RotatingPlaylist {
    fn next_config(&self) -> GameConfig {
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        let mut extra = serde_json::Map::new();
        if !self.maps.is_empty() {
            let map = &self.maps[cursor % self.maps.len()];
            extra.insert("gameMap".to_string(), serde_json::Value::String(map.clone()));
        }
        extra.insert(
            "gameType".to_string(),
            serde_json::Value::String("public".to_string()),
        );
        GameConfig {
            max_players: Some(self.max_players),
            extra,
        }
    }
}
