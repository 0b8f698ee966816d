//! Record store contract for player and world documents.
//!
//! The persistence engine is an external collaborator; the sync layer only
//! ever calls `get` / `create` / `update` on it. [`MemoryStore`] is the
//! in-process implementation used for development and tests, seeded either
//! with the built-in sample documents or from a JSON file.

use async_trait::async_trait;
use dashmap::DashMap;
use plaza_protocol::{Checkpoint, PlayerProfile};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A player document as the record store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub user_id: String,
    pub world_id: String,
    pub name: String,
    pub wealth: i64,
    pub spritesheet: String,
    pub checkpoint: Checkpoint,
}

impl PlayerRecord {
    /// The public projection sent to other clients; drops `user_id`.
    pub fn profile(&self) -> PlayerProfile {
        PlayerProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            wealth: self.wealth,
            spritesheet: self.spritesheet.clone(),
            checkpoint: self.checkpoint,
        }
    }
}

/// A world document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldRecord {
    pub id: String,
    pub name: String,
}

/// Partial update applied to a player record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub wealth: Option<i64>,
    pub spritesheet: Option<String>,
    pub checkpoint: Option<Checkpoint>,
}

/// Errors surfaced by a record store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid seed data: {0}")]
    InvalidSeed(String),
}

/// The `get`/`create`/`update` contract of the document store collaborator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_player(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError>;

    async fn create_player(&self, record: PlayerRecord) -> Result<PlayerRecord, StoreError>;

    /// Applies a partial update; returns the updated record, or `None` when
    /// the player does not exist.
    async fn update_player(
        &self,
        id: &str,
        patch: PlayerPatch,
    ) -> Result<Option<PlayerRecord>, StoreError>;

    async fn get_world(&self, id: &str) -> Result<Option<WorldRecord>, StoreError>;

    async fn create_world(&self, record: WorldRecord) -> Result<WorldRecord, StoreError>;
}

/// Seed file layout accepted by [`MemoryStore::from_seed_file`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct SeedData {
    #[serde(default)]
    players: Vec<PlayerRecord>,
    #[serde(default)]
    worlds: Vec<WorldRecord>,
}

/// In-process record store stand-in for the external document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: DashMap<String, PlayerRecord>,
    worlds: DashMap<String, WorldRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-populated with the sample town: two worlds, six players,
    /// all spawning at the same checkpoint.
    pub fn with_sample_data() -> Self {
        let store = Self::new();

        for (id, name) in [("world_0", "Kadaroad"), ("world_1", "Sand-Land")] {
            store.worlds.insert(
                id.to_string(),
                WorldRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                },
            );
        }

        let players = [
            ("player_0", "user_0", "world_0", "Sandip", "GENERIC"),
            ("player_1", "user_1", "world_0", "Raj", "BARD"),
            ("player_2", "user_2", "world_1", "Ritik", "SOLDIER"),
            ("player_3", "user_0", "world_1", "Sandip", "SCOUT"),
            ("player_4", "user_1", "world_1", "Raj", "DEVOUT"),
            ("player_5", "user_2", "world_0", "Ritik", "CONJURER"),
        ];
        for (id, user_id, world_id, name, spritesheet) in players {
            store.players.insert(
                id.to_string(),
                PlayerRecord {
                    id: id.to_string(),
                    user_id: user_id.to_string(),
                    world_id: world_id.to_string(),
                    name: name.to_string(),
                    wealth: 100,
                    spritesheet: spritesheet.to_string(),
                    checkpoint: Checkpoint { x: 100.0, y: 100.0 },
                },
            );
        }

        store
    }

    /// Loads a store from a JSON seed file of `{players: [...], worlds: [...]}`.
    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {e}", path.display())))?;
        let seed: SeedData = serde_json::from_str(&content)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {e}", path.display())))?;

        let store = Self::new();
        for world in seed.worlds {
            store.worlds.insert(world.id.clone(), world);
        }
        for player in seed.players {
            store.players.insert(player.id.clone(), player);
        }
        Ok(store)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_player(&self, id: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.players.get(id).map(|record| record.clone()))
    }

    async fn create_player(&self, record: PlayerRecord) -> Result<PlayerRecord, StoreError> {
        self.players.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_player(
        &self,
        id: &str,
        patch: PlayerPatch,
    ) -> Result<Option<PlayerRecord>, StoreError> {
        let Some(mut record) = self.players.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(wealth) = patch.wealth {
            record.wealth = wealth;
        }
        if let Some(spritesheet) = patch.spritesheet {
            record.spritesheet = spritesheet;
        }
        if let Some(checkpoint) = patch.checkpoint {
            record.checkpoint = checkpoint;
        }
        Ok(Some(record.clone()))
    }

    async fn get_world(&self, id: &str) -> Result<Option<WorldRecord>, StoreError> {
        Ok(self.worlds.get(id).map(|record| record.clone()))
    }

    async fn create_world(&self, record: WorldRecord) -> Result<WorldRecord, StoreError> {
        self.worlds.insert(record.id.clone(), record.clone());
        Ok(record)
    }
}
