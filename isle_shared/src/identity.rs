//! Persisted local identity.
//!
//! A profile keeps one player id for its whole lifetime. The first lookup
//! synthesizes `player-<unix millis>-<0..999>` and writes it back; later
//! lookups return the stored value. Collisions between two profiles created
//! in the same millisecond are possible and ignored.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use rand::Rng;
use tracing::{debug, info};

use crate::protocol::PlayerId;

/// Source of the local player's stable id.
pub trait IdentityStore {
    /// Returns the id stored under `key`, creating and persisting one if absent.
    fn get_or_create(&mut self, key: &str) -> anyhow::Result<PlayerId>;
}

/// Generates a fresh id in the `player-<millis>-<n>` format.
pub fn generate_player_id() -> PlayerId {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..1000);
    PlayerId(format!("player-{millis}-{suffix}"))
}

/// Identity kept in memory only; lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    ids: BTreeMap<String, PlayerId>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds an id, e.g. to pin a test identity.
    pub fn with_id(mut self, key: &str, id: PlayerId) -> Self {
        self.ids.insert(key.to_string(), id);
        self
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get_or_create(&mut self, key: &str) -> anyhow::Result<PlayerId> {
        Ok(self
            .ids
            .entry(key.to_string())
            .or_insert_with(generate_player_id)
            .clone())
    }
}

/// Identity persisted as a JSON object `{ key: id }` in a file.
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> anyhow::Result<BTreeMap<String, PlayerId>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("read identity {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse identity {}", self.path.display()))
    }
}

impl IdentityStore for FileIdentityStore {
    fn get_or_create(&mut self, key: &str) -> anyhow::Result<PlayerId> {
        let mut ids = self.read()?;
        if let Some(id) = ids.get(key) {
            debug!(%id, key, "Loaded stored identity");
            return Ok(id.clone());
        }

        let id = generate_player_id();
        ids.insert(key.to_string(), id.clone());
        let text = serde_json::to_string_pretty(&ids).context("serialize identity")?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("write identity {}", self.path.display()))?;
        info!(%id, path = %self.path.display(), "Created new player identity");
        Ok(id)
    }
}
