//! Configuration system.
//!
//! Loads client configuration from JSON strings/files. Command-line overrides
//! are applied by the binary.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8081/ws`.
    pub server_url: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,
    /// Frame driver rate.
    pub frame_hz: u32,
    /// Chebyshev radius of the local player's sight.
    pub sight_range: u32,
    /// Length of the local catch countdown.
    pub catch_window_ms: u64,
    /// File holding the persisted player identity.
    pub identity_path: String,
    /// Key the identity is stored under.
    pub player_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8081/ws".to_string(),
            reconnect_delay_ms: 5000,
            frame_hz: 60,
            sight_range: 5,
            catch_window_ms: 3000,
            identity_path: ".isle_identity.json".to_string(),
            player_key: "Player".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON. Missing keys keep their defaults.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn catch_window(&self) -> Duration {
        Duration::from_millis(self.catch_window_ms)
    }

    /// Frame interval; a zero rate is treated as 1 Hz.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_hz.max(1)))
    }
}
