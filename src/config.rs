//! Engine Configuration
//!
//! Process configuration loaded from TOML, and the global game settings that
//! gate player actions.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;

use crate::error::EngineError;
use crate::store::{Record, WorldDataStore};

/// World-data table whose first record overrides the configured game settings
pub const GAME_SETTINGS_TABLE: &str = "game_settings";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root of `worlddata/` and `scripts/`
    pub data_dir: PathBuf,
    pub database_url: String,
    pub max_connections: u32,
    /// Default tracing directive, combined with `RUST_LOG`
    pub log_filter: String,
    /// Reload world data when files under `data_dir` change
    pub watch_data: bool,
    pub game: GameSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: "sqlite:game.db?mode=rwc".to_string(),
            max_connections: 5,
            log_filter: "element_engine=info".to_string(),
            watch_data: false,
            game: GameSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| EngineError::config(format!("Failed to parse {:?}: {}", path, e)))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn worlddata_dir(&self) -> PathBuf {
        self.data_dir.join("worlddata")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir.join("scripts")
    }

    pub fn log_directive(&self) -> Result<Directive, EngineError> {
        self.log_filter
            .parse()
            .map_err(|e| EngineError::config(format!("Invalid log filter '{}': {}", self.log_filter, e)))
    }
}

/// Global game settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub game_name: String,
    pub solo_mode: bool,
    /// Whether players may abandon quests in progress
    pub can_give_up_quests: bool,
    pub start_location_key: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_name: "Muddery".to_string(),
            solo_mode: false,
            can_give_up_quests: true,
            start_location_key: String::new(),
        }
    }
}

impl GameSettings {
    /// Override settings with the fields of a world-data record
    pub fn apply_record(&mut self, record: &Record) {
        if let Some(name) = record.get("game_name").and_then(|v| v.as_str()) {
            self.game_name = name.to_string();
        }
        if let Some(solo) = record.get("solo_mode").and_then(|v| v.as_bool()) {
            self.solo_mode = solo;
        }
        if let Some(give_up) = record.get("can_give_up_quests").and_then(|v| v.as_bool()) {
            self.can_give_up_quests = give_up;
        }
        if let Some(start) = record.get("start_location_key").and_then(|v| v.as_str()) {
            self.start_location_key = start.to_string();
        }
    }

    /// Apply the `game_settings` table if the world data has one
    pub async fn apply_world_data(&mut self, world: &dyn WorldDataStore) {
        match world.records(GAME_SETTINGS_TABLE).await {
            Ok(records) => {
                if let Some(record) = records.first() {
                    self.apply_record(record);
                    info!("Applied game settings from world data");
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Failed to read game settings: {}", e),
        }
    }
}
