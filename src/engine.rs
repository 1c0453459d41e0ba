//! Engine
//!
//! Wires world data, element types, quest storage and scripting into one
//! runnable unit, and reloads world data when its files change.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::db::Database;
use crate::element::{ElementResolver, ElementTypeRegistry, World};
use crate::error::{EngineError, StoreError};
use crate::quest::{
    ChannelNotifier, LuaStatementEvaluator, LuaTurnInHook, QuestRegistry, QuestServices,
    QuestStorage,
};
use crate::store::TomlWorldData;

/// Quiet period that groups the events of one save into one reload
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(200);

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// World data was reloaded after a change to this file
    Reloaded(String),
    /// Reloading failed
    Error(String),
}

pub struct Engine {
    config: EngineConfig,
    world_data: Arc<TomlWorldData>,
    types: Arc<ElementTypeRegistry>,
    resolver: Arc<ElementResolver>,
    notifier: Arc<ChannelNotifier>,
    scripts: Arc<LuaTurnInHook>,
    quests: QuestRegistry,
}

impl Engine {
    pub async fn start(config: EngineConfig) -> Result<Self, EngineError> {
        let world_data = Arc::new(TomlWorldData::load(&config.worlddata_dir())?);
        let types = Arc::new(ElementTypeRegistry::load(world_data.as_ref()).await);
        let resolver = Arc::new(ElementResolver::new(
            Arc::clone(&types),
            world_data.clone(),
            world_data.clone(),
        ));

        let mut settings = config.game.clone();
        settings.apply_world_data(world_data.as_ref()).await;

        let database = Database::new(&config.database_url, config.max_connections)
            .await
            .map_err(|e| StoreError::database("connect", e))?;
        let storage: Arc<dyn QuestStorage> = Arc::new(database);

        let notifier = Arc::new(ChannelNotifier::new());
        let scripts = Arc::new(LuaTurnInHook::new(config.scripts_dir(), notifier.clone()));
        let services = Arc::new(QuestServices::new(
            Arc::clone(&resolver),
            Arc::clone(&storage),
            Arc::new(LuaStatementEvaluator::new(storage)),
            notifier.clone(),
            scripts.clone(),
            settings,
        ));

        info!(
            "Engine started with {} element types from {:?}",
            types.snapshot().await.len(),
            config.data_dir
        );

        Ok(Self {
            config,
            world_data,
            types,
            resolver,
            notifier,
            scripts,
            quests: QuestRegistry::new(services),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn world_data(&self) -> &Arc<TomlWorldData> {
        &self.world_data
    }

    pub fn types(&self) -> &Arc<ElementTypeRegistry> {
        &self.types
    }

    pub fn resolver(&self) -> &Arc<ElementResolver> {
        &self.resolver
    }

    pub fn notifier(&self) -> &Arc<ChannelNotifier> {
        &self.notifier
    }

    pub fn quests(&self) -> &QuestRegistry {
        &self.quests
    }

    /// Resolve every area and room
    pub async fn load_world(&self) -> World {
        World::load(&self.resolver).await
    }

    /// Re-read world data, rebuild element types and drop cached scripts
    ///
    /// Tables and element types are swapped together while no resolution is
    /// running, and concurrent reloads run one after another. Game settings
    /// keep the values they had at startup.
    pub async fn reload_world_data(&self) -> Result<usize, EngineError> {
        let tables = {
            let _paused = self.resolver.lock_for_reload().await;
            let tables = self.world_data.reload().await?;
            self.types.reload(self.world_data.as_ref()).await;
            tables
        };
        self.scripts.clear_cache().await;
        self.quests.refresh_definitions().await;
        info!("World data reloaded: {} tables", tables);
        Ok(tables)
    }

    /// Watch the data directory and reload on `.toml` or `.lua` changes
    ///
    /// Returns a channel receiver that signals when reloads occur
    pub fn start_data_watcher(
        self: &Arc<Self>,
    ) -> Result<mpsc::Receiver<HotReloadEvent>, EngineError> {
        let (tx, rx) = mpsc::channel(32);
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )
        .map_err(|e| EngineError::config(format!("Failed to create file watcher: {}", e)))?;

        let data_dir = self.config.data_dir.clone();
        watcher
            .watch(&data_dir, RecursiveMode::Recursive)
            .map_err(|e| EngineError::config(format!("Failed to watch {:?}: {}", data_dir, e)))?;

        let rt = tokio::runtime::Handle::current();
        let engine = Arc::clone(self);

        std::thread::spawn(move || {
            // Dropping the watcher stops the events
            let _watcher = watcher;
            info!("World data hot-reload watcher started for {:?}", data_dir);

            while let Ok(event) = notify_rx.recv() {
                let Some(mut changed) = reload_trigger(&event) else {
                    continue;
                };
                // Absorb the rest of the burst
                while let Ok(event) = notify_rx.recv_timeout(RELOAD_DEBOUNCE) {
                    if let Some(path) = reload_trigger(&event) {
                        changed = path;
                    }
                }

                info!("Detected change in {:?}, triggering reload", changed);
                let engine = Arc::clone(&engine);
                let reload_tx = tx.clone();
                rt.spawn(async move {
                    let event = match engine.reload_world_data().await {
                        Ok(_) => HotReloadEvent::Reloaded(changed.to_string_lossy().to_string()),
                        Err(e) => {
                            error!("Hot-reload failed: {}", e);
                            HotReloadEvent::Error(e.to_string())
                        }
                    };
                    let _ = reload_tx.send(event).await;
                });

                if tx.is_closed() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// The changed world-data or script file, if the event should trigger a reload
fn reload_trigger(event: &notify::Event) -> Option<PathBuf> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) => event
            .paths
            .iter()
            .find(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext == "toml" || ext == "lua")
            })
            .cloned(),
        _ => None,
    }
}
