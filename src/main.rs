use std::path::PathBuf;
use std::sync::Arc;

use element_engine::{Engine, EngineConfig, EngineError, HotReloadEvent};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("engine.toml"));

    // Logging comes up before the config is read, so config warnings are visible
    let config = {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::fmt().finish());
        EngineConfig::load(&config_path)?
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(config.log_directive()?),
        )
        .init();

    let watch_data = config.watch_data;
    let engine = Arc::new(Engine::start(config).await?);

    let world = engine.load_world().await;
    info!(
        "{}: {} areas, {} rooms",
        engine.quests().services().settings().game_name,
        world.area_count(),
        world.room_count()
    );

    if watch_data {
        let mut rx = engine.start_data_watcher()?;
        // Spawn task to log reload events
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    HotReloadEvent::Reloaded(path) => info!("World data hot-reload: {}", path),
                    HotReloadEvent::Error(e) => error!("World data hot-reload error: {}", e),
                }
            }
        });
        info!("World data hot-reload enabled");
    }

    info!("Engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
