//! Quest Script Runner
//!
//! Lua backends for quest conditions and turn-in rewards. Every evaluation
//! gets a fresh sandboxed Lua state so scripts cannot leak into each other.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mlua::{Function, Lua, Result as LuaResult, Table, Value as LuaValue};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::condition::StatementEvaluator;
use super::definition::Quest;
use super::events::{Notification, Notifier};
use super::handler::TurnInHook;
use super::state::{CharacterId, CharacterQuestState};
use super::storage::QuestStorage;
use crate::error::EngineError;

/// Global function called when a quest with a turn-in script is turned in
pub const TURN_IN_FUNCTION: &str = "on_turn_in";

fn sandboxed_lua() -> LuaResult<Lua> {
    let lua = Lua::new();
    let globals = lua.globals();

    globals.set("os", LuaValue::Nil)?;
    globals.set("io", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;
    globals.set("dofile", LuaValue::Nil)?;
    globals.set("require", LuaValue::Nil)?;

    Ok(lua)
}

/// Evaluates condition expressions as Lua
///
/// The expression sees `actor`, `target` and the quest queries
/// `is_quest_finished(key)` and `is_quest_in_progress(key)` for the actor.
pub struct LuaStatementEvaluator {
    quests: Arc<dyn QuestStorage>,
}

impl LuaStatementEvaluator {
    pub fn new(quests: Arc<dyn QuestStorage>) -> Self {
        Self { quests }
    }

    fn evaluate(
        expression: &str,
        actor: CharacterId,
        target: Option<CharacterId>,
        quests: HashMap<String, CharacterQuestState>,
    ) -> LuaResult<bool> {
        let lua = sandboxed_lua()?;
        let globals = lua.globals();
        globals.set("actor", actor)?;
        globals.set("target", target)?;

        let quests = Arc::new(quests);

        let finished = Arc::clone(&quests);
        globals.set(
            "is_quest_finished",
            lua.create_function(move |_, key: String| {
                Ok(finished.get(&key).is_some_and(|state| state.finished))
            })?,
        )?;

        let in_progress = Arc::clone(&quests);
        globals.set(
            "is_quest_in_progress",
            lua.create_function(move |_, key: String| {
                Ok(in_progress.get(&key).is_some_and(|state| !state.finished))
            })?,
        )?;

        lua.load(format!("return ({})", expression))
            .set_name("condition")
            .eval::<bool>()
    }
}

#[async_trait]
impl StatementEvaluator for LuaStatementEvaluator {
    async fn evaluate_condition(
        &self,
        expression: &str,
        actor: CharacterId,
        target: Option<CharacterId>,
    ) -> Result<bool, EngineError> {
        let quests = self.quests.character_quests(actor).await?;
        let result = Self::evaluate(expression, actor, target, quests)
            .map_err(|e| EngineError::ConditionEval(format!("'{}': {}", expression, e)))?;
        debug!("Condition '{}' for character {} -> {}", expression, actor, result);
        Ok(result)
    }
}

/// Runs a quest's `turn_in_script` when it is turned in
///
/// The script defines `on_turn_in(ctx)`; `ctx` carries `character_id`,
/// `quest_key` and a `show_notification(text)` method whose messages are sent
/// to the character once the script returns.
pub struct LuaTurnInHook {
    scripts_dir: PathBuf,
    notifier: Arc<dyn Notifier>,
    sources: RwLock<HashMap<String, Arc<str>>>,
}

impl LuaTurnInHook {
    pub fn new(scripts_dir: impl Into<PathBuf>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            notifier,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Forget cached script sources so edits are picked up
    pub async fn clear_cache(&self) {
        let mut sources = self.sources.write().await;
        let count = sources.len();
        sources.clear();
        info!("Cleared {} cached turn-in scripts", count);
    }

    async fn source(&self, script: &str) -> Result<Arc<str>, EngineError> {
        if let Some(source) = self.sources.read().await.get(script) {
            return Ok(Arc::clone(source));
        }

        let path = Path::new(script);
        if path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(EngineError::Script(format!(
                "script path '{}' leaves the scripts directory",
                script
            )));
        }

        let full_path = self.scripts_dir.join(path);
        let source: Arc<str> = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| {
                EngineError::Script(format!("cannot read {}: {}", full_path.display(), e))
            })?
            .into();

        debug!("Loaded turn-in script {}", full_path.display());
        self.sources
            .write()
            .await
            .insert(script.to_string(), Arc::clone(&source));
        Ok(source)
    }

    fn run(
        source: &str,
        script: &str,
        quest_key: &str,
        character_id: CharacterId,
    ) -> LuaResult<Vec<String>> {
        let lua = sandboxed_lua()?;
        lua.load(source).set_name(script).exec()?;

        let on_turn_in: Function = lua
            .globals()
            .get::<Option<Function>>(TURN_IN_FUNCTION)?
            .ok_or_else(|| {
                mlua::Error::runtime(format!("{} does not define {}", script, TURN_IN_FUNCTION))
            })?;

        let ctx = lua.create_table()?;
        ctx.set("character_id", character_id)?;
        ctx.set("quest_key", quest_key)?;

        let result = lua.create_table()?;
        result.set("notifications", lua.create_table()?)?;
        ctx.set("_result", result.clone())?;

        let show_notification = lua.create_function(|_, (this, text): (Table, String)| {
            let result: Table = this.get("_result")?;
            let notifications: Table = result.get("notifications")?;
            notifications.push(text)?;
            Ok(())
        })?;
        ctx.set("show_notification", show_notification)?;

        on_turn_in.call::<()>(ctx)?;

        let notifications: Table = result.get("notifications")?;
        notifications.sequence_values::<String>().collect()
    }
}

#[async_trait]
impl TurnInHook for LuaTurnInHook {
    async fn on_turn_in(&self, quest: &Quest, character_id: CharacterId) -> Result<(), EngineError> {
        let Some(script) = quest.turn_in_script() else {
            return Ok(());
        };

        let source = self.source(script).await?;
        let notifications = Self::run(&source, script, quest.key(), character_id)
            .map_err(|e| EngineError::Script(format!("{}: {}", script, e)))?;

        for text in notifications {
            self.notifier.send(character_id, Notification::message(text));
        }
        info!(
            "Ran turn-in script {} of quest '{}' for character {}",
            script,
            quest.key(),
            character_id
        );
        Ok(())
    }
}
