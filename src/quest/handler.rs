//! Quest Handler
//!
//! Per-character quest lifecycle. Accept, give up, objective progress and
//! turn-in hold the character's operation lock for their whole duration, so
//! a quest is completed and rewarded at most once. The lock belongs to the
//! character id, not the handler, so handlers built for the same character
//! still take turns.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::condition::{ConditionGate, StatementEvaluator};
use super::definition::{ObjectiveType, Quest, QuestInfo};
use super::dependency::DependencyEvaluator;
use super::events::{Notification, Notifier, QuestEvent};
use super::state::{CharacterId, CharacterQuestState, QuestFields, QuestStatus};
use super::status::QuestStatusSet;
use super::storage::QuestStorage;
use crate::config::GameSettings;
use crate::element::kind::QUEST;
use crate::element::ElementResolver;
use crate::error::EngineError;

const CANNOT_FIND: &str = "Can not find this quest.";
const CANNOT_GIVE_UP: &str = "Can not give up this quest.";
const CANNOT_TURN_IN: &str = "Can not turn in this quest.";

/// Reward effect run when a quest is turned in
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TurnInHook: Send + Sync {
    async fn on_turn_in(&self, quest: &Quest, character_id: CharacterId) -> Result<(), EngineError>;
}

/// Collaborators shared by every character's quest handler
pub struct QuestServices {
    resolver: Arc<ElementResolver>,
    storage: Arc<dyn QuestStorage>,
    dependencies: DependencyEvaluator,
    conditions: ConditionGate,
    notifier: Arc<dyn Notifier>,
    turn_in: Arc<dyn TurnInHook>,
    settings: Arc<GameSettings>,
    /// Operation locks by character id
    locks: DashMap<CharacterId, Arc<Mutex<()>>>,
}

impl QuestServices {
    pub fn new(
        resolver: Arc<ElementResolver>,
        storage: Arc<dyn QuestStorage>,
        statements: Arc<dyn StatementEvaluator>,
        notifier: Arc<dyn Notifier>,
        turn_in: Arc<dyn TurnInHook>,
        settings: GameSettings,
    ) -> Self {
        Self {
            resolver,
            storage,
            dependencies: DependencyEvaluator::new(Arc::new(QuestStatusSet::default())),
            conditions: ConditionGate::new(statements),
            notifier,
            turn_in,
            settings: Arc::new(settings),
            locks: DashMap::new(),
        }
    }

    /// Replace the dependency predicates
    pub fn with_statuses(mut self, statuses: QuestStatusSet) -> Self {
        self.dependencies = DependencyEvaluator::new(Arc::new(statuses));
        self
    }

    /// The lock serializing state changes of one character
    fn character_lock(&self, character_id: CharacterId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(character_id).or_default().value())
    }

    pub fn storage(&self) -> &Arc<dyn QuestStorage> {
        &self.storage
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }
}

/// Quests of one character
pub struct QuestHandler {
    character_id: CharacterId,
    services: Arc<QuestServices>,
    /// Resolved quest elements, cached per quest key
    quests: RwLock<HashMap<String, Arc<Quest>>>,
    /// Held by every state-changing operation, shared by all handlers of the character
    op_lock: Arc<Mutex<()>>,
}

impl QuestHandler {
    pub fn new(character_id: CharacterId, services: Arc<QuestServices>) -> Self {
        let op_lock = services.character_lock(character_id);
        Self {
            character_id,
            services,
            quests: RwLock::new(HashMap::new()),
            op_lock,
        }
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    /// Resolve every unfinished quest of the character
    pub async fn load_quests(&self) -> Result<(), EngineError> {
        let stored = self.services.storage.character_quests(self.character_id).await?;
        let unfinished: Vec<&String> = stored
            .iter()
            .filter(|(_, state)| !state.finished)
            .map(|(key, _)| key)
            .collect();

        join_all(unfinished.iter().map(|key| self.get_quest(key))).await;
        debug!(
            "Loaded {} quests for character {}",
            unfinished.len(),
            self.character_id
        );
        Ok(())
    }

    /// Start tracking a quest; accepting a tracked quest does nothing
    pub async fn accept(&self, quest_key: &str) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;

        if self.stored_state(quest_key).await?.is_some() {
            debug!(
                "Character {} already tracks quest '{}'",
                self.character_id, quest_key
            );
            return Ok(());
        }

        let quest = self.get_quest(quest_key).await;
        self.services.storage.add_quest(self.character_id, quest_key).await?;

        let objectives: BTreeMap<usize, i32> = (0..quest.objectives().len()).map(|i| (i, 0)).collect();
        if let Err(e) = self
            .services
            .storage
            .set_quest_fields(self.character_id, quest_key, QuestFields::objectives(objectives))
            .await
        {
            // Leave no record without objective counters behind
            if let Err(cleanup) = self.services.storage.remove_quest(self.character_id, quest_key).await {
                warn!(
                    "Failed to drop half-accepted quest '{}' of character {}: {}",
                    quest_key, self.character_id, cleanup
                );
            }
            return Err(e.into());
        }

        info!("Character {} accepted quest '{}'", self.character_id, quest_key);
        self.notify(Notification::message(format!("Accepted quest {}.", quest.name())));
        self.show_quests().await;
        self.notify(Notification::LocationRefresh);
        Ok(())
    }

    /// Stop tracking an unfinished quest
    pub async fn give_up(&self, quest_key: &str) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;

        if !self.services.settings.can_give_up_quests {
            return Err(EngineError::permission_denied(CANNOT_GIVE_UP));
        }

        match self.stored_state(quest_key).await? {
            Some(state) if !state.finished => {}
            _ => return Err(EngineError::invalid_state(CANNOT_FIND)),
        }

        self.services.storage.remove_quest(self.character_id, quest_key).await?;
        self.quests.write().await.remove(quest_key);

        info!("Character {} gave up quest '{}'", self.character_id, quest_key);
        self.show_quests().await;
        Ok(())
    }

    pub async fn handle_event(&self, event: &QuestEvent) -> Result<(), EngineError> {
        self.at_objective(&event.objective_type(), event.target(), event.count())
            .await
    }

    /// Advance matching objectives of every unfinished quest
    ///
    /// All quests are processed even if some fail; the first failure is returned.
    pub async fn at_objective(
        &self,
        objective_type: &ObjectiveType,
        target: &str,
        count: i32,
    ) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;

        let in_progress: Vec<(String, CharacterQuestState)> = self
            .services
            .storage
            .character_quests(self.character_id)
            .await?
            .into_iter()
            .filter(|(_, state)| !state.finished)
            .collect();
        if in_progress.is_empty() {
            return Ok(());
        }

        let updates = join_all(in_progress.into_iter().map(|(key, state)| {
            self.progress_quest(key, state, objective_type, target, count)
        }))
        .await;

        let mut changed = false;
        let mut first_error = None;
        for update in updates {
            match update {
                Ok(Some((quest, accomplished))) => {
                    changed = true;
                    if accomplished {
                        info!(
                            "Character {} accomplished the goals of quest '{}'",
                            self.character_id,
                            quest.key()
                        );
                        self.notify(Notification::QuestAccomplished {
                            quest_key: quest.key().to_string(),
                            name: quest.name().to_string(),
                        });
                        self.notify(Notification::message(format!(
                            "Quest {}'s goals are accomplished.",
                            quest.name()
                        )));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        "Objective update failed for character {}: {}",
                        self.character_id, e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if changed {
            self.show_quests().await;
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn progress_quest(
        &self,
        quest_key: String,
        mut state: CharacterQuestState,
        objective_type: &ObjectiveType,
        target: &str,
        count: i32,
    ) -> Result<Option<(Arc<Quest>, bool)>, EngineError> {
        let quest = self.get_quest(&quest_key).await;
        if !quest.apply_progress(&mut state, objective_type, target, count) {
            return Ok(None);
        }

        self.services
            .storage
            .set_quest_fields(
                self.character_id,
                &quest_key,
                QuestFields::objectives(state.objectives.clone()),
            )
            .await?;

        let accomplished = quest.is_accomplished(&state);
        Ok(Some((quest, accomplished)))
    }

    /// Finish an accomplished quest and run its reward hook
    pub async fn turn_in(&self, quest_key: &str) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;

        let state = match self.stored_state(quest_key).await? {
            Some(state) if !state.finished => state,
            _ => return Err(EngineError::invalid_state(CANNOT_FIND)),
        };

        let quest = self.get_quest(quest_key).await;
        if !quest.is_accomplished(&state) {
            return Err(EngineError::invalid_state(CANNOT_TURN_IN));
        }

        self.services.turn_in.on_turn_in(&quest, self.character_id).await?;
        self.services
            .storage
            .set_quest_fields(self.character_id, quest_key, QuestFields::finished())
            .await?;
        self.quests.write().await.remove(quest_key);

        info!("Character {} turned in quest '{}'", self.character_id, quest_key);
        self.notify(Notification::message(format!("Turned in quest {}.", quest.name())));
        self.show_quests().await;
        self.notify(Notification::StatusRefresh);
        self.notify(Notification::LocationRefresh);
        Ok(())
    }

    pub async fn status(&self, quest_key: &str) -> Result<QuestStatus, EngineError> {
        Ok(QuestStatus::of(self.stored_state(quest_key).await?.as_ref()))
    }

    /// Status for predicates; storage failures are logged and read as untracked
    async fn status_or_untracked(&self, quest_key: &str) -> QuestStatus {
        self.status(quest_key).await.unwrap_or_else(|e| {
            warn!(
                "Failed to read quest '{}' of character {}: {}",
                quest_key, self.character_id, e
            );
            QuestStatus::Untracked
        })
    }

    pub async fn is_finished(&self, quest_key: &str) -> bool {
        self.status_or_untracked(quest_key).await == QuestStatus::Finished
    }

    pub async fn is_in_progress(&self, quest_key: &str) -> bool {
        self.status_or_untracked(quest_key).await == QuestStatus::InProgress
    }

    /// In progress with every objective at its target
    pub async fn is_accomplished(&self, quest_key: &str) -> bool {
        match self.stored_state(quest_key).await {
            Ok(Some(state)) if !state.finished => {
                self.get_quest(quest_key).await.is_accomplished(&state)
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Failed to read quest '{}': {}", quest_key, e);
                false
            }
        }
    }

    /// In progress with some objective short of its target
    pub async fn is_not_accomplished(&self, quest_key: &str) -> bool {
        match self.stored_state(quest_key).await {
            Ok(Some(state)) if !state.finished => {
                !self.get_quest(quest_key).await.is_accomplished(&state)
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Failed to read quest '{}': {}", quest_key, e);
                false
            }
        }
    }

    /// Whether the quest can be offered to the character
    pub async fn can_provide(&self, quest_key: &str) -> bool {
        if self.is_finished(quest_key).await || self.is_in_progress(quest_key).await {
            return false;
        }
        let quest = self.get_quest(quest_key).await;
        self.services.dependencies.matches(self, &quest).await
            && self.services.conditions.eligible(self.character_id, &quest).await
    }

    pub async fn match_dependencies(&self, quest_key: &str) -> bool {
        let quest = self.get_quest(quest_key).await;
        self.services.dependencies.matches(self, &quest).await
    }

    pub async fn match_condition(&self, quest_key: &str) -> bool {
        let quest = self.get_quest(quest_key).await;
        self.services
            .conditions
            .eligible(self.character_id, &quest)
            .await
    }

    /// Info of every unfinished quest, sorted by key
    pub async fn return_quests(&self) -> Result<Vec<QuestInfo>, EngineError> {
        let mut unfinished: Vec<(String, CharacterQuestState)> = self
            .services
            .storage
            .character_quests(self.character_id)
            .await?
            .into_iter()
            .filter(|(_, state)| !state.finished)
            .collect();
        unfinished.sort_by(|a, b| a.0.cmp(&b.0));

        let quests = join_all(unfinished.iter().map(|(key, _)| self.get_quest(key))).await;
        Ok(quests
            .iter()
            .zip(&unfinished)
            .map(|(quest, (_, state))| quest.info(state))
            .collect())
    }

    pub async fn get_quest_info(&self, quest_key: &str) -> Result<QuestInfo, EngineError> {
        match self.stored_state(quest_key).await? {
            Some(state) if !state.finished => Ok(self.get_quest(quest_key).await.info(&state)),
            _ => Err(EngineError::invalid_state(CANNOT_FIND)),
        }
    }

    /// Push the quest list to the character
    pub async fn show_quests(&self) {
        match self.return_quests().await {
            Ok(quests) => self.notify(Notification::Quests { quests }),
            Err(e) => warn!(
                "Failed to list quests of character {}: {}",
                self.character_id, e
            ),
        }
    }

    /// Drop cached quest elements so they are resolved again from current data
    pub async fn refresh_definitions(&self) {
        self.quests.write().await.clear();
    }

    /// Forget every quest of the character, stored records included
    pub async fn remove_all(&self) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;
        self.quests.write().await.clear();
        self.services.storage.remove_character(self.character_id).await?;
        info!("Removed all quests of character {}", self.character_id);
        Ok(())
    }

    /// The quest element bound to this character, resolved on first use
    pub async fn get_quest(&self, quest_key: &str) -> Arc<Quest> {
        if let Some(quest) = self.quests.read().await.get(quest_key) {
            return Arc::clone(quest);
        }

        let element = self.services.resolver.resolve(QUEST, quest_key, None).await;
        let quest = Arc::new(Quest::new(element, self.character_id));

        let mut quests = self.quests.write().await;
        Arc::clone(quests.entry(quest_key.to_string()).or_insert(quest))
    }

    async fn stored_state(&self, quest_key: &str) -> Result<Option<CharacterQuestState>, EngineError> {
        Ok(self
            .services
            .storage
            .quest(self.character_id, quest_key)
            .await?)
    }

    fn notify(&self, notification: Notification) {
        self.services.notifier.send(self.character_id, notification);
    }
}
