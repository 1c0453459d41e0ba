//! Quest Registry
//!
//! Owns one quest handler per online character. Handlers are created lazily
//! and load the character's stored quests on first use.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::events::QuestEvent;
use super::handler::{QuestHandler, QuestServices};
use super::state::CharacterId;
use crate::error::EngineError;

pub struct QuestRegistry {
    services: Arc<QuestServices>,
    handlers: DashMap<CharacterId, Arc<QuestHandler>>,
}

impl QuestRegistry {
    pub fn new(services: Arc<QuestServices>) -> Self {
        Self {
            services,
            handlers: DashMap::new(),
        }
    }

    pub fn services(&self) -> &Arc<QuestServices> {
        &self.services
    }

    /// Handler of a character, created and loaded if it does not exist yet
    pub async fn handler(&self, character_id: CharacterId) -> Arc<QuestHandler> {
        if let Some(handler) = self.handlers.get(&character_id) {
            return Arc::clone(handler.value());
        }

        let handler = Arc::new(QuestHandler::new(character_id, Arc::clone(&self.services)));
        if let Err(e) = handler.load_quests().await {
            warn!("Failed to load quests of character {}: {}", character_id, e);
        }

        // A concurrent caller may have won the race; keep its handler
        Arc::clone(self.handlers.entry(character_id).or_insert(handler).value())
    }

    pub fn get(&self, character_id: CharacterId) -> Option<Arc<QuestHandler>> {
        self.handlers
            .get(&character_id)
            .map(|handler| Arc::clone(handler.value()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop the in-memory handler; stored quests are kept
    pub fn unload(&self, character_id: CharacterId) {
        if self.handlers.remove(&character_id).is_some() {
            debug!("Unloaded quests of character {}", character_id);
        }
    }

    /// Delete a character's quests from storage and memory
    pub async fn remove_character(&self, character_id: CharacterId) -> Result<(), EngineError> {
        self.handler(character_id).await.remove_all().await?;
        self.handlers.remove(&character_id);
        info!("Removed character {} from the quest registry", character_id);
        Ok(())
    }

    /// Make every loaded handler re-resolve its quests after a data reload
    pub async fn refresh_definitions(&self) {
        let handlers: Vec<Arc<QuestHandler>> = self
            .handlers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for handler in &handlers {
            handler.refresh_definitions().await;
        }
        debug!("Refreshed quest definitions of {} characters", handlers.len());
    }

    /// Route a game event to the character's quests
    pub async fn handle_event(
        &self,
        character_id: CharacterId,
        event: &QuestEvent,
    ) -> Result<(), EngineError> {
        self.handler(character_id).await.handle_event(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::handler::TurnInHook;
    use crate::quest::{Quest, QuestStatus, QuestStorage};
    use crate::test_support::{harness, harness_with, HarnessOptions, KILL_RATS, TUTORIAL, WELCOME};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Reward hook that yields while paying out
    #[derive(Default)]
    struct SlowReward {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TurnInHook for SlowReward {
        async fn on_turn_in(&self, _quest: &Quest, _character_id: CharacterId) -> Result<(), EngineError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handler_is_shared() {
        let h = harness().await;
        let registry = QuestRegistry::new(Arc::clone(&h.services));
        assert!(registry.is_empty());
        assert!(registry.get(7).is_none());

        let (first, second) = tokio::join!(registry.handler(7), registry.handler(7));
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &registry.get(7).unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_loads_stored_quests() {
        let h = harness().await;
        h.storage.add_quest(7, TUTORIAL).await.unwrap();
        let registry = QuestRegistry::new(Arc::clone(&h.services));

        let handler = registry.handler(7).await;
        let keys: Vec<_> = handler
            .return_quests()
            .await
            .unwrap()
            .into_iter()
            .map(|q| q.key)
            .collect();
        assert_eq!(keys, vec![TUTORIAL]);
    }

    #[tokio::test]
    async fn test_events_are_routed_to_the_character() {
        let h = harness().await;
        let registry = QuestRegistry::new(Arc::clone(&h.services));
        registry.handler(7).await.accept(KILL_RATS).await.unwrap();

        let kill = QuestEvent::MonsterKilled {
            entity_type: "rat".to_string(),
        };
        registry.handle_event(7, &kill).await.unwrap();
        registry.handle_event(7, &kill).await.unwrap();
        registry.handle_event(8, &kill).await.unwrap();

        let state = h.storage.quest(7, KILL_RATS).await.unwrap().unwrap();
        assert_eq!(state.progress(0), 2);
        assert!(h.storage.quest(8, KILL_RATS).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unload_keeps_storage_and_remove_deletes_it() {
        let h = harness().await;
        let registry = QuestRegistry::new(Arc::clone(&h.services));
        registry.handler(7).await.accept(TUTORIAL).await.unwrap();

        registry.unload(7);
        assert!(registry.get(7).is_none());
        assert_eq!(
            registry.handler(7).await.status(TUTORIAL).await.unwrap(),
            QuestStatus::InProgress
        );

        registry.remove_character(7).await.unwrap();
        assert!(registry.get(7).is_none());
        assert!(h.storage.character_quests(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handlers_of_one_character_share_the_lock() {
        let reward = Arc::new(SlowReward::default());
        let hook: Arc<dyn TurnInHook> = reward.clone();
        let h = harness_with(HarnessOptions { turn_in: Some(hook), ..Default::default() }).await;
        let registry = QuestRegistry::new(Arc::clone(&h.services));

        let old = registry.handler(1).await;
        old.accept(WELCOME).await.unwrap();
        let kill = QuestEvent::MonsterKilled {
            entity_type: "rat".to_string(),
        };
        registry.handle_event(1, &kill).await.unwrap();

        registry.unload(1);
        let new = registry.handler(1).await;
        assert!(!Arc::ptr_eq(&old, &new));

        let (a, b) = tokio::join!(old.turn_in(WELCOME), new.turn_in(WELCOME));
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(reward.calls.load(Ordering::SeqCst), 1);
        assert_eq!(new.status(WELCOME).await.unwrap(), QuestStatus::Finished);
    }
}
