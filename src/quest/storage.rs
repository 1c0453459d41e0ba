//! Quest Storage
//!
//! Persistence contract for per-character quest records.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use super::state::{CharacterId, CharacterQuestState, QuestFields};
use crate::error::StoreError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestStorage: Send + Sync {
    /// Every quest record of a character, finished ones included
    async fn character_quests(
        &self,
        character_id: CharacterId,
    ) -> Result<HashMap<String, CharacterQuestState>, StoreError>;

    async fn quest(
        &self,
        character_id: CharacterId,
        quest_key: &str,
    ) -> Result<Option<CharacterQuestState>, StoreError>;

    /// Create an empty record; an existing record is left untouched
    async fn add_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError>;

    async fn remove_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError>;

    /// Update some fields of an existing record
    async fn set_quest_fields(
        &self,
        character_id: CharacterId,
        quest_key: &str,
        fields: QuestFields,
    ) -> Result<(), StoreError>;

    /// Drop every quest record of a character
    async fn remove_character(&self, character_id: CharacterId) -> Result<(), StoreError>;
}

/// Quest storage kept in memory
#[derive(Default)]
pub struct MemoryQuestStore {
    quests: DashMap<CharacterId, HashMap<String, CharacterQuestState>>,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestStorage for MemoryQuestStore {
    async fn character_quests(
        &self,
        character_id: CharacterId,
    ) -> Result<HashMap<String, CharacterQuestState>, StoreError> {
        Ok(self
            .quests
            .get(&character_id)
            .map(|quests| quests.clone())
            .unwrap_or_default())
    }

    async fn quest(
        &self,
        character_id: CharacterId,
        quest_key: &str,
    ) -> Result<Option<CharacterQuestState>, StoreError> {
        Ok(self
            .quests
            .get(&character_id)
            .and_then(|quests| quests.get(quest_key).cloned()))
    }

    async fn add_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError> {
        self.quests
            .entry(character_id)
            .or_default()
            .entry(quest_key.to_string())
            .or_insert_with(CharacterQuestState::new);
        Ok(())
    }

    async fn remove_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError> {
        if let Some(mut quests) = self.quests.get_mut(&character_id) {
            quests.remove(quest_key);
        }
        Ok(())
    }

    async fn set_quest_fields(
        &self,
        character_id: CharacterId,
        quest_key: &str,
        fields: QuestFields,
    ) -> Result<(), StoreError> {
        let mut quests = self
            .quests
            .get_mut(&character_id)
            .ok_or_else(|| StoreError::not_found("character_quests", quest_key))?;
        let state = quests
            .get_mut(quest_key)
            .ok_or_else(|| StoreError::not_found("character_quests", quest_key))?;
        state.apply(&fields);
        Ok(())
    }

    async fn remove_character(&self, character_id: CharacterId) -> Result<(), StoreError> {
        self.quests.remove(&character_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let store = MemoryQuestStore::new();
        store.add_quest(1, "tutorial").await.unwrap();
        store
            .set_quest_fields(1, "tutorial", QuestFields::objectives(BTreeMap::from([(0, 2)])))
            .await
            .unwrap();
        store.add_quest(1, "tutorial").await.unwrap();

        let state = store.quest(1, "tutorial").await.unwrap().unwrap();
        assert_eq!(state.progress(0), 2);
        assert!(!state.finished);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryQuestStore::new();
        store.add_quest(1, "tutorial").await.unwrap();
        store.add_quest(1, "rats").await.unwrap();
        store.add_quest(2, "rats").await.unwrap();

        store.remove_quest(1, "rats").await.unwrap();
        assert_eq!(store.character_quests(1).await.unwrap().len(), 1);

        store.remove_character(1).await.unwrap();
        assert!(store.character_quests(1).await.unwrap().is_empty());
        assert!(store.quest(2, "rats").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_fields_on_missing_record() {
        let store = MemoryQuestStore::new();
        let err = store
            .set_quest_fields(1, "tutorial", QuestFields::finished())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
