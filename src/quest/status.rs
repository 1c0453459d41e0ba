//! Quest Status Predicates
//!
//! Named checks over a character's quest status, referenced by the `type`
//! field of quest dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::handler::QuestHandler;

/// A predicate over one quest of one character
#[async_trait]
pub trait QuestStatusCheck: Send + Sync {
    async fn matches(&self, quests: &QuestHandler, quest_key: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinStatus {
    Finished,
    NotFinished,
    InProgress,
    NotInProgress,
    Accomplished,
    NotAccomplished,
    CanProvide,
}

impl BuiltinStatus {
    const ALL: [(&'static str, BuiltinStatus); 7] = [
        ("FINISHED", BuiltinStatus::Finished),
        ("NOT_FINISHED", BuiltinStatus::NotFinished),
        ("IN_PROGRESS", BuiltinStatus::InProgress),
        ("NOT_IN_PROGRESS", BuiltinStatus::NotInProgress),
        ("ACCOMPLISHED", BuiltinStatus::Accomplished),
        ("NOT_ACCOMPLISHED", BuiltinStatus::NotAccomplished),
        ("CAN_PROVIDE", BuiltinStatus::CanProvide),
    ];
}

#[async_trait]
impl QuestStatusCheck for BuiltinStatus {
    async fn matches(&self, quests: &QuestHandler, quest_key: &str) -> bool {
        match self {
            BuiltinStatus::Finished => quests.is_finished(quest_key).await,
            BuiltinStatus::NotFinished => !quests.is_finished(quest_key).await,
            BuiltinStatus::InProgress => quests.is_in_progress(quest_key).await,
            BuiltinStatus::NotInProgress => !quests.is_in_progress(quest_key).await,
            BuiltinStatus::Accomplished => quests.is_accomplished(quest_key).await,
            BuiltinStatus::NotAccomplished => quests.is_not_accomplished(quest_key).await,
            BuiltinStatus::CanProvide => quests.can_provide(quest_key).await,
        }
    }
}

/// Registry of status predicates by key
pub struct QuestStatusSet {
    checks: HashMap<String, Arc<dyn QuestStatusCheck>>,
}

impl Default for QuestStatusSet {
    fn default() -> Self {
        let mut set = Self::empty();
        for (key, status) in BuiltinStatus::ALL {
            set.register(key, Arc::new(status));
        }
        set
    }
}

impl QuestStatusSet {
    pub fn empty() -> Self {
        Self {
            checks: HashMap::new(),
        }
    }

    /// Add or replace a predicate; keys are matched case-insensitively
    pub fn register(&mut self, key: &str, check: Arc<dyn QuestStatusCheck>) {
        self.checks.insert(key.to_uppercase(), check);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn QuestStatusCheck>> {
        self.checks.get(&key.to_uppercase()).cloned()
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        keys.sort();
        keys
    }
}
