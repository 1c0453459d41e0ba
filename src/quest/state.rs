//! Quest State Tracking
//!
//! Per-character quest records as persisted by quest storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Character identifier
pub type CharacterId = i64;

/// Lifecycle of a quest for one character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    /// Not accepted, or given up
    Untracked,
    /// Accepted and not yet turned in
    InProgress,
    /// Turned in
    Finished,
}

impl QuestStatus {
    pub fn of(state: Option<&CharacterQuestState>) -> Self {
        match state {
            None => QuestStatus::Untracked,
            Some(state) if state.finished => QuestStatus::Finished,
            Some(_) => QuestStatus::InProgress,
        }
    }
}

/// Stored state of one quest for one character
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterQuestState {
    pub finished: bool,
    /// Objective index to accumulated count
    pub objectives: BTreeMap<usize, i32>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl CharacterQuestState {
    pub fn new() -> Self {
        Self {
            accepted_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn progress(&self, index: usize) -> i32 {
        self.objectives.get(&index).copied().unwrap_or(0)
    }

    /// Add to an objective counter, capped at `target`; returns true if it changed
    pub fn add_progress(&mut self, index: usize, amount: i32, target: i32) -> bool {
        if amount <= 0 {
            return false;
        }
        let current = self.progress(index);
        let updated = current.saturating_add(amount).min(target);
        if updated <= current {
            return false;
        }
        self.objectives.insert(index, updated);
        true
    }

    pub fn apply(&mut self, fields: &QuestFields) {
        if let Some(finished) = fields.finished {
            self.finished = finished;
        }
        if let Some(objectives) = &fields.objectives {
            self.objectives = objectives.clone();
        }
    }
}

/// Partial update of a stored quest record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestFields {
    pub finished: Option<bool>,
    pub objectives: Option<BTreeMap<usize, i32>>,
}

impl QuestFields {
    pub fn finished() -> Self {
        Self {
            finished: Some(true),
            objectives: None,
        }
    }

    pub fn objectives(objectives: BTreeMap<usize, i32>) -> Self {
        Self {
            finished: None,
            objectives: Some(objectives),
        }
    }
}

/// Serialize objective counters for storage
pub fn objectives_to_json(objectives: &BTreeMap<usize, i32>) -> Result<String, serde_json::Error> {
    serde_json::to_string(objectives)
}

/// Deserialize objective counters from storage
pub fn objectives_from_json(json: &str) -> Result<BTreeMap<usize, i32>, serde_json::Error> {
    serde_json::from_str(json)
}
