//! Quest Definitions
//!
//! Quests are elements of kind `Quest`. Their objectives and dependencies are
//! rows of separate tables keyed by the quest's key.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::state::{CharacterId, CharacterQuestState};
use crate::element::{ElementDetail, ElementInstance};
use crate::error::StoreError;
use crate::store::{Record, WorldDataStore};
use crate::value::Value;

pub const OBJECTIVES_TABLE: &str = "quest_objectives";
pub const DEPENDENCIES_TABLE: &str = "quest_dependencies";

/// Type of quest objective
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    /// Kill X monsters of type Y
    KillMonster,
    /// Collect X items of type Y
    CollectItem,
    /// Talk to a specific NPC
    TalkTo,
    /// Reach a specific location
    ReachLocation,
    /// Any other tag declared in data
    Custom(String),
}

impl ObjectiveType {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "kill_monster" | "kill" => ObjectiveType::KillMonster,
            "collect_item" | "collect" => ObjectiveType::CollectItem,
            "talk_to" | "talk" => ObjectiveType::TalkTo,
            "reach_location" | "reach" | "location" => ObjectiveType::ReachLocation,
            other => ObjectiveType::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ObjectiveType::KillMonster => "kill_monster",
            ObjectiveType::CollectItem => "collect_item",
            ObjectiveType::TalkTo => "talk_to",
            ObjectiveType::ReachLocation => "reach_location",
            ObjectiveType::Custom(tag) => tag,
        }
    }
}

/// One countable goal of a quest
#[derive(Debug, Clone, Serialize)]
pub struct Objective {
    pub objective_type: ObjectiveType,
    /// Target entity/item/npc/location key
    pub target: String,
    /// Number required
    pub count: i32,
    pub description: String,
    #[serde(skip)]
    ordinal: i64,
}

impl Objective {
    fn from_record(record: &Record) -> Option<Self> {
        let objective_type = record
            .get("type")
            .or_else(|| record.get("objective_type"))
            .and_then(Value::as_str)?;
        let target = record.get("target").and_then(Value::as_str)?;
        let count = record
            .get("count")
            .and_then(Value::as_i64)
            .unwrap_or(1)
            .clamp(0, i32::MAX as i64) as i32;

        Some(Self {
            objective_type: ObjectiveType::from_str(objective_type),
            target: target.to_string(),
            count,
            description: record
                .get("desc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ordinal: record.get("ordinal").and_then(Value::as_i64).unwrap_or(0),
        })
    }
}

/// A prerequisite on another quest's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    /// Status predicate key, e.g. `FINISHED`
    pub kind: String,
    /// The quest the predicate is checked against
    pub quest: String,
}

impl Dependency {
    fn from_record(record: &Record) -> Option<Self> {
        let kind = record.get("type").and_then(Value::as_str)?;
        let quest = record.get("dependency").and_then(Value::as_str)?;
        Some(Self {
            kind: kind.to_uppercase(),
            quest: quest.to_string(),
        })
    }
}

/// Rows of a quest-keyed table belonging to `quest_key`
async fn quest_rows(
    world: &dyn WorldDataStore,
    table: &str,
    quest_key: &str,
) -> Result<Vec<Record>, StoreError> {
    match world.records(table).await {
        Ok(records) => Ok(records
            .into_iter()
            .filter(|r| r.get("quest").and_then(Value::as_str) == Some(quest_key))
            .collect()),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Objectives of a quest, ordered by `ordinal` then record key
pub async fn load_objectives(
    world: &dyn WorldDataStore,
    quest_key: &str,
) -> Result<Vec<Objective>, StoreError> {
    let mut objectives: Vec<Objective> = quest_rows(world, OBJECTIVES_TABLE, quest_key)
        .await?
        .iter()
        .filter_map(|record| {
            let objective = Objective::from_record(record);
            if objective.is_none() {
                warn!("Skipping malformed objective of quest '{}'", quest_key);
            }
            objective
        })
        .collect();
    objectives.sort_by_key(|o| o.ordinal);
    Ok(objectives)
}

pub async fn load_dependencies(
    world: &dyn WorldDataStore,
    quest_key: &str,
) -> Result<Vec<Dependency>, StoreError> {
    Ok(quest_rows(world, DEPENDENCIES_TABLE, quest_key)
        .await?
        .iter()
        .filter_map(|record| {
            let dependency = Dependency::from_record(record);
            if dependency.is_none() {
                warn!("Skipping malformed dependency of quest '{}'", quest_key);
            }
            dependency
        })
        .collect())
}

/// Quest data loaded alongside the quest element
#[derive(Debug, Clone, Default)]
pub struct QuestDetail {
    pub objectives: Vec<Objective>,
    pub dependencies: Vec<Dependency>,
}

impl QuestDetail {
    pub async fn load(world: &dyn WorldDataStore, quest_key: &str) -> Self {
        let objectives = load_objectives(world, quest_key).await.unwrap_or_else(|e| {
            warn!("Failed to load objectives of quest '{}': {}", quest_key, e);
            Vec::new()
        });
        let dependencies = load_dependencies(world, quest_key).await.unwrap_or_else(|e| {
            warn!("Failed to load dependencies of quest '{}': {}", quest_key, e);
            Vec::new()
        });
        Self {
            objectives,
            dependencies,
        }
    }
}

/// Progress of one objective as shown to the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveInfo {
    pub objective_type: String,
    pub target: String,
    pub description: String,
    pub current: i32,
    pub count: i32,
    pub accomplished: bool,
}

/// A quest as shown to the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestInfo {
    pub key: String,
    pub name: String,
    pub desc: String,
    pub objectives: Vec<ObjectiveInfo>,
    pub accomplished: bool,
}

/// A quest bound to the character tracking it
#[derive(Debug)]
pub struct Quest {
    element: ElementInstance,
    character_id: CharacterId,
}

impl Quest {
    pub fn new(element: ElementInstance, character_id: CharacterId) -> Self {
        Self {
            element,
            character_id,
        }
    }

    pub fn key(&self) -> &str {
        self.element.key()
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn desc(&self) -> &str {
        self.element.get_str("desc").unwrap_or_default()
    }

    pub fn element(&self) -> &ElementInstance {
        &self.element
    }

    pub fn character_id(&self) -> CharacterId {
        self.character_id
    }

    pub fn objectives(&self) -> &[Objective] {
        match self.element.detail() {
            ElementDetail::Quest(detail) => &detail.objectives,
            _ => &[],
        }
    }

    pub fn dependencies(&self) -> &[Dependency] {
        match self.element.detail() {
            ElementDetail::Quest(detail) => &detail.dependencies,
            _ => &[],
        }
    }

    /// Eligibility expression, if the quest has one
    pub fn condition(&self) -> Option<&str> {
        self.element
            .get_str("condition")
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Reward script path, relative to the scripts directory
    pub fn turn_in_script(&self) -> Option<&str> {
        self.element
            .get_str("turn_in_script")
            .filter(|s| !s.is_empty())
    }

    /// All objective counters have reached their targets
    pub fn is_accomplished(&self, state: &CharacterQuestState) -> bool {
        self.objectives()
            .iter()
            .enumerate()
            .all(|(index, objective)| state.progress(index) >= objective.count)
    }

    /// Advance every matching objective; returns true if any counter changed
    pub fn apply_progress(
        &self,
        state: &mut CharacterQuestState,
        objective_type: &ObjectiveType,
        target: &str,
        count: i32,
    ) -> bool {
        let mut changed = false;
        for (index, objective) in self.objectives().iter().enumerate() {
            if objective.objective_type == *objective_type && objective.target == target {
                changed |= state.add_progress(index, count, objective.count);
            }
        }
        changed
    }

    pub fn info(&self, state: &CharacterQuestState) -> QuestInfo {
        let objectives = self
            .objectives()
            .iter()
            .enumerate()
            .map(|(index, objective)| {
                let current = state.progress(index);
                ObjectiveInfo {
                    objective_type: objective.objective_type.as_str().to_string(),
                    target: objective.target.clone(),
                    description: objective.description.clone(),
                    current,
                    count: objective.count,
                    accomplished: current >= objective.count,
                }
            })
            .collect();

        QuestInfo {
            key: self.key().to_string(),
            name: self.name().to_string(),
            desc: self.desc().to_string(),
            objectives,
            accomplished: self.is_accomplished(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWorldData;

    fn objective_world() -> MemoryWorldData {
        let world = MemoryWorldData::new();
        world.insert(
            OBJECTIVES_TABLE,
            "rats_b",
            [
                ("quest", Value::from("rats")),
                ("type", Value::from("collect")),
                ("target", Value::from("rat_tail")),
                ("count", Value::Int(3)),
                ("ordinal", Value::Int(2)),
            ],
        );
        world.insert(
            OBJECTIVES_TABLE,
            "rats_a",
            [
                ("quest", Value::from("rats")),
                ("type", Value::from("kill")),
                ("target", Value::from("rat")),
                ("count", Value::Int(10)),
                ("ordinal", Value::Int(1)),
            ],
        );
        world.insert(
            OBJECTIVES_TABLE,
            "broken",
            [("quest", Value::from("rats")), ("type", Value::from("kill"))],
        );
        world.insert(
            DEPENDENCIES_TABLE,
            "rats_after_tutorial",
            [
                ("quest", Value::from("rats")),
                ("dependency", Value::from("tutorial")),
                ("type", Value::from("finished")),
            ],
        );
        world
    }

    #[test]
    fn test_objective_type_aliases() {
        assert_eq!(ObjectiveType::from_str("kill"), ObjectiveType::KillMonster);
        assert_eq!(ObjectiveType::from_str("TALK_TO"), ObjectiveType::TalkTo);
        assert_eq!(
            ObjectiveType::from_str("craft"),
            ObjectiveType::Custom("craft".to_string())
        );
        assert_eq!(ObjectiveType::Custom("craft".into()).as_str(), "craft");
    }

    #[tokio::test]
    async fn test_load_detail() {
        let world = objective_world();
        let detail = QuestDetail::load(&world, "rats").await;

        assert_eq!(detail.objectives.len(), 2);
        assert_eq!(detail.objectives[0].objective_type, ObjectiveType::KillMonster);
        assert_eq!(detail.objectives[0].count, 10);
        assert_eq!(detail.objectives[1].target, "rat_tail");
        assert_eq!(
            detail.dependencies,
            vec![Dependency { kind: "FINISHED".into(), quest: "tutorial".into() }]
        );

        let none = QuestDetail::load(&world, "tutorial").await;
        assert!(none.objectives.is_empty());
        assert!(none.dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_missing_tables_mean_no_rows() {
        let world = MemoryWorldData::new();
        assert!(load_objectives(&world, "rats").await.unwrap().is_empty());
        assert!(load_dependencies(&world, "rats").await.unwrap().is_empty());
    }
}
