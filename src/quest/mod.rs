//! Quest System
//!
//! Data-driven quests tracked per character:
//! - Quests are elements resolved from the `quests` table
//! - Objectives and dependencies come from their own tables
//! - Each character's quest operations run one at a time
//! - Conditions and turn-in rewards are Lua scripts

pub mod condition;
pub mod definition;
pub mod dependency;
pub mod events;
pub mod handler;
pub mod registry;
pub mod runner;
pub mod state;
pub mod status;
pub mod storage;

pub use condition::{ConditionGate, StatementEvaluator};
pub use definition::{Dependency, Objective, ObjectiveType, Quest, QuestDetail, QuestInfo};
pub use dependency::DependencyEvaluator;
pub use events::{ChannelNotifier, Notification, Notifier, QuestEvent};
pub use handler::{QuestHandler, QuestServices, TurnInHook};
pub use registry::QuestRegistry;
pub use runner::{LuaStatementEvaluator, LuaTurnInHook};
pub use state::{CharacterId, CharacterQuestState, QuestFields, QuestStatus};
pub use status::{QuestStatusCheck, QuestStatusSet};
pub use storage::{MemoryQuestStore, QuestStorage};
