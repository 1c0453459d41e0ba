//! Quest Events and Notifications
//!
//! Game events that advance objectives, and the messages pushed to a
//! character's client afterwards.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::definition::{ObjectiveType, QuestInfo};
use super::state::CharacterId;

/// Events that can trigger quest progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuestEvent {
    /// Character killed a monster
    MonsterKilled {
        /// Element key of the monster (e.g. "rat")
        entity_type: String,
    },

    /// Character collected items
    ItemCollected { item_id: String, count: i32 },

    /// Character talked to an NPC
    NpcInteraction { npc_id: String },

    /// Character entered a room
    LocationReached { location_id: String },

    /// Objective type declared only in data
    Custom {
        objective_type: String,
        target: String,
        count: i32,
    },
}

impl QuestEvent {
    pub fn objective_type(&self) -> ObjectiveType {
        match self {
            QuestEvent::MonsterKilled { .. } => ObjectiveType::KillMonster,
            QuestEvent::ItemCollected { .. } => ObjectiveType::CollectItem,
            QuestEvent::NpcInteraction { .. } => ObjectiveType::TalkTo,
            QuestEvent::LocationReached { .. } => ObjectiveType::ReachLocation,
            QuestEvent::Custom { objective_type, .. } => ObjectiveType::from_str(objective_type),
        }
    }

    pub fn target(&self) -> &str {
        match self {
            QuestEvent::MonsterKilled { entity_type } => entity_type,
            QuestEvent::ItemCollected { item_id, .. } => item_id,
            QuestEvent::NpcInteraction { npc_id } => npc_id,
            QuestEvent::LocationReached { location_id } => location_id,
            QuestEvent::Custom { target, .. } => target,
        }
    }

    pub fn count(&self) -> i32 {
        match self {
            QuestEvent::ItemCollected { count, .. } | QuestEvent::Custom { count, .. } => *count,
            _ => 1,
        }
    }
}

/// Message pushed to a character
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Message { text: String },
    /// The character's unfinished quests
    Quests { quests: Vec<QuestInfo> },
    QuestAccomplished { quest_key: String, name: String },
    StatusRefresh,
    LocationRefresh,
}

impl Notification {
    pub fn message(text: impl Into<String>) -> Self {
        Notification::Message { text: text.into() }
    }
}

/// Fire-and-forget delivery of notifications
pub trait Notifier: Send + Sync {
    fn send(&self, character_id: CharacterId, notification: Notification);
}

/// Notifier backed by one channel per connected character
#[derive(Default)]
pub struct ChannelNotifier {
    senders: DashMap<CharacterId, mpsc::UnboundedSender<Notification>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a character, replacing any previous channel
    pub fn register(&self, character_id: CharacterId) -> mpsc::UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(character_id, tx);
        rx
    }

    pub fn unregister(&self, character_id: CharacterId) {
        self.senders.remove(&character_id);
    }
}

impl Notifier for ChannelNotifier {
    fn send(&self, character_id: CharacterId, notification: Notification) {
        let closed = match self.senders.get(&character_id) {
            Some(sender) => sender.send(notification).is_err(),
            None => {
                debug!("Dropping notification for offline character {}", character_id);
                false
            }
        };
        if closed {
            self.unregister(character_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_objectives() {
        let kill = QuestEvent::MonsterKilled { entity_type: "rat".into() };
        assert_eq!(kill.objective_type(), ObjectiveType::KillMonster);
        assert_eq!(kill.target(), "rat");
        assert_eq!(kill.count(), 1);

        let collect = QuestEvent::ItemCollected { item_id: "rat_tail".into(), count: 3 };
        assert_eq!(collect.count(), 3);

        let custom = QuestEvent::Custom {
            objective_type: "craft".into(),
            target: "sword".into(),
            count: 2,
        };
        assert_eq!(custom.objective_type(), ObjectiveType::Custom("craft".into()));
    }

    #[test]
    fn test_notification_json() {
        let json = serde_json::to_string(&Notification::message("Accepted quest Rats.")).unwrap();
        assert_eq!(json, r#"{"type":"message","text":"Accepted quest Rats."}"#);

        let json = serde_json::to_string(&Notification::LocationRefresh).unwrap();
        assert_eq!(json, r#"{"type":"location_refresh"}"#);
    }

    #[tokio::test]
    async fn test_channel_notifier() {
        let notifier = ChannelNotifier::new();
        let mut rx = notifier.register(3);

        notifier.send(3, Notification::StatusRefresh);
        notifier.send(4, Notification::StatusRefresh);
        assert_eq!(rx.recv().await, Some(Notification::StatusRefresh));

        drop(rx);
        notifier.send(3, Notification::StatusRefresh);
        assert!(notifier.senders.is_empty());
    }
}
