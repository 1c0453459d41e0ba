use serde::{Deserialize, Serialize};
use tracing::warn;

use super::instance::ElementDetail;
use super::registry::TypeCatalog;
use crate::quest::QuestDetail;
use crate::store::{Record, WorldDataStore};
use crate::value::Value;

pub const ELEMENT: &str = "ELEMENT";
pub const OBJECT: &str = "OBJECT";
pub const WORLD: &str = "WORLD";
pub const AREA: &str = "AREA";
pub const ROOM: &str = "ROOM";
pub const CHARACTER: &str = "CHARACTER";
pub const NPC: &str = "NPC";
pub const QUEST: &str = "QUEST";

/// Table declaring element types beyond the built-in ones
pub const ELEMENT_TYPES_TABLE: &str = "element_types";

/// Behavior variant selected for an element instance
///
/// Data-declared types inherit the kind of their first parent unless they
/// name one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Element,
    World,
    Area,
    Room,
    Character,
    Quest,
}

impl ElementKind {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "element" | "object" => Some(ElementKind::Element),
            "world" => Some(ElementKind::World),
            "area" => Some(ElementKind::Area),
            "room" => Some(ElementKind::Room),
            "character" | "npc" => Some(ElementKind::Character),
            "quest" => Some(ElementKind::Quest),
            _ => None,
        }
    }

    /// Kind-specific initialization run after constant data is loaded
    pub async fn after_data_loaded(
        &self,
        key: &str,
        world: &dyn WorldDataStore,
        catalog: &TypeCatalog,
    ) -> ElementDetail {
        match self {
            ElementKind::Quest => ElementDetail::Quest(QuestDetail::load(world, key).await),
            ElementKind::Area => {
                let Some(room_table) = catalog.model_name(ROOM) else {
                    return ElementDetail::Area { rooms: Vec::new() };
                };
                let rooms = match world.records(room_table).await {
                    Ok(records) => records
                        .iter()
                        .filter(|r| r.get("area").and_then(Value::as_str) == Some(key))
                        .filter_map(|r| r.get("key").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect(),
                    Err(e) => {
                        if !e.is_not_found() {
                            warn!("Failed to load rooms of area '{}': {}", key, e);
                        }
                        Vec::new()
                    }
                };
                ElementDetail::Area { rooms }
            }
            _ => ElementDetail::None,
        }
    }
}

/// A declared element type, before its chain and schema are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDeclaration {
    pub key: String,
    pub name: String,
    pub parents: Vec<String>,
    /// Data table owned by this type; only the root may leave it empty
    pub table: Option<String>,
    pub kind: Option<ElementKind>,
}

impl TypeDeclaration {
    pub fn new(key: &str, parents: &[&str], table: Option<&str>, kind: Option<ElementKind>) -> Self {
        Self {
            key: key.to_string(),
            name: key.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            table: table.map(str::to_string),
            kind,
        }
    }

    /// Read a declaration from an `element_types` record
    pub fn from_record(record: &Record) -> Option<Self> {
        let key = record.get("key").and_then(Value::as_str)?.to_string();

        let parents = match record.get("parents") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::Str(parent)) if !parent.is_empty() => vec![parent.clone()],
            _ => Vec::new(),
        };

        let table = record
            .get("table")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let kind = match record.get("kind").and_then(Value::as_str) {
            Some(name) => {
                let kind = ElementKind::from_name(name);
                if kind.is_none() {
                    warn!("Element type '{}' declares unknown kind '{}'", key, name);
                }
                kind
            }
            None => None,
        };

        let name = record
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&key)
            .to_string();

        Some(Self {
            key,
            name,
            parents,
            table,
            kind,
        })
    }
}

/// Element types every world has
pub fn builtin_types() -> Vec<TypeDeclaration> {
    vec![
        TypeDeclaration::new(ELEMENT, &[], None, Some(ElementKind::Element)),
        TypeDeclaration::new(OBJECT, &[ELEMENT], Some("objects"), None),
        TypeDeclaration::new(WORLD, &[ELEMENT], Some("worlds"), Some(ElementKind::World)),
        TypeDeclaration::new(AREA, &[OBJECT], Some("world_areas"), Some(ElementKind::Area)),
        TypeDeclaration::new(ROOM, &[OBJECT], Some("world_rooms"), Some(ElementKind::Room)),
        TypeDeclaration::new(CHARACTER, &[OBJECT], Some("characters"), Some(ElementKind::Character)),
        TypeDeclaration::new(NPC, &[CHARACTER], Some("world_npcs"), None),
        TypeDeclaration::new(QUEST, &[ELEMENT], Some("quests"), Some(ElementKind::Quest)),
    ]
}
