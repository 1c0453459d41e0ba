use std::collections::HashMap;

use super::kind::ElementKind;
use crate::quest::QuestDetail;
use crate::value::Value;

/// Constant data of an element, field name to typed value
pub type ConstData = HashMap<String, Value>;

/// Kind-specific data filled in by the post-load hook
#[derive(Debug, Clone, Default)]
pub enum ElementDetail {
    #[default]
    None,
    Area {
        rooms: Vec<String>,
    },
    Quest(QuestDetail),
}

/// An element resolved from world data
#[derive(Debug, Clone)]
pub struct ElementInstance {
    key: String,
    level: Option<i32>,
    requested_type: String,
    type_id: String,
    kind: ElementKind,
    /// Fields from the model chain tables, before level overrides and defaults
    loaded: ConstData,
    data: ConstData,
    detail: ElementDetail,
}

impl ElementInstance {
    pub(crate) fn new(type_id: &str, kind: ElementKind, key: &str, level: Option<i32>) -> Self {
        Self {
            key: key.to_string(),
            level,
            requested_type: type_id.to_string(),
            type_id: type_id.to_string(),
            kind,
            loaded: ConstData::new(),
            data: ConstData::new(),
            detail: ElementDetail::None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn level(&self) -> Option<i32> {
        self.level
    }

    /// The type this instance was requested as
    pub fn requested_type(&self) -> &str {
        &self.requested_type
    }

    /// The runtime type, which differs from the requested one after reclassification
    pub fn element_type(&self) -> &str {
        &self.type_id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn data(&self) -> &ConstData {
        &self.data
    }

    pub fn detail(&self) -> &ElementDetail {
        &self.detail
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Whether any table of the model chain had a record for this key
    pub fn is_stored(&self) -> bool {
        !self.loaded.is_empty()
    }

    /// Display name, falling back to the key
    pub fn name(&self) -> &str {
        self.get_str("name").filter(|n| !n.is_empty()).unwrap_or(&self.key)
    }

    /// Store a field loaded from a model chain table
    pub(crate) fn set_loaded(&mut self, field: String, value: Value) {
        self.loaded.insert(field.clone(), value.clone());
        self.data.insert(field, value);
    }

    /// Store a level override or schema default
    pub(crate) fn set_const(&mut self, field: String, value: Value) {
        self.data.insert(field, value);
    }

    /// Drop the level-scoped layer so it can be resolved again
    pub(crate) fn reset_level_layer(&mut self, level: Option<i32>) {
        self.level = level;
        self.data = self.loaded.clone();
    }

    /// Swap the runtime type and behavior, keeping all loaded data
    pub(crate) fn reclassify(&mut self, type_id: &str, kind: ElementKind) {
        self.type_id = type_id.to_string();
        self.kind = kind;
    }

    pub(crate) fn set_detail(&mut self, detail: ElementDetail) {
        self.detail = detail;
    }
}
