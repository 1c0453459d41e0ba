use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use dashmap::DashMap;

use super::world::{
    overrides_from_records, PropertyOverride, PropertyOverrideStore, Record, WorldDataStore,
    OVERRIDES_TABLE,
};
use crate::error::StoreError;
use crate::value::Value;

/// World data held in memory, filled programmatically
#[derive(Default)]
pub struct MemoryWorldData {
    tables: DashMap<String, BTreeMap<String, Record>>,
}

impl MemoryWorldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record; the `key` field is set from `key`
    pub fn insert<'a>(
        &self,
        table: &str,
        key: &str,
        fields: impl IntoIterator<Item = (&'a str, Value)>,
    ) {
        let mut record: Record = fields
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        record.insert("key".to_string(), Value::from(key));

        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), record);
    }

    pub fn remove(&self, table: &str, key: &str) {
        if let Some(mut records) = self.tables.get_mut(table) {
            records.remove(key);
        }
    }

    /// Add a level-scoped override row
    pub fn add_override(
        &self,
        element_type: &str,
        element_key: &str,
        level: Option<i32>,
        property: &str,
        value: &str,
    ) {
        let row_key = format!(
            "{}.{}.{}.{}",
            element_type,
            element_key,
            level.map(|l| l.to_string()).unwrap_or_default(),
            property
        );
        let level = level.map(|l| Value::Int(l.into())).unwrap_or(Value::Null);
        self.insert(
            OVERRIDES_TABLE,
            &row_key,
            [
                ("element_type", Value::from(element_type)),
                ("element_key", Value::from(element_key)),
                ("level", level),
                ("property", Value::from(property)),
                ("value", Value::from(value)),
            ],
        );
    }
}

#[async_trait]
impl WorldDataStore for MemoryWorldData {
    async fn fields(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let records = self
            .tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let fields: BTreeSet<&String> = records.values().flat_map(|r| r.keys()).collect();
        Ok(fields.into_iter().cloned().collect())
    }

    async fn record(&self, table: &str, key: &str) -> Result<Record, StoreError> {
        self.tables
            .get(table)
            .and_then(|records| records.get(key).cloned())
            .ok_or_else(|| StoreError::not_found(table, key))
    }

    async fn records(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        self.tables
            .get(table)
            .map(|records| records.values().cloned().collect())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

#[async_trait]
impl PropertyOverrideStore for MemoryWorldData {
    async fn overrides(
        &self,
        element_type: &str,
        element_key: &str,
        level: Option<i32>,
    ) -> Result<Vec<PropertyOverride>, StoreError> {
        let records = match self.tables.get(OVERRIDES_TABLE) {
            Some(table) => table.values().cloned().collect::<Vec<_>>(),
            None => return Ok(Vec::new()),
        };
        Ok(overrides_from_records(&records, element_type, element_key, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_lookup() {
        let world = MemoryWorldData::new();
        world.insert("world_npcs", "rat", [("name", Value::from("Rat")), ("hp", Value::Int(5))]);

        let record = world.record("world_npcs", "rat").await.unwrap();
        assert_eq!(record.get("key"), Some(&Value::from("rat")));
        assert_eq!(record.get("hp"), Some(&Value::Int(5)));

        let missing = world.record("world_npcs", "bat").await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
        assert!(world.records("nothing").await.unwrap_err().is_not_found());

        assert_eq!(world.fields("world_npcs").await.unwrap(), vec!["hp", "key", "name"]);
    }

    #[tokio::test]
    async fn test_overrides() {
        let world = MemoryWorldData::new();
        world.add_override("NPC", "rat", Some(2), "hp", "12");
        world.add_override("NPC", "rat", None, "hp", "8");

        let level_two = world.overrides("NPC", "rat", Some(2)).await.unwrap();
        assert_eq!(level_two, vec![PropertyOverride { property: "hp".into(), value: "12".into() }]);

        let unlevelled = world.overrides("NPC", "rat", None).await.unwrap();
        assert_eq!(unlevelled[0].value, "8");
    }
}
