use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::value::Value;

/// Table holding level-scoped property overrides
pub const OVERRIDES_TABLE: &str = "element_properties";

/// One row of a world-data table, field name to value
pub type Record = HashMap<String, Value>;

/// Read access to world-data tables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorldDataStore: Send + Sync {
    /// Field names used by a table, sorted
    async fn fields(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// The record stored under `key`, or `StoreError::NotFound`
    async fn record(&self, table: &str, key: &str) -> Result<Record, StoreError>;

    /// Every record of a table, in key order
    async fn records(&self, table: &str) -> Result<Vec<Record>, StoreError>;
}

/// A level-scoped property value, still in literal form
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOverride {
    pub property: String,
    pub value: String,
}

/// Lookup of level-scoped property overrides
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PropertyOverrideStore: Send + Sync {
    async fn overrides(
        &self,
        element_type: &str,
        element_key: &str,
        level: Option<i32>,
    ) -> Result<Vec<PropertyOverride>, StoreError>;
}

/// Select the override rows for one element instance
///
/// A row without a `level` field only matches an instance without a level.
pub fn overrides_from_records(
    records: &[Record],
    element_type: &str,
    element_key: &str,
    level: Option<i32>,
) -> Vec<PropertyOverride> {
    records
        .iter()
        .filter(|r| r.get("element_type").and_then(Value::as_str) == Some(element_type))
        .filter(|r| r.get("element_key").and_then(Value::as_str) == Some(element_key))
        .filter(|r| {
            let row_level = r
                .get("level")
                .filter(|v| !v.is_null())
                .and_then(Value::as_i64);
            row_level == level.map(i64::from)
        })
        .filter_map(|r| {
            let property = r.get("property").and_then(Value::as_str)?;
            let value = r.get("value").map(Value::to_literal).unwrap_or_default();
            Some(PropertyOverride {
                property: property.to_string(),
                value,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: Option<i64>, property: &str, value: Value) -> Record {
        let mut record = Record::new();
        record.insert("element_type".to_string(), Value::from("NPC"));
        record.insert("element_key".to_string(), Value::from("rat"));
        if let Some(level) = level {
            record.insert("level".to_string(), Value::Int(level));
        }
        record.insert("property".to_string(), Value::from(property));
        record.insert("value".to_string(), value);
        record
    }

    #[test]
    fn test_filters_by_level() {
        let records = vec![
            row(None, "hp", Value::from("10")),
            row(Some(2), "hp", Value::from("20")),
            row(Some(3), "hp", Value::Int(30)),
        ];

        let none = overrides_from_records(&records, "NPC", "rat", None);
        assert_eq!(none, vec![PropertyOverride { property: "hp".into(), value: "10".into() }]);

        let two = overrides_from_records(&records, "NPC", "rat", Some(2));
        assert_eq!(two[0].value, "20");

        let three = overrides_from_records(&records, "NPC", "rat", Some(3));
        assert_eq!(three[0].value, "30");

        assert!(overrides_from_records(&records, "NPC", "rat", Some(4)).is_empty());
        assert!(overrides_from_records(&records, "ROOM", "rat", None).is_empty());
    }
}
