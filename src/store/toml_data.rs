use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::world::{
    overrides_from_records, PropertyOverride, PropertyOverrideStore, Record, WorldDataStore,
    OVERRIDES_TABLE,
};
use crate::error::StoreError;
use crate::value::Value;

type Tables = HashMap<String, BTreeMap<String, Record>>;

/// World data read from a directory of TOML files
///
/// Each `<table>.toml` file is one table. Every top-level TOML table inside it
/// is a record, keyed by its name.
pub struct TomlWorldData {
    dir: PathBuf,
    tables: RwLock<Arc<Tables>>,
}

impl TomlWorldData {
    /// Load every table under `dir`
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let tables = Self::read_tables(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            tables: RwLock::new(Arc::new(tables)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-read the directory and swap in the new tables
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let tables = Self::read_tables(&self.dir)?;
        let count = tables.len();
        *self.tables.write().await = Arc::new(tables);
        info!("Reloaded {} world data tables from {:?}", count, self.dir);
        Ok(count)
    }

    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn snapshot(&self) -> Arc<Tables> {
        Arc::clone(&*self.tables.read().await)
    }

    fn read_tables(dir: &Path) -> Result<Tables, StoreError> {
        let mut tables = Tables::new();
        if !dir.exists() {
            warn!("World data directory {:?} does not exist", dir);
            return Ok(tables);
        }

        let entries = std::fs::read_dir(dir).map_err(|e| StoreError::load(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::load(dir, e))?;
            let path = entry.path();

            if path.extension().map_or(false, |ext| ext == "toml") {
                let Some(table_name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                let content = std::fs::read_to_string(&path).map_err(|e| StoreError::load(&path, e))?;
                let parsed: toml::Table =
                    toml::from_str(&content).map_err(|e| StoreError::load(&path, e))?;

                let mut records = BTreeMap::new();
                for (key, value) in parsed {
                    let toml::Value::Table(fields) = value else {
                        warn!("Skipping non-table entry '{}' in {:?}", key, path);
                        continue;
                    };
                    let mut record: Record = fields
                        .into_iter()
                        .map(|(name, value)| (name, Value::from(value)))
                        .collect();
                    record.insert("key".to_string(), Value::from(key.as_str()));
                    records.insert(key, record);
                }

                debug!("Loaded table {} with {} records", table_name, records.len());
                tables.insert(table_name.to_string(), records);
            }
        }

        info!("Loaded {} world data tables from {:?}", tables.len(), dir);
        Ok(tables)
    }
}

#[async_trait]
impl WorldDataStore for TomlWorldData {
    async fn fields(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let tables = self.snapshot().await;
        let records = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;
        let fields: BTreeSet<&String> = records.values().flat_map(|r| r.keys()).collect();
        Ok(fields.into_iter().cloned().collect())
    }

    async fn record(&self, table: &str, key: &str) -> Result<Record, StoreError> {
        self.snapshot()
            .await
            .get(table)
            .and_then(|records| records.get(key).cloned())
            .ok_or_else(|| StoreError::not_found(table, key))
    }

    async fn records(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        self.snapshot()
            .await
            .get(table)
            .map(|records| records.values().cloned().collect())
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }
}

#[async_trait]
impl PropertyOverrideStore for TomlWorldData {
    async fn overrides(
        &self,
        element_type: &str,
        element_key: &str,
        level: Option<i32>,
    ) -> Result<Vec<PropertyOverride>, StoreError> {
        let tables = self.snapshot().await;
        let Some(rows) = tables.get(OVERRIDES_TABLE) else {
            return Ok(Vec::new());
        };
        let rows: Vec<Record> = rows.values().cloned().collect();
        Ok(overrides_from_records(&rows, element_type, element_key, level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_tables(dir: &Path) {
        std::fs::write(
            dir.join("world_npcs.toml"),
            r#"
[rat]
name = "Rat"
hp = 5
tags = ["vermin"]

[old_rat]
name = "Old Rat"
element_type = "BOSS"
"#,
        )
        .unwrap();

        std::fs::write(
            dir.join("element_properties.toml"),
            r#"
[rat_hp_2]
element_type = "NPC"
element_key = "rat"
level = 2
property = "hp"
value = "9"
"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_load_tables() {
        let temp_dir = TempDir::new().unwrap();
        write_tables(temp_dir.path());

        let world = TomlWorldData::load(temp_dir.path()).unwrap();
        assert_eq!(world.table_names().await, vec!["element_properties", "world_npcs"]);

        let rat = world.record("world_npcs", "rat").await.unwrap();
        assert_eq!(rat.get("hp"), Some(&Value::Int(5)));
        assert_eq!(rat.get("key"), Some(&Value::from("rat")));
        assert_eq!(rat.get("tags"), Some(&Value::List(vec![Value::from("vermin")])));

        let records = world.records("world_npcs").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(world.fields("world_npcs").await.unwrap().contains(&"element_type".to_string()));

        let overrides = world.overrides("NPC", "rat", Some(2)).await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].value, "9");
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let world = TomlWorldData::load(&temp_dir.path().join("missing")).unwrap();
        assert!(world.table_names().await.is_empty());
        assert!(world.record("quests", "tutorial").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let temp_dir = TempDir::new().unwrap();
        write_tables(temp_dir.path());
        let world = TomlWorldData::load(temp_dir.path()).unwrap();

        std::fs::write(temp_dir.path().join("quests.toml"), "[tutorial]\nname = \"Tutorial\"\n").unwrap();
        assert_eq!(world.reload().await.unwrap(), 3);
        assert!(world.record("quests", "tutorial").await.is_ok());
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.toml"), "[rat\nname = 1").unwrap();
        assert!(matches!(
            TomlWorldData::load(temp_dir.path()),
            Err(StoreError::Load { .. })
        ));
    }
}
