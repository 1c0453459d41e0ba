//! Element Type Registry
//!
//! Resolves every declared element type once into its model chain and merged
//! property schema. The whole catalog is rebuilt and swapped on reload.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::kind::{builtin_types, ElementKind, TypeDeclaration, ELEMENT, ELEMENT_TYPES_TABLE};
use crate::error::EngineError;
use crate::store::{Record, WorldDataStore};
use crate::value::{parse_literal, Value};

/// Table of per-type property declarations
pub const PROPERTIES_TABLE: &str = "properties_dict";

/// One declared property of an element type
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub desc: String,
    /// Default value in literal form
    pub default: String,
    pub mutable: bool,
}

impl PropertyInfo {
    pub fn default_value(&self) -> Value {
        parse_literal(&self.default)
    }
}

/// Property schema in declaration order, parents' entries first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertySchema {
    entries: Vec<(String, PropertyInfo)>,
}

impl PropertySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property, replacing an existing entry in place
    pub fn insert(&mut self, property: &str, info: PropertyInfo) {
        match self.entries.iter_mut().find(|(name, _)| name == property) {
            Some(entry) => entry.1 = info,
            None => self.entries.push((property.to_string(), info)),
        }
    }

    pub fn merge(&mut self, other: &PropertySchema) {
        for (property, info) in &other.entries {
            self.insert(property, info.clone());
        }
    }

    pub fn get(&self, property: &str) -> Option<&PropertyInfo> {
        self.entries
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, info)| info)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyInfo)> {
        self.entries.iter().map(|(name, info)| (name.as_str(), info))
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resolved element type
#[derive(Debug, Clone)]
pub struct ElementType {
    pub key: String,
    pub name: String,
    pub kind: ElementKind,
    /// Own data table
    pub table: Option<String>,
    /// Tables to load, base first; an error when this type or an ancestor lacks a table
    pub model_chain: Result<Vec<String>, String>,
    pub schema: PropertySchema,
}

/// Immutable snapshot of every resolved element type
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: HashMap<String, ElementType>,
}

struct PropertyRecord {
    element_type: String,
    property: String,
    info: PropertyInfo,
}

impl PropertyRecord {
    fn from_record(record: &Record) -> Option<Self> {
        let element_type = record.get("element_type").and_then(Value::as_str)?;
        let property = record.get("property").and_then(Value::as_str)?;
        let text = |field: &str| {
            record
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            element_type: element_type.to_string(),
            property: property.to_string(),
            info: PropertyInfo {
                name: text("name"),
                desc: text("desc"),
                default: record.get("default").map(Value::to_literal).unwrap_or_default(),
                mutable: record.get("mutable").and_then(Value::as_bool).unwrap_or(false),
            },
        })
    }
}

impl TypeCatalog {
    /// Build from the built-in types plus the types and properties declared in world data
    pub async fn load(world: &dyn WorldDataStore) -> Self {
        let mut declarations = builtin_types();
        match world.records(ELEMENT_TYPES_TABLE).await {
            Ok(records) => {
                for record in &records {
                    match TypeDeclaration::from_record(record) {
                        Some(decl) => declarations.push(decl),
                        None => warn!("Skipping element type record without a key"),
                    }
                }
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => error!("Failed to read element types: {}", e),
        }

        let properties = match world.records(PROPERTIES_TABLE).await {
            Ok(records) => records
                .iter()
                .filter_map(|record| {
                    let property = PropertyRecord::from_record(record);
                    if property.is_none() {
                        warn!("Skipping property record without element_type or property");
                    }
                    property
                })
                .collect(),
            Err(e) => {
                if !e.is_not_found() {
                    error!("Failed to read property declarations: {}", e);
                }
                Vec::new()
            }
        };

        Self::build(declarations, properties)
    }

    fn build(declarations: Vec<TypeDeclaration>, properties: Vec<PropertyRecord>) -> Self {
        let mut raw: HashMap<String, TypeDeclaration> = HashMap::new();
        for decl in declarations {
            if raw.contains_key(&decl.key) {
                warn!("Duplicate element type '{}', overwriting", decl.key);
            }
            raw.insert(decl.key.clone(), decl);
        }

        let mut own_properties: HashMap<String, Vec<(String, PropertyInfo)>> = HashMap::new();
        for record in properties {
            if !raw.contains_key(&record.element_type) {
                warn!(
                    "Property '{}' declared for unknown element type '{}'",
                    record.property, record.element_type
                );
                continue;
            }
            own_properties
                .entry(record.element_type)
                .or_default()
                .push((record.property, record.info));
        }

        let mut catalog = TypeCatalog::default();
        for id in Self::topological_sort(&raw) {
            if let Some(decl) = raw.get(&id) {
                let resolved = catalog.resolve_type(decl, own_properties.get(&id));
                if let Err(e) = &resolved.model_chain {
                    error!("Element type '{}' has no usable model chain: {}", id, e);
                }
                catalog.types.insert(id, resolved);
            }
        }

        info!("Resolved {} element types", catalog.types.len());
        catalog
    }

    /// Parents before children; types on an inheritance cycle are left out
    fn topological_sort(raw: &HashMap<String, TypeDeclaration>) -> Vec<String> {
        let mut sorted = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        fn visit(
            id: &str,
            raw: &HashMap<String, TypeDeclaration>,
            sorted: &mut Vec<String>,
            visited: &mut HashSet<String>,
            visiting: &mut HashSet<String>,
        ) -> Result<(), String> {
            if visited.contains(id) {
                return Ok(());
            }
            if visiting.contains(id) {
                return Err(format!("Circular inheritance detected at '{}'", id));
            }

            visiting.insert(id.to_string());

            if let Some(decl) = raw.get(id) {
                for parent in &decl.parents {
                    if !raw.contains_key(parent) {
                        warn!("Element type '{}' extends unknown parent '{}'", id, parent);
                        continue;
                    }
                    visit(parent, raw, sorted, visited, visiting)?;
                }
            }

            visiting.remove(id);
            visited.insert(id.to_string());
            sorted.push(id.to_string());

            Ok(())
        }

        let mut ids: Vec<&String> = raw.keys().collect();
        ids.sort();
        for id in ids {
            if let Err(e) = visit(id, raw, &mut sorted, &mut visited, &mut visiting) {
                error!("Skipping element type '{}': {}", id, e);
                visiting.clear();
            }
        }

        sorted
    }

    fn resolve_type(
        &self,
        decl: &TypeDeclaration,
        own_properties: Option<&Vec<(String, PropertyInfo)>>,
    ) -> ElementType {
        let parents: Vec<&ElementType> = decl
            .parents
            .iter()
            .filter_map(|parent| self.types.get(parent))
            .collect();

        let kind = decl
            .kind
            .or_else(|| parents.first().map(|p| p.kind))
            .unwrap_or(ElementKind::Element);

        // Only the root may go without a table
        let model_chain = if decl.key == ELEMENT {
            Ok(decl.table.iter().cloned().collect())
        } else {
            let mut chain: Vec<String> = Vec::new();
            let mut failure = None;
            for parent in &parents {
                match &parent.model_chain {
                    Ok(tables) => {
                        for table in tables {
                            if !chain.contains(table) {
                                chain.push(table.clone());
                            }
                        }
                    }
                    Err(e) => {
                        failure.get_or_insert_with(|| format!("parent '{}': {}", parent.key, e));
                    }
                }
            }

            match (failure, &decl.table) {
                (Some(e), _) => Err(e),
                (None, None) => Err(format!("{}'s model name is empty", decl.key)),
                (None, Some(table)) => {
                    if !chain.contains(table) {
                        chain.push(table.clone());
                    }
                    Ok(chain)
                }
            }
        };

        let mut schema = PropertySchema::new();
        for parent in &parents {
            schema.merge(&parent.schema);
        }
        for (property, info) in own_properties.into_iter().flatten() {
            schema.insert(property, info.clone());
        }

        ElementType {
            key: decl.key.clone(),
            name: decl.name.clone(),
            kind,
            table: decl.table.clone(),
            model_chain,
            schema,
        }
    }

    pub fn get(&self, type_id: &str) -> Option<&ElementType> {
        self.types.get(type_id)
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn model_chain(&self, type_id: &str) -> Result<&[String], EngineError> {
        let element_type = self
            .get(type_id)
            .ok_or_else(|| EngineError::config(format!("Unknown element type '{}'", type_id)))?;
        element_type
            .model_chain
            .as_deref()
            .map_err(|e| EngineError::config(e.clone()))
    }

    pub fn schema(&self, type_id: &str) -> Option<&PropertySchema> {
        self.get(type_id).map(|t| &t.schema)
    }

    /// Own table of a type
    pub fn model_name(&self, type_id: &str) -> Option<&str> {
        self.get(type_id).and_then(|t| t.table.as_deref())
    }

    /// The type implementing a declared `element_type`, or the root type when unknown
    pub fn element_class(&self, declared: &str) -> Option<&ElementType> {
        self.get(declared).or_else(|| self.get(ELEMENT))
    }
}

/// Shared handle to the current type catalog
pub struct ElementTypeRegistry {
    catalog: RwLock<Arc<TypeCatalog>>,
}

impl ElementTypeRegistry {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
        }
    }

    pub async fn load(world: &dyn WorldDataStore) -> Self {
        Self::new(TypeCatalog::load(world).await)
    }

    /// Rebuild every type from world data and replace the catalog
    ///
    /// Resolutions already holding a snapshot finish against the old catalog.
    pub async fn reload(&self, world: &dyn WorldDataStore) {
        let catalog = TypeCatalog::load(world).await;
        let count = catalog.len();
        *self.catalog.write().await = Arc::new(catalog);
        info!("Element type registry reloaded with {} types", count);
    }

    pub async fn snapshot(&self) -> Arc<TypeCatalog> {
        Arc::clone(&*self.catalog.read().await)
    }

    pub async fn resolve_model_chain(&self, type_id: &str) -> Result<Vec<String>, EngineError> {
        self.snapshot().await.model_chain(type_id).map(<[String]>::to_vec)
    }

    pub async fn resolve_schema(&self, type_id: &str) -> Result<PropertySchema, EngineError> {
        self.snapshot()
            .await
            .schema(type_id)
            .cloned()
            .ok_or_else(|| EngineError::config(format!("Unknown element type '{}'", type_id)))
    }

    pub async fn model_name(&self, type_id: &str) -> Option<String> {
        self.snapshot().await.model_name(type_id).map(str::to_string)
    }
}
