//! Element Instance Resolver
//!
//! Builds element instances from the tables of their model chain, switching
//! an instance's runtime type when its base record declares a subtype.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, error, warn};

use super::instance::ElementInstance;
use super::kind::ElementKind;
use super::registry::{ElementTypeRegistry, TypeCatalog};
use crate::store::{PropertyOverrideStore, WorldDataStore};
use crate::value::parse_literal;

/// Field of a base record naming the instance's concrete type
pub const ELEMENT_TYPE_FIELD: &str = "element_type";

pub struct ElementResolver {
    types: Arc<ElementTypeRegistry>,
    world: Arc<dyn WorldDataStore>,
    overrides: Arc<dyn PropertyOverrideStore>,
    /// Shared by resolutions, taken exclusively while world data is swapped
    reload_lock: RwLock<()>,
}

impl ElementResolver {
    pub fn new(
        types: Arc<ElementTypeRegistry>,
        world: Arc<dyn WorldDataStore>,
        overrides: Arc<dyn PropertyOverrideStore>,
    ) -> Self {
        Self {
            types,
            world,
            overrides,
            reload_lock: RwLock::new(()),
        }
    }

    /// Wait for in-flight resolutions and hold off new ones until the guard drops
    ///
    /// Reloads hold this while replacing tables and types, so an instance is
    /// built from a single version of the data.
    pub async fn lock_for_reload(&self) -> RwLockWriteGuard<'_, ()> {
        self.reload_lock.write().await
    }

    pub fn types(&self) -> &Arc<ElementTypeRegistry> {
        &self.types
    }

    pub fn world(&self) -> &Arc<dyn WorldDataStore> {
        &self.world
    }

    /// Resolve one instance
    ///
    /// Missing records and type configuration problems are logged; the
    /// instance is still returned with whatever data could be loaded.
    pub async fn resolve(&self, type_id: &str, key: &str, level: Option<i32>) -> ElementInstance {
        let _generation = self.reload_lock.read().await;
        let catalog = self.types.snapshot().await;

        let kind = match catalog.get(type_id) {
            Some(element_type) => element_type.kind,
            None => {
                warn!("Resolving '{}' with unknown element type '{}'", key, type_id);
                ElementKind::Element
            }
        };
        let mut instance = ElementInstance::new(type_id, kind, key, level);

        let mut chain = match catalog.model_chain(type_id) {
            Ok(chain) => chain.to_vec(),
            Err(e) => {
                error!("Cannot load tables of {} '{}': {}", type_id, key, e);
                Vec::new()
            }
        };

        let base_table = chain.first().cloned();
        if let Some(base) = &base_table {
            self.load_table(&mut instance, base).await;
        }

        if let Some(reclassified) = Self::reclassify(&mut instance, &catalog) {
            chain = reclassified;
        }

        for table in &chain {
            if Some(table) != base_table.as_ref() {
                self.load_table(&mut instance, table).await;
            }
        }

        self.apply_level_layer(&mut instance, &catalog).await;

        let detail = instance
            .kind()
            .after_data_loaded(key, self.world.as_ref(), &catalog)
            .await;
        instance.set_detail(detail);

        debug!(
            "Resolved {} '{}' as {} with {} fields",
            type_id,
            key,
            instance.element_type(),
            instance.data().len()
        );
        instance
    }

    /// Change the level of a resolved instance, re-applying only overrides and defaults
    pub async fn set_level(&self, instance: &mut ElementInstance, level: Option<i32>) {
        let _generation = self.reload_lock.read().await;
        let catalog = self.types.snapshot().await;
        instance.reset_level_layer(level);
        self.apply_level_layer(instance, &catalog).await;
    }

    async fn load_table(&self, instance: &mut ElementInstance, table: &str) {
        match self.world.record(table, instance.key()).await {
            Ok(record) => {
                for (field, value) in record {
                    instance.set_loaded(field, value);
                }
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    "No '{}' record in {} for {}, skipping",
                    instance.key(),
                    table,
                    instance.element_type()
                );
            }
            Err(e) => {
                error!("Failed to load '{}' from {}: {}", instance.key(), table, e);
            }
        }
    }

    /// Switch to the type named by the base record; returns the new model chain
    fn reclassify(instance: &mut ElementInstance, catalog: &TypeCatalog) -> Option<Vec<String>> {
        let declared = instance
            .get_str(ELEMENT_TYPE_FIELD)
            .filter(|d| !d.is_empty() && *d != instance.element_type())?
            .to_string();

        let Some(target) = catalog.element_class(&declared) else {
            error!("No element type available for '{}'", declared);
            return None;
        };
        if target.key != declared {
            error!(
                "{} '{}' declares element_type '{}' but resolved to '{}', keeping {}",
                instance.element_type(),
                instance.key(),
                declared,
                target.key,
                instance.element_type()
            );
            return None;
        }

        let chain = match &target.model_chain {
            Ok(chain) => chain.clone(),
            Err(e) => {
                error!(
                    "Cannot reclassify '{}' as {}: {}, keeping {}",
                    instance.key(),
                    declared,
                    e,
                    instance.element_type()
                );
                return None;
            }
        };

        debug!(
            "Reclassified '{}' from {} to {}",
            instance.key(),
            instance.element_type(),
            target.key
        );
        instance.reclassify(&target.key, target.kind);
        Some(chain)
    }

    async fn apply_level_layer(&self, instance: &mut ElementInstance, catalog: &TypeCatalog) {
        let overrides = match self
            .overrides
            .overrides(instance.element_type(), instance.key(), instance.level())
            .await
        {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!(
                    "Failed to load property overrides of {} '{}': {}",
                    instance.element_type(),
                    instance.key(),
                    e
                );
                Vec::new()
            }
        };

        for item in overrides {
            let value = parse_literal(&item.value);
            instance.set_const(item.property, value);
        }

        if let Some(schema) = catalog.schema(instance.element_type()) {
            for (property, info) in schema.iter() {
                if instance.get(property).is_none() {
                    instance.set_const(property.to_string(), info.default_value());
                }
            }
        }
    }
}
