//! World Data Stores
//!
//! Read-only access to the tables elements are resolved from.

mod memory;
mod toml_data;
mod world;

pub use memory::MemoryWorldData;
pub use toml_data::TomlWorldData;
pub use world::{
    overrides_from_records, PropertyOverride, PropertyOverrideStore, Record, WorldDataStore,
    OVERRIDES_TABLE,
};

#[cfg(test)]
pub use world::{MockPropertyOverrideStore, MockWorldDataStore};
