//! Element Engine
//!
//! Data-driven game elements and a per-character quest system on top of
//! them. World data lives in TOML tables, quest progress in SQLite, and
//! quest conditions and rewards in Lua.

pub mod config;
pub mod db;
pub mod element;
pub mod engine;
pub mod error;
pub mod quest;
pub mod store;
pub mod value;

#[cfg(test)]
mod test_support;

pub use config::{EngineConfig, GameSettings};
pub use engine::{Engine, HotReloadEvent};
pub use error::{EngineError, StoreError};
pub use value::{parse_literal, Value};
