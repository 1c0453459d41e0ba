//! Engine Errors
//!
//! Error types shared by the element resolver, quest engine and storage adapters.

use thiserror::Error;

/// Failures reported by world-data and quest storage collaborators
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{table} record not found: {key}")]
    NotFound { table: String, key: String },

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("failed to load {path}: {message}")]
    Load { path: String, message: String },
}

impl StoreError {
    pub fn not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn database(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn load(path: impl std::fmt::Debug, err: impl std::fmt::Display) -> Self {
        Self::Load {
            path: format!("{:?}", path),
            message: err.to_string(),
        }
    }

    /// Missing records and tables are expected while loading partial data
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::TableNotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Engine-level errors
///
/// `PermissionDenied` and `InvalidState` carry the text shown to the player.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{table} record not found: {key}")]
    DataNotFound { table: String, key: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("condition evaluation failed: {0}")]
    ConditionEval(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Errors the transport layer should relay to the player verbatim
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::InvalidState(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { table, key } => Self::DataNotFound { table, key },
            other => Self::Store(other),
        }
    }
}

impl From<mlua::Error> for EngineError {
    fn from(err: mlua::Error) -> Self {
        Self::Script(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_data_not_found() {
        let err: EngineError = StoreError::not_found("quests", "tutorial").into();
        assert!(matches!(err, EngineError::DataNotFound { ref table, ref key } if table == "quests" && key == "tutorial"));
        assert_eq!(err.to_string(), "quests record not found: tutorial");
    }

    #[test]
    fn test_user_facing_errors() {
        assert!(EngineError::permission_denied("Can not give up this quest.").is_user_facing());
        assert!(EngineError::invalid_state("Can not turn in this quest.").is_user_facing());
        assert!(!EngineError::config("bad table").is_user_facing());
        assert_eq!(
            EngineError::invalid_state("Can not find this quest.").to_string(),
            "Can not find this quest."
        );
    }
}
