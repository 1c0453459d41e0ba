use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::StoreError;
use crate::quest::state::{objectives_from_json, objectives_to_json};
use crate::quest::{CharacterId, CharacterQuestState, QuestFields, QuestStorage};

/// SQLite-backed quest storage
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_quests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id INTEGER NOT NULL,
                quest_key TEXT NOT NULL,
                finished INTEGER NOT NULL DEFAULT 0,
                objectives_json TEXT NOT NULL DEFAULT '{}',
                accepted_at TEXT,
                UNIQUE(character_id, quest_key)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_character_quests_character ON character_quests(character_id)",
        )
        .execute(pool)
        .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    fn state_from_row(row: &SqliteRow) -> Result<(String, CharacterQuestState), StoreError> {
        let decode = |e: sqlx::Error| StoreError::database("decode quest row", e);

        let quest_key: String = row.try_get("quest_key").map_err(decode)?;
        let finished: bool = row.try_get("finished").map_err(decode)?;
        let objectives_json: String = row.try_get("objectives_json").map_err(decode)?;
        let accepted_at: Option<String> = row.try_get("accepted_at").map_err(decode)?;

        let state = CharacterQuestState {
            finished,
            objectives: objectives_from_json(&objectives_json)?,
            accepted_at: accepted_at
                .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        };
        Ok((quest_key, state))
    }
}

#[async_trait]
impl QuestStorage for Database {
    async fn character_quests(
        &self,
        character_id: CharacterId,
    ) -> Result<HashMap<String, CharacterQuestState>, StoreError> {
        let rows = sqlx::query(
            "SELECT quest_key, finished, objectives_json, accepted_at FROM character_quests WHERE character_id = ?",
        )
        .bind(character_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::database("load character quests", e))?;

        rows.iter().map(Self::state_from_row).collect()
    }

    async fn quest(
        &self,
        character_id: CharacterId,
        quest_key: &str,
    ) -> Result<Option<CharacterQuestState>, StoreError> {
        let row = sqlx::query(
            "SELECT quest_key, finished, objectives_json, accepted_at FROM character_quests WHERE character_id = ? AND quest_key = ?",
        )
        .bind(character_id)
        .bind(quest_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::database("load quest", e))?;

        match row {
            Some(row) => Ok(Some(Self::state_from_row(&row)?.1)),
            None => Ok(None),
        }
    }

    async fn add_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO character_quests (character_id, quest_key, accepted_at) VALUES (?, ?, ?)",
        )
        .bind(character_id)
        .bind(quest_key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database("add quest", e))?;
        Ok(())
    }

    async fn remove_quest(&self, character_id: CharacterId, quest_key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM character_quests WHERE character_id = ? AND quest_key = ?")
            .bind(character_id)
            .bind(quest_key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("remove quest", e))?;
        Ok(())
    }

    async fn set_quest_fields(
        &self,
        character_id: CharacterId,
        quest_key: &str,
        fields: QuestFields,
    ) -> Result<(), StoreError> {
        let objectives_json = fields
            .objectives
            .as_ref()
            .map(objectives_to_json)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE character_quests
            SET finished = COALESCE(?, finished),
                objectives_json = COALESCE(?, objectives_json)
            WHERE character_id = ? AND quest_key = ?
            "#,
        )
        .bind(fields.finished)
        .bind(objectives_json)
        .bind(character_id)
        .bind(quest_key)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::database("update quest", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("character_quests", quest_key));
        }
        Ok(())
    }

    async fn remove_character(&self, character_id: CharacterId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM character_quests WHERE character_id = ?")
            .bind(character_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("remove character quests", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    async fn memory_db() -> Database {
        Database::new("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn test_quest_lifecycle() {
        let db = memory_db().await;

        db.add_quest(7, "rats").await.unwrap();
        db.set_quest_fields(7, "rats", QuestFields::objectives(BTreeMap::from([(0, 0)])))
            .await
            .unwrap();
        db.add_quest(7, "rats").await.unwrap();

        let state = db.quest(7, "rats").await.unwrap().unwrap();
        assert!(!state.finished);
        assert_eq!(state.objectives, BTreeMap::from([(0, 0)]));
        assert!(state.accepted_at.is_some());

        db.set_quest_fields(7, "rats", QuestFields::objectives(BTreeMap::from([(0, 10)])))
            .await
            .unwrap();
        db.set_quest_fields(7, "rats", QuestFields::finished()).await.unwrap();

        let quests = db.character_quests(7).await.unwrap();
        let state = quests.get("rats").unwrap();
        assert!(state.finished);
        assert_eq!(state.progress(0), 10);
    }

    #[tokio::test]
    async fn test_missing_record_update_fails() {
        let db = memory_db().await;
        let err = db
            .set_quest_fields(7, "rats", QuestFields::finished())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(db.quest(7, "rats").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_quest_and_character() {
        let db = memory_db().await;
        db.add_quest(1, "tutorial").await.unwrap();
        db.add_quest(1, "rats").await.unwrap();
        db.add_quest(2, "rats").await.unwrap();

        db.remove_quest(1, "tutorial").await.unwrap();
        assert_eq!(db.character_quests(1).await.unwrap().len(), 1);

        db.remove_character(1).await.unwrap();
        assert!(db.character_quests(1).await.unwrap().is_empty());
        assert_eq!(db.character_quests(2).await.unwrap().len(), 1);
    }
}
