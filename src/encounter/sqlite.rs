//! Encounter persistence on SQLite

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::debug;

use super::model::Encounter;
use super::repository::{EncounterRepository, StorageError};

/// Encounter storage with database backing
#[derive(Debug, Clone)]
pub struct SqliteEncounterStore {
    pool: SqlitePool,
}

impl SqliteEncounterStore {
    /// Create a new encounter store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EncounterRepository for SqliteEncounterStore {
    async fn get(&self, id: &str) -> Result<Option<Encounter>, StorageError> {
        let row: Option<EncounterRow> =
            sqlx::query_as("SELECT data FROM encounters WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(r) => Ok(Some(r.into_encounter()?)),
            None => Ok(None),
        }
    }

    async fn save(&self, encounter: &Encounter) -> Result<(), StorageError> {
        let data = serde_json::to_string(encounter)?;

        let result = sqlx::query(
            r#"
            UPDATE encounters
            SET session_id = ?, status = ?, data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(encounter.session_id())
        .bind(encounter.status().as_str())
        .bind(&data)
        .bind(encounter.updated_at().to_rfc3339())
        .bind(encounter.id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Missing(encounter.id().to_string()));
        }
        debug!("Saved encounter {} ({})", encounter.id(), encounter.status());
        Ok(())
    }

    async fn create(&self, encounter: &Encounter) -> Result<(), StorageError> {
        let data = serde_json::to_string(encounter)?;

        let result = sqlx::query(
            r#"
            INSERT INTO encounters (id, session_id, status, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(encounter.id())
        .bind(encounter.session_id())
        .bind(encounter.status().as_str())
        .bind(&data)
        .bind(encounter.created_at().to_rfc3339())
        .bind(encounter.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict(encounter.id().to_string()));
        }
        Ok(())
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<Encounter>, StorageError> {
        let rows: Vec<EncounterRow> = sqlx::query_as(
            "SELECT data FROM encounters WHERE session_id = ? ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_encounter()).collect()
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct EncounterRow {
    data: String,
}

impl EncounterRow {
    fn into_encounter(self) -> Result<Encounter, StorageError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}
