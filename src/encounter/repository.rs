//! Encounter persistence port and the in-memory adapter

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use super::model::Encounter;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("record does not exist: {0}")]
    Missing(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where encounters live between operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncounterRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Encounter>, StorageError>;

    /// Overwrite an existing encounter
    async fn save(&self, encounter: &Encounter) -> Result<(), StorageError>;

    /// Insert a new encounter; fails with `Conflict` if the ID is taken
    async fn create(&self, encounter: &Encounter) -> Result<(), StorageError>;

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<Encounter>, StorageError>;
}

/// Encounters kept in process memory
#[derive(Debug, Default)]
pub struct MemoryEncounterStore {
    encounters: RwLock<HashMap<String, Encounter>>,
}

impl MemoryEncounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EncounterRepository for MemoryEncounterStore {
    async fn get(&self, id: &str) -> Result<Option<Encounter>, StorageError> {
        Ok(self.encounters.read().await.get(id).cloned())
    }

    async fn save(&self, encounter: &Encounter) -> Result<(), StorageError> {
        let mut encounters = self.encounters.write().await;
        match encounters.get_mut(encounter.id()) {
            Some(slot) => {
                *slot = encounter.clone();
                Ok(())
            }
            None => Err(StorageError::Missing(encounter.id().to_string())),
        }
    }

    async fn create(&self, encounter: &Encounter) -> Result<(), StorageError> {
        let mut encounters = self.encounters.write().await;
        if encounters.contains_key(encounter.id()) {
            return Err(StorageError::Conflict(encounter.id().to_string()));
        }
        encounters.insert(encounter.id().to_string(), encounter.clone());
        Ok(())
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<Encounter>, StorageError> {
        let mut found: Vec<Encounter> = self
            .encounters
            .read()
            .await
            .values()
            .filter(|e| e.session_id() == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at());
        Ok(found)
    }
}
