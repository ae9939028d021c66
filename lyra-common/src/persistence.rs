//! Playback position records and the position store boundary
//!
//! The store is owned by the embedding application. The player writes
//! records through `PositionStore` and reads one back when a track loads so
//! the UI can offer a resume.

use crate::media::TrackIdentity;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Persisted resume point for one track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPositionRecord {
    pub file_identity: TrackIdentity,
    pub file_path: PathBuf,
    pub file_name: String,
    /// Position in seconds
    pub position: f64,
    /// Track duration in seconds
    pub duration: f64,
    /// Playback speed at save time
    pub speed: Option<f64>,
    /// Pitch ratio at save time (1.0 = no shift)
    pub pitch: Option<f64>,
    pub last_played: DateTime<Utc>,
}

/// External store for playback positions, keyed by track identity
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Insert or replace the record for `record.file_identity`
    async fn save(&self, record: PlaybackPositionRecord) -> Result<()>;

    async fn load(&self, identity: &TrackIdentity) -> Result<Option<PlaybackPositionRecord>>;

    /// Remove the record, returning whether one existed
    async fn delete(&self, identity: &TrackIdentity) -> Result<bool>;
}

/// In-memory position store
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    records: RwLock<HashMap<TrackIdentity, PlaybackPositionRecord>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn save(&self, record: PlaybackPositionRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.file_identity.clone(), record);
        Ok(())
    }

    async fn load(&self, identity: &TrackIdentity) -> Result<Option<PlaybackPositionRecord>> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn delete(&self, identity: &TrackIdentity) -> Result<bool> {
        Ok(self.records.write().await.remove(identity).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, position: f64) -> PlaybackPositionRecord {
        PlaybackPositionRecord {
            file_identity: TrackIdentity(id.to_string()),
            file_path: PathBuf::from(format!("/music/{}.mp3", id)),
            file_name: format!("{}.mp3", id),
            position,
            duration: 180.0,
            speed: Some(1.0),
            pitch: None,
            last_played: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_upsert_and_delete() {
        let store = MemoryPositionStore::new();
        assert!(store.is_empty().await);

        store.save(record("a", 10.0)).await.unwrap();
        store.save(record("a", 20.0)).await.unwrap();
        assert_eq!(store.len().await, 1);

        let loaded = store.load(&TrackIdentity("a".into())).await.unwrap().unwrap();
        assert_eq!(loaded.position, 20.0);

        assert!(store.delete(&TrackIdentity("a".into())).await.unwrap());
        assert!(!store.delete(&TrackIdentity("a".into())).await.unwrap());
        assert!(store.load(&TrackIdentity("a".into())).await.unwrap().is_none());
    }
}
