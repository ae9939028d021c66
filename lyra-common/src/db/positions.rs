//! Playback position store on SQLite

use crate::media::TrackIdentity;
use crate::persistence::{PlaybackPositionRecord, PositionStore};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::debug;

type PositionRow = (
    String,
    String,
    String,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    DateTime<Utc>,
);

/// `PositionStore` backed by the `playback_positions` table
#[derive(Clone)]
pub struct SqlitePositionStore {
    db: SqlitePool,
}

impl SqlitePositionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Most recently played records first
    pub async fn recent(&self, limit: u32) -> Result<Vec<PlaybackPositionRecord>> {
        let rows = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT file_identity, file_path, file_name, position, duration, speed, pitch, last_played
            FROM playback_positions
            ORDER BY last_played DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(row_to_record).collect())
    }
}

fn row_to_record(row: PositionRow) -> PlaybackPositionRecord {
    PlaybackPositionRecord {
        file_identity: TrackIdentity(row.0),
        file_path: PathBuf::from(row.1),
        file_name: row.2,
        position: row.3,
        duration: row.4,
        speed: row.5,
        pitch: row.6,
        last_played: row.7,
    }
}

#[async_trait]
impl PositionStore for SqlitePositionStore {
    async fn save(&self, record: PlaybackPositionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO playback_positions
                (file_identity, file_path, file_name, position, duration, speed, pitch, last_played)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_identity) DO UPDATE SET
                file_path = excluded.file_path,
                file_name = excluded.file_name,
                position = excluded.position,
                duration = excluded.duration,
                speed = excluded.speed,
                pitch = excluded.pitch,
                last_played = excluded.last_played
            "#,
        )
        .bind(record.file_identity.as_str())
        .bind(record.file_path.to_string_lossy().into_owned())
        .bind(&record.file_name)
        .bind(record.position)
        .bind(record.duration)
        .bind(record.speed)
        .bind(record.pitch)
        .bind(record.last_played)
        .execute(&self.db)
        .await?;

        debug!(
            "Saved position {:.1}s for {}",
            record.position, record.file_identity
        );
        Ok(())
    }

    async fn load(&self, identity: &TrackIdentity) -> Result<Option<PlaybackPositionRecord>> {
        let row = sqlx::query_as::<_, PositionRow>(
            r#"
            SELECT file_identity, file_path, file_name, position, duration, speed, pitch, last_played
            FROM playback_positions
            WHERE file_identity = ?
            "#,
        )
        .bind(identity.as_str())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(row_to_record))
    }

    async fn delete(&self, identity: &TrackIdentity) -> Result<bool> {
        let result = sqlx::query("DELETE FROM playback_positions WHERE file_identity = ?")
            .bind(identity.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
