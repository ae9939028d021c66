//! SQLite position store against a database file on disk

use chrono::Utc;
use lyra_common::db::{init_database, SqlitePositionStore};
use lyra_common::{MediaFile, PlaybackPositionRecord, PositionStore};
use tempfile::TempDir;

fn episode(dir: &TempDir) -> MediaFile {
    let path = dir.path().join("episode.mp3");
    std::fs::write(&path, b"not really audio").unwrap();
    MediaFile::from_path(&path).unwrap()
}

fn record_for(file: &MediaFile, position: f64) -> PlaybackPositionRecord {
    PlaybackPositionRecord {
        file_identity: file.identity(),
        file_path: file.path.clone(),
        file_name: file.name.clone(),
        position,
        duration: 3600.0,
        speed: Some(1.25),
        pitch: Some(1.0),
        last_played: Utc::now(),
    }
}

#[tokio::test]
async fn test_record_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("positions.db");
    let file = episode(&dir);

    let pool = init_database(&db_path).await.unwrap();
    SqlitePositionStore::new(pool.clone())
        .save(record_for(&file, 1234.5))
        .await
        .unwrap();
    pool.close().await;

    let store = SqlitePositionStore::new(init_database(&db_path).await.unwrap());
    let loaded = store.load(&file.identity()).await.unwrap().unwrap();
    assert_eq!(loaded.position, 1234.5);
    assert_eq!(loaded.speed, Some(1.25));
    assert_eq!(loaded.file_name, "episode.mp3");
}

#[tokio::test]
async fn test_identity_tracks_file_changes() {
    let dir = TempDir::new().unwrap();
    let store = SqlitePositionStore::new(
        init_database(&dir.path().join("positions.db")).await.unwrap(),
    );
    let file = episode(&dir);
    store.save(record_for(&file, 60.0)).await.unwrap();

    // Same path, different size: a different track as far as resume goes
    std::fs::write(&file.path, b"a re-encoded and longer file").unwrap();
    let changed = MediaFile::from_path(&file.path).unwrap();
    assert_ne!(changed.identity(), file.identity());
    assert!(store.load(&changed.identity()).await.unwrap().is_none());
    assert!(store.load(&file.identity()).await.unwrap().is_some());
}
