//! Media file descriptors and track identity
//!
//! `MediaFile` is what the file-browsing collaborator hands to the player.
//! The player only consumes non-directory entries with a recognized audio
//! extension, and keys persisted positions by a `TrackIdentity` derived from
//! path, size and modification time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Audio file extensions the player accepts (lowercase, without dot)
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4b", "mp4", "wav", "aac", "flac", "ogg", "oga", "wma", "aiff", "aif", "opus",
    "caf",
];

/// File descriptor supplied by the media browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Display name (usually the file name)
    pub name: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modification_date: Option<DateTime<Utc>>,
    /// Whether this entry is a directory
    pub is_directory: bool,
    /// Lowercase extension without dot
    pub file_extension: String,
    /// Explicit identifier supplied by the collaborator, overrides the derived identity
    #[serde(default)]
    pub identifier: Option<String>,
}

impl MediaFile {
    /// Build a descriptor from file system metadata
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)?;
        let modification_date = metadata.modified().ok().map(DateTime::<Utc>::from);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            path: path.to_path_buf(),
            size: metadata.len(),
            modification_date,
            is_directory: metadata.is_dir(),
            file_extension: extension_of(path),
            identifier: None,
        })
    }

    /// True when the player can attempt to load this entry
    pub fn is_playable(&self) -> bool {
        !self.is_directory && is_audio_extension(&self.file_extension)
    }

    /// Stable identity used to key persisted playback positions
    pub fn identity(&self) -> TrackIdentity {
        match &self.identifier {
            Some(id) => TrackIdentity(id.clone()),
            None => TrackIdentity::derive(
                &self.path,
                self.size,
                self.modification_date.map(|d| d.timestamp()),
            ),
        }
    }
}

/// Lowercase extension of a path, empty when absent
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Check an extension against the recognized audio list
pub fn is_audio_extension(extension: &str) -> bool {
    let ext = extension.trim_start_matches('.').to_lowercase();
    AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// Stable key for a track: hex SHA-256 of `path|size|mtime`, or an explicit identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackIdentity(pub String);

impl TrackIdentity {
    /// Derive an identity from path, size and modification time (unix seconds)
    pub fn derive(path: &Path, size: u64, modified_unix: Option<i64>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(b"|");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(modified_unix.unwrap_or(0).to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(path: &str, size: u64) -> MediaFile {
        MediaFile {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: PathBuf::from(path),
            size,
            modification_date: DateTime::from_timestamp(1_700_000_000, 0),
            is_directory: false,
            file_extension: extension_of(Path::new(path)),
            identifier: None,
        }
    }

    #[test]
    fn test_identity_is_stable() {
        let a = media("/music/a.mp3", 1234);
        let b = media("/music/a.mp3", 1234);
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().as_str().len(), 64);
    }

    #[test]
    fn test_identity_changes_with_size_or_mtime() {
        let a = media("/music/a.mp3", 1234);
        let b = media("/music/a.mp3", 1235);
        assert_ne!(a.identity(), b.identity());

        let mut c = media("/music/a.mp3", 1234);
        c.modification_date = DateTime::from_timestamp(1_700_000_001, 0);
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_explicit_identifier_wins() {
        let mut a = media("/music/a.mp3", 1234);
        a.identifier = Some("episode-42".to_string());
        assert_eq!(a.identity(), TrackIdentity("episode-42".to_string()));
    }

    #[test]
    fn test_playable_filter() {
        assert!(media("/music/a.FLAC", 1).is_playable());
        assert!(media("/music/a.opus", 1).is_playable());
        assert!(!media("/music/notes.txt", 1).is_playable());

        let mut dir = media("/music/album.mp3", 0);
        dir.is_directory = true;
        assert!(!dir.is_playable());
    }

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Track.WAV");
        std::fs::write(&path, vec![0u8; 16]).unwrap();

        let file = MediaFile::from_path(&path).unwrap();
        assert_eq!(file.name, "Track.WAV");
        assert_eq!(file.size, 16);
        assert_eq!(file.file_extension, "wav");
        assert!(file.modification_date.is_some());
        assert!(file.is_playable());
    }
}
