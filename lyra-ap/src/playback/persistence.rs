//! Position persistence adapter
//!
//! Writes resume points to the external `PositionStore`. A position is kept
//! only when it is worth resuming from: past the first five seconds and
//! more than ten seconds before the end. Anything else clears the record.

use super::session::PlaybackSession;
use crate::error::Result;
use crate::state::SharedState;
use lyra_common::events::PlayerEvent;
use lyra_common::{PlaybackPositionRecord, PositionStore, TrackIdentity};
use std::sync::Arc;
use tracing::{debug, warn};

/// Positions at or before this are not worth resuming, seconds
pub const MIN_SAVE_POSITION: f64 = 5.0;
/// Positions this close to the end are not worth resuming, seconds
pub const END_MARGIN: f64 = 10.0;

/// Whether `position` should be stored for a track of `duration`
pub fn should_persist(position: f64, duration: f64) -> bool {
    position > MIN_SAVE_POSITION && position < duration - END_MARGIN
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SaveOutcome {
    Saved(f64),
    Cleared,
}

pub struct PositionPersistence {
    store: Arc<dyn PositionStore>,
    state: SharedState,
}

impl PositionPersistence {
    pub fn new(store: Arc<dyn PositionStore>, state: SharedState) -> Self {
        Self { store, state }
    }

    /// Store `position` for the session's track, or clear it per policy
    pub async fn save(&self, session: &PlaybackSession, position: f64) -> Result<SaveOutcome> {
        let duration = session.duration();
        if !should_persist(position, duration) {
            self.clear(session.identity()).await?;
            return Ok(SaveOutcome::Cleared);
        }

        let record = PlaybackPositionRecord {
            file_identity: session.identity().clone(),
            file_path: session.file.path.clone(),
            file_name: session.file.name.clone(),
            position,
            duration,
            speed: Some(session.speed),
            pitch: Some(session.pitch),
            last_played: lyra_common::time::now(),
        };
        self.store.save(record).await?;
        debug!("Saved position {:.1}s for {}", position, session.identity());

        self.state.emit(PlayerEvent::PositionSaved {
            identity: session.identity().clone(),
            position,
            timestamp: lyra_common::time::now(),
        });
        Ok(SaveOutcome::Saved(position))
    }

    /// Save, logging instead of failing; persistence never stops playback
    pub async fn save_quietly(&self, session: &PlaybackSession, position: f64) {
        if let Err(e) = self.save(session, position).await {
            warn!("Failed to persist position for {}: {}", session.identity(), e);
        }
    }

    /// Remove the record for `identity`
    pub async fn clear(&self, identity: &TrackIdentity) -> Result<()> {
        if self.store.delete(identity).await? {
            debug!("Cleared position for {}", identity);
            self.state.emit(PlayerEvent::PositionCleared {
                identity: identity.clone(),
                timestamp: lyra_common::time::now(),
            });
        }
        Ok(())
    }

    pub async fn clear_quietly(&self, identity: &TrackIdentity) {
        if let Err(e) = self.clear(identity).await {
            warn!("Failed to clear position for {}: {}", identity, e);
        }
    }

    /// Resume point for `identity`, read once when a track loads
    pub async fn load(&self, identity: &TrackIdentity) -> Option<PlaybackPositionRecord> {
        match self.store.load(identity).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load position for {}: {}", identity, e);
                None
            }
        }
    }
}
