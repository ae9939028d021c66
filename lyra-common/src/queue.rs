//! Playback queue boundary
//!
//! The player never owns ordering or shuffle logic. On natural completion or
//! an explicit skip it asks a `PlaybackQueue` for the neighbouring track.
//! `ListQueue` is a plain in-memory implementation used by the CLI and tests.

use crate::media::MediaFile;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Queue collaborator consulted by the player
pub trait PlaybackQueue: Send + Sync {
    /// Move to the next track and return it, or `None` at the end of the queue
    fn advance_to_next(&self) -> Option<MediaFile>;

    /// Move to the previous track and return it, or `None` at the start
    fn go_to_previous(&self) -> Option<MediaFile>;

    /// Look at the track `advance_to_next` would return, without moving
    ///
    /// Used to prepare a crossfade. Queues that cannot predict their next
    /// entry return `None`, which makes the player fall back to
    /// stop-then-load.
    fn peek_next(&self) -> Option<MediaFile> {
        None
    }
}

/// Queue traversal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Normal,
    RepeatOne,
    RepeatAll,
    Shuffle,
}

#[derive(Debug)]
struct ListQueueInner {
    entries: Vec<MediaFile>,
    /// Traversal order as indices into `entries`
    order: Vec<usize>,
    /// Position within `order`
    current: Option<usize>,
    mode: PlaybackMode,
}

impl ListQueueInner {
    fn next_position(&self) -> Option<usize> {
        if self.order.is_empty() {
            return None;
        }
        let Some(current) = self.current else {
            return Some(0);
        };
        match self.mode {
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::RepeatAll | PlaybackMode::Shuffle => {
                Some((current + 1) % self.order.len())
            }
            PlaybackMode::Normal => {
                (current + 1 < self.order.len()).then_some(current + 1)
            }
        }
    }

    fn previous_position(&self) -> Option<usize> {
        let current = self.current?;
        match self.mode {
            PlaybackMode::RepeatOne => Some(current),
            PlaybackMode::RepeatAll | PlaybackMode::Shuffle if current == 0 => {
                self.order.len().checked_sub(1)
            }
            _ => current.checked_sub(1),
        }
    }

    fn entry_at(&self, position: usize) -> Option<MediaFile> {
        self.order
            .get(position)
            .and_then(|&index| self.entries.get(index))
            .cloned()
    }

    fn rebuild_order(&mut self) {
        let current_entry = self.current.and_then(|p| self.order.get(p).copied());
        self.order = (0..self.entries.len()).collect();

        if self.mode == PlaybackMode::Shuffle {
            self.order.shuffle(&mut rand::thread_rng());
            // Keep the current track current after a reshuffle
            if let Some(entry) = current_entry {
                if let Some(pos) = self.order.iter().position(|&i| i == entry) {
                    self.order.swap(0, pos);
                    self.current = Some(0);
                }
            }
        } else {
            self.current = current_entry;
        }
    }
}

/// List-backed queue with normal, repeat-one, repeat-all and shuffle modes
#[derive(Debug)]
pub struct ListQueue {
    inner: Mutex<ListQueueInner>,
}

impl ListQueue {
    /// Create a queue; no entry is current until the first advance
    pub fn new(entries: Vec<MediaFile>, mode: PlaybackMode) -> Self {
        let mut inner = ListQueueInner {
            entries,
            order: Vec::new(),
            current: None,
            mode,
        };
        inner.rebuild_order();
        Self {
            inner: Mutex::new(inner),
        }
    }

    pub fn set_mode(&self, mode: PlaybackMode) {
        let mut inner = self.lock();
        if inner.mode != mode {
            inner.mode = mode;
            inner.rebuild_order();
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.lock().mode
    }

    pub fn current(&self) -> Option<MediaFile> {
        let inner = self.lock();
        inner.current.and_then(|p| inner.entry_at(p))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ListQueueInner> {
        // A poisoned queue still holds consistent indices
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PlaybackQueue for ListQueue {
    fn advance_to_next(&self) -> Option<MediaFile> {
        let mut inner = self.lock();
        let next = inner.next_position()?;
        inner.current = Some(next);
        inner.entry_at(next)
    }

    fn go_to_previous(&self) -> Option<MediaFile> {
        let mut inner = self.lock();
        let previous = inner.previous_position()?;
        inner.current = Some(previous);
        inner.entry_at(previous)
    }

    fn peek_next(&self) -> Option<MediaFile> {
        let inner = self.lock();
        inner.next_position().and_then(|p| inner.entry_at(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn files(names: &[&str]) -> Vec<MediaFile> {
        names
            .iter()
            .map(|name| MediaFile {
                name: name.to_string(),
                path: PathBuf::from(format!("/music/{}", name)),
                size: 1,
                modification_date: None,
                is_directory: false,
                file_extension: "mp3".to_string(),
                identifier: None,
            })
            .collect()
    }

    fn name(file: Option<MediaFile>) -> Option<String> {
        file.map(|f| f.name)
    }

    #[test]
    fn test_normal_mode_stops_at_end() {
        let queue = ListQueue::new(files(&["a", "b"]), PlaybackMode::Normal);
        assert_eq!(name(queue.peek_next()), Some("a".into()));
        assert_eq!(name(queue.advance_to_next()), Some("a".into()));
        assert_eq!(name(queue.advance_to_next()), Some("b".into()));
        assert_eq!(queue.peek_next(), None);
        assert_eq!(queue.advance_to_next(), None);
        assert_eq!(name(queue.current()), Some("b".into()));
        assert_eq!(name(queue.go_to_previous()), Some("a".into()));
        assert_eq!(queue.go_to_previous(), None);
    }

    #[test]
    fn test_repeat_modes() {
        let queue = ListQueue::new(files(&["a", "b"]), PlaybackMode::RepeatAll);
        queue.advance_to_next();
        queue.advance_to_next();
        assert_eq!(name(queue.advance_to_next()), Some("a".into()));
        assert_eq!(name(queue.go_to_previous()), Some("b".into()));

        queue.set_mode(PlaybackMode::RepeatOne);
        assert_eq!(name(queue.advance_to_next()), Some("b".into()));
        assert_eq!(name(queue.peek_next()), Some("b".into()));
    }

    #[test]
    fn test_shuffle_visits_every_entry() {
        let queue = ListQueue::new(files(&["a", "b", "c", "d"]), PlaybackMode::Shuffle);
        let mut seen: Vec<String> = (0..4).filter_map(|_| name(queue.advance_to_next())).collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
        // Wraps around instead of ending
        assert!(queue.advance_to_next().is_some());
    }

    #[test]
    fn test_empty_queue() {
        let queue = ListQueue::new(Vec::new(), PlaybackMode::RepeatAll);
        assert!(queue.is_empty());
        assert_eq!(queue.advance_to_next(), None);
        assert_eq!(queue.go_to_previous(), None);
    }
}
