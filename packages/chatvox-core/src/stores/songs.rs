//! Song request playlist.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::events::{EventEmitter, SongRequestEvent};
use crate::utils::now_millis;

/// A requested song, as sent by the chat event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub artist: String,
    /// Display duration (e.g. `3:15`).
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub thumbnail: String,
}

/// Playlist view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRequestSnapshot {
    pub current: Option<Song>,
    pub unplayed: Vec<Song>,
    pub played: Vec<Song>,
}

#[derive(Default)]
struct Playlist {
    current: Option<Song>,
    unplayed: VecDeque<Song>,
    played: VecDeque<Song>,
}

impl Playlist {
    fn len(&self) -> usize {
        self.unplayed.len() + self.played.len() + usize::from(self.current.is_some())
    }
}

/// Bounded playlist of requested songs.
///
/// Beyond capacity the oldest played song goes first, then the oldest
/// unplayed request. The current song is never dropped.
pub struct SongRequestStore {
    playlist: Mutex<Playlist>,
    capacity: usize,
    emitter: Arc<dyn EventEmitter>,
}

impl SongRequestStore {
    pub fn new(capacity: usize, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            playlist: Mutex::new(Playlist::default()),
            capacity: capacity.max(1),
            emitter,
        }
    }

    /// Appends a request to the unplayed list.
    pub fn add(&self, song: Song) {
        let mut playlist = self.playlist.lock();
        playlist.unplayed.push_back(song);
        while playlist.len() > self.capacity {
            if playlist.played.pop_front().is_none() && playlist.unplayed.pop_front().is_none() {
                break;
            }
        }
    }

    /// Moves the current song to played and starts the next request.
    ///
    /// Returns the new current song, `None` when the playlist is exhausted.
    pub fn play_next(&self) -> Option<Song> {
        let mut playlist = self.playlist.lock();
        if let Some(done) = playlist.current.take() {
            playlist.played.push_back(done);
        }
        playlist.current = playlist.unplayed.pop_front();
        let current = playlist.current.clone();

        self.emitter.emit_song_request(SongRequestEvent::NowPlaying {
            song: current.clone(),
            timestamp: now_millis(),
        });
        current
    }

    pub fn snapshot(&self) -> SongRequestSnapshot {
        let playlist = self.playlist.lock();
        SongRequestSnapshot {
            current: playlist.current.clone(),
            unplayed: playlist.unplayed.iter().cloned().collect(),
            played: playlist.played.iter().cloned().collect(),
        }
    }
}
