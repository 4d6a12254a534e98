//! Event system for real-time observers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for the queue, the ingestion channel, presence, song
//!   requests and playback

mod bridge;
pub(crate) mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::ingest::ConnectionState;
use crate::playback::PlaybackSettings;
use crate::queue::{EntryId, QueueEntry};
use crate::stores::Song;

/// Events broadcast to observers.
///
/// Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Narration queue changes.
    Queue(QueueEvent),

    /// Ingestion channel state.
    Connection(ConnectionEvent),

    /// Viewers joining or leaving.
    Presence(PresenceEvent),

    /// Song request playlist changes.
    SongRequest(SongRequestEvent),

    /// Narration engine activity.
    Playback(PlaybackEvent),
}

/// Events related to the narration queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// A chat message was queued.
    Enqueued {
        entry: QueueEntry,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An entry was dropped to keep the queue within capacity.
    Evicted {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// The current entry changed (`None` when the queue went idle).
    CurrentChanged {
        #[serde(rename = "entryId")]
        entry_id: Option<EntryId>,
        timestamp: u64,
    },
    /// An entry was deleted by the user.
    Removed {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// An entry was put back into pending.
    Replayed {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// A forward-to request was refused because something is playing.
    ForwardRejected {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// Everything was removed.
    Cleared { timestamp: u64 },
    /// Pause flag toggled.
    PauseChanged { paused: bool, timestamp: u64 },
    /// Voice parameters changed.
    SettingsChanged {
        settings: PlaybackSettings,
        timestamp: u64,
    },
}

/// Events related to the chat event channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// Connection state transition.
    StateChanged {
        state: ConnectionState,
        timestamp: u64,
    },
    /// A reconnect attempt was scheduled after a failure or close.
    ReconnectScheduled {
        attempt: u32,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        timestamp: u64,
    },
    /// A wire record could not be decoded. The channel stays open.
    DecodeFailed { error: String, timestamp: u64 },
}

/// Events about viewers entering or leaving.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PresenceEvent {
    Joined { username: String, timestamp: u64 },
    Left { username: String, timestamp: u64 },
}

/// Events from the song request playlist.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SongRequestEvent {
    /// A viewer requested a song.
    Requested {
        username: String,
        song: Song,
        timestamp: u64,
    },
    /// The playlist advanced.
    NowPlaying {
        song: Option<Song>,
        timestamp: u64,
    },
}

/// Events from the playback driver.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// Narration of an entry began.
    Started {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        #[serde(rename = "voiceId", skip_serializing_if = "Option::is_none")]
        voice_id: Option<String>,
        timestamp: u64,
    },
    /// The engine reported the utterance finished.
    Finished {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// The utterance was stopped before the end.
    Cancelled {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        timestamp: u64,
    },
    /// The engine could not narrate the entry; it was skipped.
    Failed {
        #[serde(rename = "entryId")]
        entry_id: EntryId,
        error: String,
        timestamp: u64,
    },
}

impl From<QueueEvent> for BroadcastEvent {
    fn from(event: QueueEvent) -> Self {
        BroadcastEvent::Queue(event)
    }
}

impl From<ConnectionEvent> for BroadcastEvent {
    fn from(event: ConnectionEvent) -> Self {
        BroadcastEvent::Connection(event)
    }
}

impl From<PresenceEvent> for BroadcastEvent {
    fn from(event: PresenceEvent) -> Self {
        BroadcastEvent::Presence(event)
    }
}

impl From<SongRequestEvent> for BroadcastEvent {
    fn from(event: SongRequestEvent) -> Self {
        BroadcastEvent::SongRequest(event)
    }
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_event_is_tagged_by_category_and_type() {
        let event = BroadcastEvent::from(QueueEvent::Removed {
            entry_id: EntryId(3),
            timestamp: 42,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "queue");
        assert_eq!(json["type"], "removed");
        assert_eq!(json["entryId"], 3);
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn connection_state_serializes_screaming() {
        let event = BroadcastEvent::from(ConnectionEvent::StateChanged {
            state: ConnectionState::Connected,
            timestamp: 0,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "connection");
        assert_eq!(json["type"], "stateChanged");
        assert_eq!(json["state"], "CONNECTED");
    }
}
