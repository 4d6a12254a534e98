//! Routes decoded channel events to the queue and the side-channel stores.

use std::sync::Arc;

use super::channel::EventSink;
use super::protocol::ChannelEvent;
use crate::events::{EventEmitter, PresenceEvent, SongRequestEvent};
use crate::queue::QueueController;
use crate::stores::{NotificationStore, SongRequestStore};
use crate::utils::now_millis;

/// Fan-out from the ingestion channel.
///
/// Chat messages go to the narration queue; presence and song requests
/// become notifications (and playlist entries).
pub struct EventRouter {
    controller: Arc<QueueController>,
    notifications: Arc<NotificationStore>,
    songs: Arc<SongRequestStore>,
    emitter: Arc<dyn EventEmitter>,
}

impl EventRouter {
    pub fn new(
        controller: Arc<QueueController>,
        notifications: Arc<NotificationStore>,
        songs: Arc<SongRequestStore>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            controller,
            notifications,
            songs,
            emitter,
        }
    }
}

impl EventSink for EventRouter {
    fn dispatch(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Chat(message) => {
                self.controller.enqueue(message);
            }
            ChannelEvent::UserJoin { username } => {
                self.notifications.add(format!("{} joined the stream!", username));
                self.emitter.emit_presence(PresenceEvent::Joined {
                    username,
                    timestamp: now_millis(),
                });
            }
            ChannelEvent::UserPart { username } => {
                self.notifications.add(format!("{} left the stream!", username));
                self.emitter.emit_presence(PresenceEvent::Left {
                    username,
                    timestamp: now_millis(),
                });
            }
            ChannelEvent::SongRequest { username, song } => {
                log::info!(
                    "[Ingest] {} requested {} - {}",
                    username,
                    song.title,
                    song.artist
                );
                self.notifications.add(format!(
                    "{} requested a song: {} - {}",
                    username, song.title, song.artist
                ));
                self.songs.add(song.clone());
                self.emitter.emit_song_request(SongRequestEvent::Requested {
                    username,
                    song,
                    timestamp: now_millis(),
                });
            }
        }
    }
}
