//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{ConnectionEvent, PlaybackEvent, PresenceEvent, QueueEvent, SongRequestEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_queue(QueueEvent::Cleared { timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a narration queue event.
    fn emit_queue(&self, event: QueueEvent);

    /// Emits an ingestion channel event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a viewer presence event.
    fn emit_presence(&self, event: PresenceEvent);

    /// Emits a song request event.
    fn emit_song_request(&self, event: SongRequestEvent);

    /// Emits a playback driver event.
    fn emit_playback(&self, event: PlaybackEvent);
}

/// No-op emitter for tests and embedders without observers.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_queue(&self, _event: QueueEvent) {}

    fn emit_connection(&self, _event: ConnectionEvent) {}

    fn emit_presence(&self, _event: PresenceEvent) {}

    fn emit_song_request(&self, _event: SongRequestEvent) {}

    fn emit_playback(&self, _event: PlaybackEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_queue(&self, event: QueueEvent) {
        tracing::debug!(?event, "queue_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_presence(&self, event: PresenceEvent) {
        tracing::debug!(?event, "presence_event");
    }

    fn emit_song_request(&self, event: SongRequestEvent) {
        tracing::debug!(?event, "song_request_event");
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingEventEmitter;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recording_emitter_tracks_events() {
        let emitter = Arc::new(RecordingEventEmitter::default());

        emitter.emit_queue(QueueEvent::Cleared { timestamp: 0 });
        emitter.emit_queue(QueueEvent::PauseChanged {
            paused: true,
            timestamp: 0,
        });
        emitter.emit_presence(PresenceEvent::Joined {
            username: "alice".to_string(),
            timestamp: 0,
        });

        assert_eq!(emitter.queue_events().len(), 2);
        assert_eq!(emitter.events().len(), 3);
    }
}
