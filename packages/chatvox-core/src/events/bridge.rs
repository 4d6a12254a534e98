//! Bridge implementation that maps domain events to broadcast transport.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{
    BroadcastEvent, ConnectionEvent, PlaybackEvent, PresenceEvent, QueueEvent, SongRequestEvent,
};

/// Bridges domain events to the WebSocket broadcast channel.
///
/// Events are forwarded to a `tokio::sync::broadcast` channel that WebSocket
/// handlers subscribe to, and to an optional external emitter that can be set
/// after construction (e.g. [`LoggingEventEmitter`](super::LoggingEventEmitter)).
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives a copy of every event.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_queue, QueueEvent, Queue);
    impl_emit!(emit_connection, ConnectionEvent, Connection);
    impl_emit!(emit_presence, PresenceEvent, Presence);
    impl_emit!(emit_song_request, SongRequestEvent, SongRequest);
    impl_emit!(emit_playback, PlaybackEvent, Playback);
}

#[cfg(test)]
mod tests {
    use super::super::emitter::test_support::RecordingEventEmitter;
    use super::*;

    #[tokio::test]
    async fn bridge_fans_out_to_subscribers_and_external() {
        let bridge = BroadcastEventBridge::new(8);
        let external = Arc::new(RecordingEventEmitter::default());
        bridge.set_external_emitter(external.clone());
        let mut rx = bridge.subscribe();

        bridge.emit_queue(QueueEvent::Cleared { timestamp: 1 });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Queue(QueueEvent::Cleared { timestamp }) => assert_eq!(timestamp, 1),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(external.queue_events().len(), 1);
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_presence(PresenceEvent::Left {
            username: "bob".to_string(),
            timestamp: 0,
        });
    }
}
