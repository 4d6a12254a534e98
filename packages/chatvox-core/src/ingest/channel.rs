//! Persistent WebSocket connection to the chat event source.
//!
//! [`IngestChannel::run`] owns the connection for its whole life: it connects,
//! pumps frames until the peer closes or an error occurs, then waits out the
//! backoff delay and tries again. Failures and clean closes converge on the
//! same reconnect schedule. Cancellation stops the loop without leaving a
//! reconnect timer behind.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::backoff::Backoff;
use super::protocol::{decode_frame, ChannelEvent};
use crate::events::{ConnectionEvent, EventEmitter};
use crate::utils::now_millis;

/// Buffered outbound messages while connected.
const OUTBOUND_CAPACITY: usize = 64;

/// Upper bound on sending the close frame during shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Disconnecting,
    Error,
}

/// Errors from the ingestion channel.
///
/// Socket errors end a single connection and are never fatal to the channel.
/// Send errors are reported to the caller; the text is dropped.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The WebSocket handshake failed.
    #[error("Connection failed: {0}")]
    Connect(#[source] tungstenite::Error),

    /// Reading from the socket failed.
    #[error("Read failed: {0}")]
    Read(#[source] tungstenite::Error),

    /// Writing to the socket failed.
    #[error("Write failed: {0}")]
    Write(#[source] tungstenite::Error),

    /// Outbound text was offered while the channel is not connected.
    #[error("Channel is not connected ({0:?})")]
    NotConnected(ConnectionState),

    /// The outbound buffer is full.
    #[error("Outbound buffer is full")]
    OutboundFull,
}

/// Receives decoded events in arrival order.
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: ChannelEvent);
}

/// Cloneable handle for observing the channel and sending outbound text.
#[derive(Clone)]
pub struct ChannelHandle {
    state_rx: watch::Receiver<ConnectionState>,
    outbound_tx: mpsc::Sender<String>,
}

impl ChannelHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Sends a text frame to the event source.
    ///
    /// Fails and drops the text when not connected. Nothing is queued across
    /// reconnects.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        let state = self.state();
        if state != ConnectionState::Connected {
            log::debug!("[Ingest] Dropping outbound message: not connected");
            return Err(ChannelError::NotConnected(state));
        }
        self.outbound_tx.try_send(text.into()).map_err(|e| {
            log::warn!("[Ingest] Dropping outbound message: {}", e);
            ChannelError::OutboundFull
        })
    }
}

enum PumpExit {
    Cancelled,
    Closed,
    Failed(ChannelError),
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Sends a close frame, giving up after [`CLOSE_TIMEOUT`].
async fn send_close(sink: &mut WsSink) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.send(WsMessage::Close(None))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::debug!("[Ingest] Close frame not sent: {}", e),
        Err(_) => log::debug!("[Ingest] Close frame timed out"),
    }
}

/// The reconnecting ingestion loop.
pub struct IngestChannel {
    url: String,
    backoff: Backoff,
    sink: Arc<dyn EventSink>,
    emitter: Arc<dyn EventEmitter>,
    state_tx: watch::Sender<ConnectionState>,
    outbound_rx: mpsc::Receiver<String>,
}

impl IngestChannel {
    pub fn new(
        url: impl Into<String>,
        backoff: Backoff,
        sink: Arc<dyn EventSink>,
        emitter: Arc<dyn EventEmitter>,
    ) -> (Self, ChannelHandle) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let channel = Self {
            url: url.into(),
            backoff,
            sink,
            emitter,
            state_tx,
            outbound_rx,
        };
        let handle = ChannelHandle {
            state_rx,
            outbound_tx,
        };
        (channel, handle)
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            log::debug!("[Ingest] State -> {:?}", state);
            self.emitter.emit_connection(ConnectionEvent::StateChanged {
                state,
                timestamp: now_millis(),
            });
        }
    }

    /// Runs until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        log::info!("[Ingest] Channel starting for {}", self.url);

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = connect_async(self.url.as_str()) => result.map_err(ChannelError::Connect),
            };

            match connected {
                Ok((ws, _response)) => {
                    log::info!("[Ingest] Connected to {}", self.url);
                    self.backoff.reset();
                    while self.outbound_rx.try_recv().is_ok() {}
                    self.set_state(ConnectionState::Connected);

                    match self.pump(ws, &cancel).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Closed => log::info!("[Ingest] Connection closed by peer"),
                        PumpExit::Failed(e) => {
                            log::warn!("[Ingest] {}", e);
                            self.set_state(ConnectionState::Error);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("[Ingest] {} ({})", e, self.url);
                    self.set_state(ConnectionState::Error);
                }
            }

            self.set_state(ConnectionState::Disconnected);

            let attempt = self.backoff.attempt() + 1;
            let delay = self.backoff.next_delay();
            log::info!(
                "[Ingest] Reconnecting in {}ms (attempt {})",
                delay.as_millis(),
                attempt
            );
            self.emitter.emit_connection(ConnectionEvent::ReconnectScheduled {
                attempt,
                delay_ms: delay.as_millis() as u64,
                timestamp: now_millis(),
            });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnecting);
        self.set_state(ConnectionState::Disconnected);
        log::info!("[Ingest] Channel stopped");
    }

    async fn pump(&mut self, ws: WsStream, cancel: &CancellationToken) -> PumpExit {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.set_state(ConnectionState::Disconnecting);
                    send_close(&mut sink).await;
                    return PumpExit::Cancelled;
                }

                outbound = self.outbound_rx.recv() => {
                    let Some(text) = outbound else { continue };
                    // a peer that stops reading must not hold up shutdown
                    let written = tokio::select! {
                        _ = cancel.cancelled() => None,
                        result = sink.send(WsMessage::Text(text.into())) => Some(result),
                    };
                    match written {
                        None => {
                            self.set_state(ConnectionState::Disconnecting);
                            send_close(&mut sink).await;
                            return PumpExit::Cancelled;
                        }
                        Some(Err(e)) => return PumpExit::Failed(ChannelError::Write(e)),
                        Some(Ok(())) => {}
                    }
                }

                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_frame(text),
                        Err(_) => log::debug!("[Ingest] Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        if let Some(frame) = frame {
                            log::info!("[Ingest] Peer closed: {} {}", frame.code, frame.reason);
                        }
                        return PumpExit::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpExit::Failed(ChannelError::Read(e)),
                    None => return PumpExit::Closed,
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        for result in decode_frame(text) {
            match result {
                Ok(event) => self.sink.dispatch(event),
                Err(e) => {
                    log::warn!("[Ingest] Dropping record: {}", e);
                    self.emitter.emit_connection(ConnectionEvent::DecodeFailed {
                        error: e.to_string(),
                        timestamp: now_millis(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    use super::*;
    use crate::events::emitter::test_support::RecordingEventEmitter;
    use crate::events::{BroadcastEvent, EventEmitter};
    use crate::ingest::EventRouter;
    use crate::playback::PlaybackSettings;
    use crate::queue::QueueController;
    use crate::stores::{NotificationStore, SongRequestStore};

    #[derive(Default)]
    struct CollectingSink {
        events: Mutex<Vec<ChannelEvent>>,
    }

    impl EventSink for CollectingSink {
        fn dispatch(&self, event: ChannelEvent) {
            self.events.lock().push(event);
        }
    }

    struct Fixture {
        sink: Arc<CollectingSink>,
        emitter: Arc<RecordingEventEmitter>,
        handle: ChannelHandle,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(url: String) -> Fixture {
        let sink = Arc::new(CollectingSink::default());
        let emitter = Arc::new(RecordingEventEmitter::default());
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        let (channel, handle) = IngestChannel::new(url, backoff, sink.clone(), emitter.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(channel.run(cancel.clone()));
        Fixture {
            sink,
            emitter,
            handle,
            cancel,
            task,
        }
    }

    async fn wait_for_state(handle: &ChannelHandle, state: ConnectionState) {
        let mut rx = handle.subscribe_state();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached")
            .expect("channel dropped");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn reconnects(emitter: &RecordingEventEmitter) -> Vec<(u32, u64)> {
        emitter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BroadcastEvent::Connection(ConnectionEvent::ReconnectScheduled {
                    attempt,
                    delay_ms,
                    ..
                }) => Some((attempt, delay_ms)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn mixed_frame_dispatches_valid_records_and_stays_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let frame = concat!(
                r#"{"type":"message","timestamp":"t1","data":{"username":"a","color":"c","content":"x"}}"#,
                "\nnot-json\n",
                r#"{"type":"message","timestamp":"t2","data":{"username":"b","color":"c","content":"y"}}"#,
            );
            ws.send(WsMessage::Text(frame.to_string().into()))
                .await
                .unwrap();
            // keep the connection open until the client leaves
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let fixture = start(url);
        wait_until(|| fixture.sink.events.lock().len() == 2).await;
        assert_eq!(fixture.handle.state(), ConnectionState::Connected);

        let decode_failures = fixture
            .emitter
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    BroadcastEvent::Connection(ConnectionEvent::DecodeFailed { .. })
                )
            })
            .count();
        assert_eq!(decode_failures, 1);

        fixture.cancel.cancel();
        fixture.task.await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn failed_connects_follow_the_backoff_schedule() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let fixture = start(url);
        wait_until(|| reconnects(&fixture.emitter).len() >= 4).await;
        let schedule: Vec<(u32, u64)> = reconnects(&fixture.emitter).into_iter().take(4).collect();
        assert_eq!(schedule, vec![(1, 10), (2, 20), (3, 40), (4, 40)]);
        assert!(matches!(
            fixture.handle.send("hello"),
            Err(ChannelError::NotConnected(_))
        ));

        fixture.cancel.cancel();
        fixture.task.await.unwrap();
        assert_eq!(fixture.handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnects_after_peer_close_with_reset_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                ws.close(None).await.unwrap();
            }
            listener
        });

        let fixture = start(url);
        let _listener = server.await.unwrap();
        wait_until(|| reconnects(&fixture.emitter).len() >= 2).await;

        // every close followed a successful open, so the delay never grows
        let schedule = reconnects(&fixture.emitter);
        assert_eq!(schedule[0], (1, 10));
        assert_eq!(schedule[1], (1, 10));

        fixture.cancel.cancel();
        fixture.task.await.unwrap();
    }

    #[tokio::test]
    async fn outbound_text_reaches_the_peer_and_shutdown_sends_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, mut received_rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let _ = received_tx.send(msg);
            }
        });

        let fixture = start(url);
        wait_for_state(&fixture.handle, ConnectionState::Connected).await;
        fixture.handle.send("!song next").unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), received_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.to_text().unwrap(), "!song next");

        fixture.cancel.cancel();
        fixture.task.await.unwrap();
        let close = tokio::time::timeout(Duration::from_secs(5), received_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(close.is_close());
        assert_eq!(fixture.handle.state(), ConnectionState::Disconnected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn frame_with_unknown_record_queues_its_neighbours_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let frame = concat!(
                r##"{"type":"message","data":{"username":"x","content":"hi","color":"#fff"},"timestamp":"t1"}"##,
                "\n",
                r#"{"type":"bogus"}"#,
                "\n",
                r##"{"type":"message","data":{"username":"y","content":"yo","color":"#000"},"timestamp":"t2"}"##,
            );
            ws.send(WsMessage::Text(frame.to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let emitter = Arc::new(RecordingEventEmitter::default());
        let shared: Arc<dyn EventEmitter> = emitter.clone();
        let controller = Arc::new(QueueController::new(
            50,
            PlaybackSettings::default(),
            shared.clone(),
        ));
        let router = Arc::new(EventRouter::new(
            controller.clone(),
            Arc::new(NotificationStore::new(10)),
            Arc::new(SongRequestStore::new(10, shared.clone())),
            shared.clone(),
        ));
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        let (channel, handle) = IngestChannel::new(url, backoff, router, shared);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(channel.run(cancel.clone()));

        wait_until(|| controller.snapshot().pending.len() == 1).await;
        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.current.map(|e| e.message.username),
            Some("x".to_string())
        );
        let pending: Vec<String> = snapshot
            .pending
            .into_iter()
            .map(|e| e.message.username)
            .collect();
        assert_eq!(pending, vec!["y"]);
        assert_eq!(handle.state(), ConnectionState::Connected);

        let failures: Vec<String> = emitter
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BroadcastEvent::Connection(ConnectionEvent::DecodeFailed { error, .. }) => {
                    Some(error)
                }
                _ => None,
            })
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("bogus"));

        cancel.cancel();
        task.await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_not_held_up_by_a_stalled_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            // handshake, then never read again
            let _ws = accept_async(stream).await.unwrap();
            let _ = release_rx.await;
        });

        let fixture = start(url);
        wait_for_state(&fixture.handle, ConnectionState::Connected).await;

        // enough data to fill the socket buffers on both ends
        let chunk = "x".repeat(1 << 20);
        for _ in 0..OUTBOUND_CAPACITY {
            if fixture.handle.send(chunk.clone()).is_err() {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        fixture.cancel.cancel();
        tokio::time::timeout(CLOSE_TIMEOUT + Duration::from_secs(3), fixture.task)
            .await
            .expect("channel did not stop")
            .unwrap();
        assert_eq!(fixture.handle.state(), ConnectionState::Disconnected);

        let _ = release_tx.send(());
        server.await.unwrap();
    }
}
