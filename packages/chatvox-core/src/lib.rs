//! chatvox core - shared library for the chatvox narration service.
//!
//! chatvox listens to a live chat event stream over WebSocket and reads chat
//! messages aloud one at a time, through a bounded, strictly ordered queue
//! that users can pause, skip, replay and edit while it runs.
//!
//! # Architecture
//!
//! - [`queue`]: Bounded narration queue (pure state machine + shared controller)
//! - [`playback`]: Narration engines and the driver feeding them from the queue
//! - [`ingest`]: Reconnecting WebSocket channel, wire decoding and event routing
//! - [`control`]: User commands mapped onto queue operations
//! - [`stores`]: Notifications and song requests from non-chat events
//! - [`events`]: Event system for real-time observers
//! - [`persistence`]: Session snapshots on disk
//! - [`api`]: HTTP/WebSocket control API
//! - [`bootstrap`]: Composition root
//!
//! # Abstraction Traits
//!
//! - [`NarrationEngine`](playback::NarrationEngine): Speech output
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`EventSink`](ingest::EventSink): Consuming decoded channel events

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod control;
pub mod error;
pub mod events;
pub mod ingest;
pub mod persistence;
pub mod playback;
pub mod protocol_constants;
pub mod queue;
pub mod state;
pub mod stores;
pub mod utils;

// Re-export commonly used types at the crate root
pub use control::{ControlCommand, ControlOutcome, ControlSurface};
pub use error::{ChatvoxError, ChatvoxResult, ErrorCode};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ConnectionEvent, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, PlaybackEvent, PresenceEvent, QueueEvent, SongRequestEvent,
};
pub use ingest::{Backoff, ChannelHandle, ConnectionState, EventRouter, IngestChannel};
pub use persistence::{Autosave, ConnectionSnapshot, PersistenceError, SessionStore};
pub use playback::{
    CommandNarrationEngine, NarrationEngine, PlaybackDriver, PlaybackSettings,
    SilentNarrationEngine,
};
pub use queue::{EntryId, Message, QueueController, QueueSnapshot};
pub use state::{Config, EngineKind};
pub use utils::now_millis;

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
