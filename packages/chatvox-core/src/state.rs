//! Core configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::Backoff;
use crate::playback::{PlaybackSettings, DEFAULT_SPEECH_PROGRAM};
use crate::protocol_constants::{
    AUTOSAVE_DEBOUNCE_MS, DEFAULT_API_PORT, DEFAULT_CHANNEL_URL, DEFAULT_NOTIFICATION_CAPACITY,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_SONG_REQUEST_CAPACITY, EVENT_CHANNEL_CAPACITY,
    RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS,
};

/// Which narration engine the service drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Timer-based engine producing no audio.
    Silent,
    /// External speech synthesizer process.
    #[default]
    Command,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(Self::Silent),
            "command" => Ok(Self::Command),
            other => Err(format!("unknown engine '{}' (expected silent or command)", other)),
        }
    }
}

/// Configuration for the chatvox service.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Ingestion
    /// WebSocket URL of the chat event source.
    pub channel_url: String,

    /// Delay before the first reconnect attempt (milliseconds).
    pub reconnect_base_delay_ms: u64,

    /// Upper bound on the reconnect delay (milliseconds).
    pub reconnect_max_delay_ms: u64,

    // Queue
    /// Maximum entries tracked by the narration queue.
    pub queue_capacity: usize,

    /// Maximum notifications kept.
    pub notification_capacity: usize,

    /// Maximum song requests kept.
    pub song_request_capacity: usize,

    // Playback
    /// Narration engine.
    pub engine: EngineKind,

    /// Program used by the command engine.
    pub speech_program: String,

    /// Initial playback settings, overridden by a saved session.
    pub playback: PlaybackSettings,

    // Server
    /// Whether to serve the control API.
    pub api_enabled: bool,

    /// Port for the control API (0 = auto-allocate).
    pub api_port: u16,

    /// Browser origins allowed by CORS (prefix match).
    pub trusted_origins: Vec<String>,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    // Persistence
    /// Directory for session snapshots. Persistence is off when unset.
    pub data_dir: Option<PathBuf>,

    /// Quiet period before snapshots are written (milliseconds).
    pub autosave_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
            reconnect_base_delay_ms: RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: RECONNECT_MAX_DELAY_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            song_request_capacity: DEFAULT_SONG_REQUEST_CAPACITY,
            engine: EngineKind::default(),
            speech_program: DEFAULT_SPEECH_PROGRAM.to_string(),
            playback: PlaybackSettings::default(),
            api_enabled: true,
            api_port: DEFAULT_API_PORT,
            trusted_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            data_dir: None,
            autosave_debounce_ms: AUTOSAVE_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.channel_url.starts_with("ws://") || self.channel_url.starts_with("wss://")) {
            return Err(format!(
                "channel_url must start with ws:// or wss:// (got '{}')",
                self.channel_url
            ));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err("reconnect_base_delay_ms must be >= 1".to_string());
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(
                "reconnect_base_delay_ms must not exceed reconnect_max_delay_ms".to_string(),
            );
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be >= 1".to_string());
        }
        if self.notification_capacity == 0 {
            return Err("notification_capacity must be >= 1".to_string());
        }
        if self.song_request_capacity == 0 {
            return Err("song_request_capacity must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            );
        }
        if self.engine == EngineKind::Command && self.speech_program.trim().is_empty() {
            return Err("speech_program must be set for the command engine".to_string());
        }
        Ok(())
    }

    /// Reconnect schedule for the ingestion channel.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
        )
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
