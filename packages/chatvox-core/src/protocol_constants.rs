//! Fixed protocol constants and defaults.
//!
//! The reconnect schedule and the playback parameter bounds are part of the
//! observable contract with chat clients and UIs; changing them changes
//! behavior users can see.

use std::ops::RangeInclusive;

// ─────────────────────────────────────────────────────────────────────────────
// Service
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "chatvox";

/// Default chat event source.
pub const DEFAULT_CHANNEL_URL: &str = "ws://localhost:42069/ws";

/// Default port for the local control API.
pub const DEFAULT_API_PORT: u16 = 42070;

// ─────────────────────────────────────────────────────────────────────────────
// Queue
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of entries tracked by the narration queue
/// (pending + played + current).
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Maximum number of notifications kept by the notification store.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 100;

/// Maximum number of songs kept by the song request playlist.
pub const DEFAULT_SONG_REQUEST_CAPACITY: usize = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Reconnection
// ─────────────────────────────────────────────────────────────────────────────

/// Delay before the first reconnect attempt (milliseconds).
///
/// Doubles after each failed attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1000;

/// Upper bound on the reconnect delay (milliseconds).
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

/// Allowed speech rate multipliers.
pub const RATE_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// Allowed pitch values.
pub const PITCH_RANGE: RangeInclusive<f32> = 0.2..=1.0;

/// Allowed volume values.
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.2..=1.0;

/// Default voice locale.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Speaking rate of the command engine at rate 1.0 (words per minute).
///
/// Matches the espeak-ng default.
pub const BASE_WORDS_PER_MINUTE: f32 = 175.0;

/// Speaking rate assumed by the silent engine at rate 1.0 (words per second).
pub const SILENT_WORDS_PER_SECOND: f32 = 2.5;

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Quiet period before session snapshots are written (milliseconds).
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 250;
