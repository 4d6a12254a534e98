//! Chat message values and queue entry identity.

use std::cmp::Ordering;
use std::fmt;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::utils::now_millis;

/// Arrival timestamp of a chat message.
///
/// The event source sends RFC 3339 strings; epoch milliseconds are accepted
/// as well. Ordering compares the instant when both sides can be parsed.
/// Unparsable strings sort before every parsable timestamp and compare
/// lexically among themselves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// Timestamp as sent on the wire.
    Text(String),
}

impl Timestamp {
    /// Timestamp for the current wall-clock time.
    pub fn now() -> Self {
        Self::Millis(now_millis() as i64)
    }

    /// Milliseconds since the Unix epoch, if the timestamp can be interpreted.
    pub fn millis(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => Some(*ms),
            Self::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }

    fn cmp_repr(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Millis(a), Self::Millis(b)) => a.cmp(b),
            (Self::Millis(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Millis(_)) => Ordering::Greater,
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.millis(), other.millis()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.cmp_repr(other)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.cmp_repr(other),
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for Timestamp {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self::Millis(value)
    }
}

impl From<i32> for Timestamp {
    fn from(value: i32) -> Self {
        Self::Millis(i64::from(value))
    }
}

/// A chat message as received from the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: Timestamp,
    pub username: String,
    /// Display color hint (e.g. `#ff00aa`).
    #[serde(default)]
    pub color: String,
    pub content: String,
}

impl Message {
    pub fn new(
        timestamp: impl Into<Timestamp>,
        username: impl Into<String>,
        color: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            username: username.into(),
            color: color.into(),
            content: content.into(),
        }
    }

    /// Text handed to the narration engine.
    pub fn narration_text(&self, include_username: bool) -> String {
        if include_username {
            format!("{}: {}", self.username, self.content)
        } else {
            self.content.clone()
        }
    }
}

/// Session-local identity of a queued message.
///
/// Assigned by the queue on insertion and never reused within a session, so
/// two identical messages (or a replayed duplicate) remain distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    #[serde(flatten)]
    pub message: Message,
}

impl QueueEntry {
    pub fn timestamp(&self) -> &Timestamp {
        &self.message.timestamp
    }
}
