//! Wire format of the chat event source.
//!
//! A text frame carries one or more newline-delimited JSON records:
//!
//! ```json
//! {"type":"message","timestamp":"2024-05-01T12:00:00Z","data":{"username":"alice","color":"#f0a","content":"hi"}}
//! ```
//!
//! Each record decodes independently; one bad record never drops its
//! neighbours.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::queue::{Message, Timestamp};
use crate::stores::Song;

/// A record that could not be turned into a [`ChannelEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The record is not a JSON envelope.
    #[error("Malformed record: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The envelope is valid but its `data` does not match its type.
    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope's type is not one we handle.
    #[error("Unknown event type: {0}")]
    UnknownType(String),
}

/// A decoded chat event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Chat(Message),
    UserJoin { username: String },
    UserPart { username: String },
    SongRequest { username: String, song: Song },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    timestamp: Option<Timestamp>,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ChatData {
    username: String,
    #[serde(default)]
    color: String,
    content: String,
}

#[derive(Deserialize)]
struct PresenceData {
    username: String,
}

#[derive(Deserialize)]
struct SongRequestData {
    username: String,
    song: Song,
}

fn payload<T: for<'de> Deserialize<'de>>(kind: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidPayload {
        kind: kind.to_string(),
        source,
    })
}

/// Decodes a single record.
pub fn decode_record(record: &str) -> Result<ChannelEvent, DecodeError> {
    let envelope: Envelope = serde_json::from_str(record).map_err(DecodeError::Malformed)?;
    let kind = envelope.kind.as_str();

    match kind {
        "message" => {
            let data: ChatData = payload(kind, envelope.data)?;
            Ok(ChannelEvent::Chat(Message {
                timestamp: envelope.timestamp.unwrap_or_else(Timestamp::now),
                username: data.username,
                color: data.color,
                content: data.content,
            }))
        }
        "user_join" => {
            let data: PresenceData = payload(kind, envelope.data)?;
            Ok(ChannelEvent::UserJoin {
                username: data.username,
            })
        }
        "user_part" => {
            let data: PresenceData = payload(kind, envelope.data)?;
            Ok(ChannelEvent::UserPart {
                username: data.username,
            })
        }
        "song_request" => {
            let data: SongRequestData = payload(kind, envelope.data)?;
            Ok(ChannelEvent::SongRequest {
                username: data.username,
                song: data.song,
            })
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

/// Splits a text frame on newlines and decodes every non-blank record.
pub fn decode_frame(frame: &str) -> Vec<Result<ChannelEvent, DecodeError>> {
    frame
        .split('\n')
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(decode_record)
        .collect()
}
