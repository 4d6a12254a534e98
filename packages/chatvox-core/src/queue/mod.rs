//! Narration queue: pure state machine plus its shared controller.

mod controller;
mod message;
mod state;

pub use self::controller::{PlaybackCue, QueueController};
pub use self::message::{EntryId, Message, QueueEntry, Timestamp};
pub use self::state::{Enqueued, ForwardOutcome, MessageQueue, QueueSnapshot};
