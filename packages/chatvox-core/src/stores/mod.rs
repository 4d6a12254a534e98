//! Side-channel stores fed by non-chat events.

mod notifications;
mod songs;

pub use notifications::{Notification, NotificationStore};
pub use songs::{Song, SongRequestSnapshot, SongRequestStore};
