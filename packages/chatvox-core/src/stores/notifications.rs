//! Presence and song request notifications shown to the streamer.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;

/// A single notification line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub content: String,
    pub read: bool,
}

/// Bounded list of notifications, oldest first.
///
/// Notifications are addressed by their text: marking or removing a content
/// string affects every notification with that text.
pub struct NotificationStore {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Appends an unread notification, dropping the oldest beyond capacity.
    pub fn add(&self, content: impl Into<String>) {
        let mut items = self.items.lock();
        items.push_back(Notification {
            content: content.into(),
            read: false,
        });
        while items.len() > self.capacity {
            items.pop_front();
        }
    }

    /// Marks notifications as read; `None` marks all. Returns how many changed.
    pub fn mark_read(&self, content: Option<&str>) -> usize {
        let mut items = self.items.lock();
        let mut changed = 0;
        for item in items
            .iter_mut()
            .filter(|n| !n.read && content.map_or(true, |c| n.content == c))
        {
            item.read = true;
            changed += 1;
        }
        changed
    }

    /// Removes every notification with the given text. Returns how many.
    pub fn remove(&self, content: &str) -> usize {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|n| n.content != content);
        before - items.len()
    }

    pub fn list(&self) -> Vec<Notification> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.items.lock().iter().filter(|n| !n.read).count()
    }
}
