//! Shared, observable access to the narration queue.
//!
//! Every operation is a single lock-mutate-publish step: the queue mutex is
//! held only for the synchronous mutation and the publication of its
//! consequences, never across an `.await`. Network arrivals, user commands
//! and playback completions therefore serialize cleanly.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio::sync::watch;

use super::message::{EntryId, Message, QueueEntry};
use super::state::{ForwardOutcome, MessageQueue, QueueSnapshot};
use crate::events::{EventEmitter, QueueEvent};
use crate::playback::{PlaybackSettings, PlaybackSettingsPatch};
use crate::utils::now_millis;

/// What the playback driver needs to know.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCue {
    pub current: Option<QueueEntry>,
    pub paused: bool,
    pub settings: PlaybackSettings,
}

impl PlaybackCue {
    pub fn current_id(&self) -> Option<EntryId> {
        self.current.as_ref().map(|e| e.id)
    }
}

struct Inner {
    queue: MessageQueue,
    settings: PlaybackSettings,
}

impl Inner {
    fn current_id(&self) -> Option<EntryId> {
        self.queue.current().map(|e| e.id)
    }

    fn cue(&self) -> PlaybackCue {
        PlaybackCue {
            current: self.queue.current().cloned(),
            paused: self.queue.is_paused(),
            settings: self.settings.clone(),
        }
    }
}

/// Thread-safe owner of the [`MessageQueue`] and the playback settings.
pub struct QueueController {
    inner: Mutex<Inner>,
    cue_tx: watch::Sender<PlaybackCue>,
    revision_tx: watch::Sender<u64>,
    emitter: Arc<dyn EventEmitter>,
}

impl QueueController {
    pub fn new(
        capacity: usize,
        settings: PlaybackSettings,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        let inner = Inner {
            queue: MessageQueue::new(capacity),
            settings: settings.normalize(),
        };
        let (cue_tx, _) = watch::channel(inner.cue());
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Mutex::new(inner),
            cue_tx,
            revision_tx,
            emitter,
        }
    }

    /// Emits events, publishes the cue and bumps the revision.
    ///
    /// Runs while the lock is still held so observers see changes in the
    /// order they were made.
    fn commit(
        &self,
        inner: &MutexGuard<'_, Inner>,
        before: Option<EntryId>,
        changed: bool,
        mut events: Vec<QueueEvent>,
    ) {
        let after = inner.current_id();
        if after != before {
            events.push(QueueEvent::CurrentChanged {
                entry_id: after,
                timestamp: now_millis(),
            });
        }
        for event in events {
            self.emitter.emit_queue(event);
        }

        let cue = inner.cue();
        self.cue_tx.send_if_modified(|current| {
            if *current == cue {
                false
            } else {
                *current = cue;
                true
            }
        });

        if changed {
            self.revision_tx.send_modify(|rev| *rev += 1);
        }
    }

    fn evicted_event(evicted: Option<QueueEntry>) -> Option<QueueEvent> {
        evicted.map(|entry| {
            log::debug!(
                "[Queue] Evicted {} ({}) to stay within capacity",
                entry.id,
                entry.message.username
            );
            QueueEvent::Evicted {
                entry_id: entry.id,
                timestamp: now_millis(),
            }
        })
    }

    /// Queues a chat message and returns its id.
    pub fn enqueue(&self, message: Message) -> EntryId {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let queued = message.clone();
        let result = inner.queue.enqueue(message);
        log::debug!("[Queue] Enqueued {} from {}", result.id, queued.username);

        let mut events = vec![QueueEvent::Enqueued {
            entry: QueueEntry {
                id: result.id,
                message: queued,
            },
            timestamp: now_millis(),
        }];
        events.extend(Self::evicted_event(result.evicted));
        self.commit(&inner, before, true, events);
        result.id
    }

    /// Moves current to played. No-op when idle.
    pub fn advance(&self) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.advance();
        self.commit(&inner, before, changed, Vec::new());
        changed
    }

    /// Advances only if `id` is still current.
    pub fn complete(&self, id: EntryId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.complete(id);
        if !changed {
            log::debug!("[Queue] Ignoring stale completion for {}", id);
        }
        self.commit(&inner, before, changed, Vec::new());
        changed
    }

    /// Skips the current entry.
    pub fn skip(&self) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.skip();
        self.commit(&inner, before, changed, Vec::new());
        changed
    }

    /// Deletes an entry wherever it is.
    pub fn remove(&self, id: EntryId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.remove(id);
        let events = if changed {
            vec![QueueEvent::Removed {
                entry_id: id,
                timestamp: now_millis(),
            }]
        } else {
            Vec::new()
        };
        self.commit(&inner, before, changed, events);
        changed
    }

    /// Puts a played entry back into pending.
    pub fn replay(&self, id: EntryId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.replay(id);
        let events = if changed {
            vec![QueueEvent::Replayed {
                entry_id: id,
                timestamp: now_millis(),
            }]
        } else {
            Vec::new()
        };
        self.commit(&inner, before, changed, events);
        changed
    }

    /// Queues a duplicate of the current entry right after it.
    pub fn replay_current(&self) -> Option<EntryId> {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let result = inner.queue.replay_current()?;
        let mut events = vec![QueueEvent::Replayed {
            entry_id: result.id,
            timestamp: now_millis(),
        }];
        events.extend(Self::evicted_event(result.evicted));
        self.commit(&inner, before, true, events);
        Some(result.id)
    }

    /// Makes a pending entry current.
    pub fn forward_to(&self, id: EntryId, interrupt: bool) -> ForwardOutcome {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let outcome = inner.queue.set_current(id, interrupt);
        let events = match outcome {
            ForwardOutcome::Rejected => {
                log::debug!("[Queue] Forward to {} rejected: narration in progress", id);
                vec![QueueEvent::ForwardRejected {
                    entry_id: id,
                    timestamp: now_millis(),
                }]
            }
            _ => Vec::new(),
        };
        self.commit(
            &inner,
            before,
            outcome == ForwardOutcome::Forwarded,
            events,
        );
        outcome
    }

    /// Empties the queue.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        inner.queue.clear();
        log::info!("[Queue] Cleared");
        self.commit(
            &inner,
            before,
            true,
            vec![QueueEvent::Cleared {
                timestamp: now_millis(),
            }],
        );
    }

    /// Sets the pause flag. Returns true if it changed.
    pub fn set_paused(&self, paused: bool) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.queue.set_paused(paused);
        let events = if changed {
            vec![QueueEvent::PauseChanged {
                paused,
                timestamp: now_millis(),
            }]
        } else {
            Vec::new()
        };
        self.commit(&inner, before, changed, events);
        changed
    }

    /// Flips the pause flag and returns the new value.
    pub fn toggle_pause(&self) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let paused = !inner.queue.is_paused();
        inner.queue.set_paused(paused);
        self.commit(
            &inner,
            before,
            true,
            vec![QueueEvent::PauseChanged {
                paused,
                timestamp: now_millis(),
            }],
        );
        paused
    }

    pub fn settings(&self) -> PlaybackSettings {
        self.inner.lock().settings.clone()
    }

    /// Applies a partial settings update and returns the stored settings.
    pub fn update_settings(&self, patch: PlaybackSettingsPatch) -> PlaybackSettings {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        let changed = inner.settings.apply(patch);
        let settings = inner.settings.clone();
        let events = if changed {
            vec![QueueEvent::SettingsChanged {
                settings: settings.clone(),
                timestamp: now_millis(),
            }]
        } else {
            Vec::new()
        };
        self.commit(&inner, before, changed, events);
        settings
    }

    /// Replaces the settings wholesale (used when restoring a session).
    pub fn replace_settings(&self, settings: PlaybackSettings) {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        inner.settings = settings.normalize();
        self.commit(&inner, before, false, Vec::new());
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().queue.snapshot()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().queue.capacity()
    }

    /// Loads a previously saved snapshot.
    pub fn restore(&self, snapshot: QueueSnapshot) {
        let mut inner = self.inner.lock();
        let before = inner.current_id();
        inner.queue.restore(snapshot);
        log::info!("[Queue] Restored {} entries", inner.queue.len());
        self.commit(&inner, before, false, Vec::new());
    }

    /// Current cue plus notifications of every change.
    pub fn subscribe_cue(&self) -> watch::Receiver<PlaybackCue> {
        self.cue_tx.subscribe()
    }

    /// Revision counter bumped on every persistent change.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }
}
