//! Bounded narration queue: pending, current and played entries.
//!
//! [`MessageQueue`] is pure state. It performs no I/O and knows nothing about
//! the narration engine; [`QueueController`](super::QueueController) wraps it
//! with locking and change notification.
//!
//! Invariants held after every operation:
//!
//! - `pending + played + current <= capacity`
//! - `current` never appears in `pending` or `played`
//! - if `current` is `None`, `pending` is empty (eager promotion)

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::message::{EntryId, Message, QueueEntry};

/// Result of a forward-to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardOutcome {
    /// The target is now current.
    Forwarded,
    /// Something else is current and no interrupt was requested.
    Rejected,
    /// The target is not pending.
    NotFound,
}

/// Result of an enqueue.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub id: EntryId,
    /// Entry dropped to respect the capacity, if any.
    pub evicted: Option<QueueEntry>,
}

/// Serializable view of the whole queue.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub pending: Vec<QueueEntry>,
    pub current: Option<QueueEntry>,
    pub played: Vec<QueueEntry>,
    #[serde(default)]
    pub paused: bool,
}

/// The narration queue.
#[derive(Debug)]
pub struct MessageQueue {
    pending: VecDeque<QueueEntry>,
    current: Option<QueueEntry>,
    played: Vec<QueueEntry>,
    paused: bool,
    capacity: usize,
    next_id: u64,
}

impl MessageQueue {
    /// Creates an empty queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            played: Vec::new(),
            paused: false,
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total tracked entries (pending + played + current).
    pub fn len(&self) -> usize {
        self.pending.len() + self.played.len() + usize::from(self.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> impl ExactSizeIterator<Item = &QueueEntry> {
        self.pending.iter()
    }

    pub fn played(&self) -> &[QueueEntry] {
        &self.played
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Returns true if `id` is pending, current or played.
    pub fn contains(&self, id: EntryId) -> bool {
        self.current.as_ref().is_some_and(|e| e.id == id)
            || self.pending.iter().any(|e| e.id == id)
            || self.played.iter().any(|e| e.id == id)
    }

    fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Promotes the head of `pending` when nothing is current.
    fn promote(&mut self) {
        if self.current.is_none() {
            self.current = self.pending.pop_front();
        }
    }

    /// Evicts one entry if the queue is over capacity.
    ///
    /// Prefers the oldest played entry by timestamp (first one on ties), then
    /// the oldest pending entry other than `protect`. The current entry is
    /// never evicted.
    fn enforce_capacity(&mut self, protect: Option<EntryId>) -> Option<QueueEntry> {
        if self.len() <= self.capacity {
            return None;
        }

        let oldest_played = self
            .played
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.timestamp().cmp(b.timestamp()))
            .map(|(idx, _)| idx);
        if let Some(idx) = oldest_played {
            return Some(self.played.remove(idx));
        }

        let victim = self
            .pending
            .iter()
            .position(|e| Some(e.id) != protect)
            .or(if self.pending.is_empty() { None } else { Some(0) })?;
        self.pending.remove(victim)
    }

    /// Appends a message. Becomes current immediately when nothing is current.
    pub fn enqueue(&mut self, message: Message) -> Enqueued {
        let id = self.allocate_id();
        self.pending.push_back(QueueEntry { id, message });
        self.promote();
        let evicted = self.enforce_capacity(None);
        Enqueued { id, evicted }
    }

    /// Moves current to played and promotes the next pending entry.
    ///
    /// Returns false (and changes nothing) when nothing is current.
    pub fn advance(&mut self) -> bool {
        let Some(done) = self.current.take() else {
            return false;
        };
        self.played.push(done);
        self.promote();
        true
    }

    /// Advances only if `id` is still current.
    ///
    /// Used for playback completion so a late completion for an entry that
    /// was already skipped or removed cannot advance the queue a second time.
    pub fn complete(&mut self, id: EntryId) -> bool {
        if self.current.as_ref().is_some_and(|e| e.id == id) {
            self.advance()
        } else {
            false
        }
    }

    /// User-triggered advance of the current entry.
    pub fn skip(&mut self) -> bool {
        self.advance()
    }

    /// Makes a pending entry current ("forward to").
    ///
    /// With something already current the request is rejected unless
    /// `interrupt` is set, in which case the interrupted entry goes back to
    /// the head of `pending`.
    pub fn set_current(&mut self, id: EntryId, interrupt: bool) -> ForwardOutcome {
        let Some(pos) = self.pending.iter().position(|e| e.id == id) else {
            return ForwardOutcome::NotFound;
        };
        if self.current.is_some() && !interrupt {
            return ForwardOutcome::Rejected;
        }
        let Some(target) = self.pending.remove(pos) else {
            return ForwardOutcome::NotFound;
        };
        if let Some(interrupted) = self.current.take() {
            self.pending.push_front(interrupted);
        }
        self.current = Some(target);
        ForwardOutcome::Forwarded
    }

    /// Deletes an entry from wherever it is.
    ///
    /// Removing the current entry is a hard stop: it is not recorded as
    /// played, and the next pending entry is promoted.
    pub fn remove(&mut self, id: EntryId) -> bool {
        if self.current.as_ref().is_some_and(|e| e.id == id) {
            self.current = None;
            self.promote();
            return true;
        }
        if let Some(pos) = self.pending.iter().position(|e| e.id == id) {
            self.pending.remove(pos);
            return true;
        }
        if let Some(pos) = self.played.iter().position(|e| e.id == id) {
            self.played.remove(pos);
            return true;
        }
        false
    }

    /// Moves a played entry back into `pending`, ordered by timestamp.
    ///
    /// Pending entries are stably re-sorted by timestamp, with the replayed
    /// entry ahead of others sharing its timestamp.
    pub fn replay(&mut self, id: EntryId) -> bool {
        let Some(pos) = self.played.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.played.remove(pos);
        self.pending.push_front(entry);
        self.pending
            .make_contiguous()
            .sort_by(|a, b| a.timestamp().cmp(b.timestamp()));
        self.promote();
        true
    }

    /// Queues a duplicate of the current entry to play right after it.
    ///
    /// The duplicate gets a fresh id. Returns `None` when nothing is current.
    pub fn replay_current(&mut self) -> Option<Enqueued> {
        let message = self.current.as_ref()?.message.clone();
        let id = self.allocate_id();
        self.pending.push_front(QueueEntry { id, message });
        let evicted = self.enforce_capacity(Some(id));
        Some(Enqueued { id, evicted })
    }

    /// Empties the queue.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.played.clear();
        self.current = None;
    }

    /// Sets the pause flag. Returns true if it changed.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let changed = self.paused != paused;
        self.paused = paused;
        changed
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.iter().cloned().collect(),
            current: self.current.clone(),
            played: self.played.clone(),
            paused: self.paused,
        }
    }

    /// Replaces the contents with a previously taken snapshot.
    ///
    /// Duplicate ids are dropped (first occurrence wins, current first), the
    /// capacity is re-enforced and promotion applied, so a hand-edited or
    /// stale snapshot cannot break the invariants.
    pub fn restore(&mut self, snapshot: QueueSnapshot) {
        let mut seen = std::collections::HashSet::new();
        let mut keep = |entry: &QueueEntry| seen.insert(entry.id);

        self.current = snapshot.current.filter(|e| keep(e));
        self.pending = snapshot.pending.into_iter().filter(|e| keep(e)).collect();
        self.played = snapshot.played.into_iter().filter(|e| keep(e)).collect();
        self.paused = snapshot.paused;

        let max_id = self
            .current
            .iter()
            .chain(self.pending.iter())
            .chain(self.played.iter())
            .map(|e| e.id.0)
            .max()
            .unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1);

        self.promote();
        while self.len() > self.capacity {
            if self.enforce_capacity(None).is_none() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(ts: i64, name: &str) -> Message {
        Message::new(ts, name, "#fff", format!("hello from {}", name))
    }

    fn names(entries: impl Iterator<Item = QueueEntry>) -> Vec<String> {
        entries.map(|e| e.message.username).collect()
    }

    fn pending_names(q: &MessageQueue) -> Vec<String> {
        names(q.pending().cloned())
    }

    fn played_names(q: &MessageQueue) -> Vec<String> {
        names(q.played().iter().cloned())
    }

    fn current_name(q: &MessageQueue) -> Option<String> {
        q.current().map(|e| e.message.username.clone())
    }

    fn assert_exclusive(q: &MessageQueue) {
        if let Some(cur) = q.current() {
            assert!(q.pending().all(|e| e.id != cur.id), "current in pending");
            assert!(q.played().iter().all(|e| e.id != cur.id), "current in played");
        } else {
            assert_eq!(q.pending().len(), 0, "pending without current");
        }
    }

    #[test]
    fn first_enqueue_becomes_current() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        assert_eq!(current_name(&q), Some("a".into()));
        assert!(pending_names(&q).is_empty());
    }

    #[test]
    fn enqueue_then_advance_scenario() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        assert_eq!(current_name(&q), Some("a".into()));
        assert_eq!(pending_names(&q), vec!["b"]);

        assert!(q.advance());
        assert_eq!(current_name(&q), Some("b".into()));
        assert_eq!(played_names(&q), vec!["a"]);
        assert!(pending_names(&q).is_empty());
    }

    #[test]
    fn advance_without_current_is_noop() {
        let mut q = MessageQueue::new(50);
        let before = q.snapshot();
        assert!(!q.advance());
        assert_eq!(q.snapshot(), before);
    }

    #[test]
    fn advance_last_entry_clears_current() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        q.advance();
        assert!(q.current().is_none());
        assert_eq!(played_names(&q), vec!["a"]);
    }

    #[test]
    fn cap_holds_for_any_enqueue_sequence() {
        for cap in [1, 2, 3, 7, 50] {
            let mut q = MessageQueue::new(cap);
            for i in 0..200 {
                q.enqueue(msg(i, &format!("u{}", i)));
                if i % 3 == 0 {
                    q.advance();
                }
                if i % 11 == 0 {
                    q.replay_current();
                }
                assert!(q.len() <= cap, "cap {} exceeded at step {}", cap, i);
                assert_exclusive(&q);
            }
        }
    }

    #[test]
    fn eviction_prefers_oldest_played() {
        let mut q = MessageQueue::new(4);
        q.enqueue(msg(5, "m2"));
        q.enqueue(msg(1, "m1"));
        q.enqueue(msg(9, "m4"));
        q.enqueue(msg(8, "m3"));
        // played = [m2(t=5), m1(t=1)], current = m4, pending = [m3]
        q.advance();
        q.advance();
        assert_eq!(played_names(&q), vec!["m2", "m1"]);
        assert_eq!(current_name(&q), Some("m4".into()));
        assert_eq!(pending_names(&q), vec!["m3"]);

        let result = q.enqueue(msg(10, "m5"));
        assert_eq!(result.evicted.map(|e| e.message.username), Some("m1".into()));
        assert_eq!(played_names(&q), vec!["m2"]);
        assert_eq!(current_name(&q), Some("m4".into()));
        assert_eq!(pending_names(&q), vec!["m3", "m5"]);
    }

    #[test]
    fn eviction_falls_back_to_oldest_pending_never_current() {
        let mut q = MessageQueue::new(3);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        q.enqueue(msg(3, "c"));
        let result = q.enqueue(msg(4, "d"));
        assert_eq!(result.evicted.map(|e| e.message.username), Some("b".into()));
        assert_eq!(current_name(&q), Some("a".into()));
        assert_eq!(pending_names(&q), vec!["c", "d"]);
    }

    #[test]
    fn capacity_one_keeps_current_and_drops_arrivals() {
        let mut q = MessageQueue::new(1);
        q.enqueue(msg(1, "a"));
        let result = q.enqueue(msg(2, "b"));
        assert_eq!(result.evicted.map(|e| e.message.username), Some("b".into()));
        assert_eq!(current_name(&q), Some("a".into()));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn complete_ignores_stale_ids() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        let b = q.enqueue(msg(2, "b")).id;
        q.enqueue(msg(3, "c"));

        // user skips a, then a's late completion arrives
        assert!(q.skip());
        assert!(!q.complete(a));
        assert_eq!(current_name(&q), Some("b".into()));

        assert!(q.complete(b));
        assert_eq!(current_name(&q), Some("c".into()));
        assert_eq!(played_names(&q), vec!["a", "b"]);
    }

    #[test]
    fn remove_current_promotes_without_recording_played() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        q.enqueue(msg(2, "b"));
        assert!(q.remove(a));
        assert_eq!(current_name(&q), Some("b".into()));
        assert!(played_names(&q).is_empty());
    }

    #[test]
    fn remove_from_pending_and_played() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        let b = q.enqueue(msg(2, "b")).id;
        let c = q.enqueue(msg(3, "c")).id;
        q.advance();
        assert!(q.remove(a));
        assert!(q.remove(c));
        assert_eq!(current_name(&q), Some("b".into()));
        assert!(q.contains(b));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        let before = q.snapshot();
        assert!(!q.remove(EntryId(999)));
        assert_eq!(q.snapshot(), before);
    }

    #[test]
    fn replay_reinserts_by_timestamp() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(10, "a")).id;
        q.enqueue(msg(20, "b"));
        q.enqueue(msg(5, "c"));
        q.enqueue(msg(30, "d"));
        q.advance();
        // current b, pending [c(5), d(30)], played [a(10)]
        assert!(q.replay(a));
        assert_eq!(pending_names(&q), vec!["c", "a", "d"]);
        assert!(played_names(&q).is_empty());
        assert_exclusive(&q);
    }

    #[test]
    fn replay_with_idle_queue_promotes_eagerly() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        q.advance();
        assert!(q.current().is_none());

        assert!(q.replay(a));
        assert_eq!(current_name(&q), Some("a".into()));
        assert_exclusive(&q);
    }

    #[test]
    fn replay_of_non_played_entry_is_noop() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        let b = q.enqueue(msg(2, "b")).id;
        assert!(!q.replay(a));
        assert!(!q.replay(b));
        assert_eq!(current_name(&q), Some("a".into()));
    }

    #[test]
    fn replay_current_queues_a_distinct_duplicate() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        q.enqueue(msg(2, "b"));
        let dup = q.replay_current().expect("current exists").id;
        assert_ne!(dup, a);
        assert_eq!(pending_names(&q), vec!["a", "b"]);
        assert_eq!(q.current().map(|e| e.id), Some(a));

        q.advance();
        assert_eq!(q.current().map(|e| e.id), Some(dup));
        assert_exclusive(&q);
    }

    #[test]
    fn replay_current_without_current_is_noop() {
        let mut q = MessageQueue::new(50);
        assert!(q.replay_current().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn replay_current_at_capacity_keeps_duplicate() {
        let mut q = MessageQueue::new(3);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        q.enqueue(msg(3, "c"));
        let result = q.replay_current().expect("current exists");
        assert_eq!(result.evicted.map(|e| e.message.username), Some("b".into()));
        assert_eq!(pending_names(&q), vec!["a", "c"]);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn forward_to_requires_a_pending_target() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        let b = q.enqueue(msg(2, "b")).id;
        let c = q.enqueue(msg(3, "c")).id;
        q.advance();
        q.advance();
        q.advance();
        assert!(q.current().is_none());
        // nothing pending, nothing to forward to
        assert_eq!(q.set_current(b, false), ForwardOutcome::NotFound);

        q.replay(b);
        q.replay(c);
        // b was promoted, c is pending
        assert_eq!(q.set_current(c, false), ForwardOutcome::Rejected);
        q.remove(b);
        assert_eq!(current_name(&q), Some("c".into()));
    }

    #[test]
    fn forward_to_is_rejected_while_playing() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        let c = q.enqueue(msg(3, "c")).id;
        assert_eq!(q.set_current(c, false), ForwardOutcome::Rejected);
        assert_eq!(current_name(&q), Some("a".into()));
        assert_eq!(pending_names(&q), vec!["b", "c"]);
    }

    #[test]
    fn forward_to_with_interrupt_requeues_old_current() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        let c = q.enqueue(msg(3, "c")).id;
        assert_eq!(q.set_current(c, true), ForwardOutcome::Forwarded);
        assert_eq!(current_name(&q), Some("c".into()));
        assert_eq!(pending_names(&q), vec!["a", "b"]);
        assert!(played_names(&q).is_empty());
        assert_exclusive(&q);
    }

    #[test]
    fn forward_to_current_or_played_is_not_found() {
        let mut q = MessageQueue::new(50);
        let a = q.enqueue(msg(1, "a")).id;
        let b = q.enqueue(msg(2, "b")).id;
        assert_eq!(q.set_current(a, true), ForwardOutcome::NotFound);
        q.advance();
        assert_eq!(q.set_current(a, true), ForwardOutcome::NotFound);
        assert_eq!(q.current().map(|e| e.id), Some(b));
    }

    #[test]
    fn clear_empties_everything() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        q.enqueue(msg(2, "b"));
        q.advance();
        q.clear();
        assert!(q.is_empty());
        assert!(q.current().is_none());
    }

    #[test]
    fn pause_flag_does_not_touch_contents() {
        let mut q = MessageQueue::new(50);
        q.enqueue(msg(1, "a"));
        assert!(q.set_paused(true));
        assert!(!q.set_paused(true));
        assert!(q.is_paused());
        assert_eq!(current_name(&q), Some("a".into()));
    }

    #[test]
    fn restore_repairs_invalid_snapshots() {
        let entry = |id: u64, ts: i64| QueueEntry {
            id: EntryId(id),
            message: msg(ts, &format!("e{}", id)),
        };
        let snapshot = QueueSnapshot {
            pending: vec![entry(2, 2), entry(3, 3), entry(2, 2)],
            current: None,
            played: vec![entry(1, 1)],
            paused: true,
        };

        let mut q = MessageQueue::new(2);
        q.restore(snapshot);
        assert_eq!(q.len(), 2);
        assert_eq!(current_name(&q), Some("e2".into()));
        assert_eq!(pending_names(&q), vec!["e3"]);
        assert!(q.is_paused());
        assert_exclusive(&q);

        // new ids never collide with restored ones
        let next = q.enqueue(msg(4, "new")).id;
        assert!(next.0 > 3);
    }
}
