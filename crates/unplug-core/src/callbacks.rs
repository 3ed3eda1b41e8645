//! Scheduled callbacks with cancellation handles.
//!
//! The core never sleeps or spawns. Components register what should happen
//! and when; a driver (the tokio loop in the CLI, or a test stepping a
//! [`crate::clock::ManualClock`]) asks the queue for everything that is due
//! and runs it on the single execution context.
//!
//! Periodic entries coalesce: if the driver was suspended across several
//! periods, the entry fires once and is re-armed one period after `now`
//! rather than replaying every missed period in a burst.

use std::collections::{BTreeMap, HashMap};

/// Work the controller schedules on its queue.
///
/// Session-scoped variants carry the session id they were armed for (and the
/// loop generation for reminder fires) so a late fire can be recognised and
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Tick { session_id: String },
    ReminderFire { session_id: String, loop_id: u64 },
    BackgroundSync { session_id: String },
    BatterySample,
}

impl Callback {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Callback::Tick { session_id }
            | Callback::ReminderFire { session_id, .. }
            | Callback::BackgroundSync { session_id } => Some(session_id),
            Callback::BatterySample => None,
        }
    }
}

/// Cancellation token for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(u64);

#[derive(Debug, Clone)]
struct Entry<T> {
    payload: T,
    period_ms: Option<u64>,
}

/// A callback that became due.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<T> {
    pub handle: CallbackHandle,
    pub due_ms: u64,
    pub payload: T,
}

#[derive(Debug, Clone)]
pub struct CallbackQueue<T> {
    next_id: u64,
    /// Ordered by (due, insertion id) so equal deadlines fire FIFO.
    entries: BTreeMap<(u64, u64), Entry<T>>,
    due_by_id: HashMap<u64, u64>,
}

impl<T> Default for CallbackQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: BTreeMap::new(),
            due_by_id: HashMap::new(),
        }
    }
}

impl<T: Clone> CallbackQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once at `due_ms`.
    #[cfg(test)]
    pub(crate) fn schedule_at(&mut self, due_ms: u64, payload: T) -> CallbackHandle {
        self.insert(due_ms, payload, None)
    }

    /// Fire at `first_due_ms`, then every `period_ms` until cancelled.
    pub fn schedule_every(
        &mut self,
        first_due_ms: u64,
        period_ms: u64,
        payload: T,
    ) -> CallbackHandle {
        self.insert(first_due_ms, payload, Some(period_ms.max(1)))
    }

    /// Returns true if the handle was still pending.
    pub fn cancel(&mut self, handle: CallbackHandle) -> bool {
        match self.due_by_id.remove(&handle.0) {
            Some(due) => self.entries.remove(&(due, handle.0)).is_some(),
            None => false,
        }
    }

    /// Cancel every pending entry whose payload matches.
    pub fn cancel_where<F>(&mut self, mut matches: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let doomed: Vec<(u64, u64)> = self
            .entries
            .iter()
            .filter(|(_, entry)| matches(&entry.payload))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.entries.remove(key);
            self.due_by_id.remove(&key.1);
        }
        doomed.len()
    }

    pub fn is_pending(&self, handle: CallbackHandle) -> bool {
        self.due_by_id.contains_key(&handle.0)
    }

    pub fn due_of(&self, handle: CallbackHandle) -> Option<u64> {
        self.due_by_id.get(&handle.0).copied()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.due_by_id.clear();
    }

    /// Remove and return the earliest entry due at or before `now_ms`.
    /// Periodic entries are re-armed before being returned, so the caller
    /// may cancel them from inside the callback.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Fired<T>> {
        let key = *self.entries.keys().next()?;
        if key.0 > now_ms {
            return None;
        }
        let (due, id) = key;
        let entry = self.entries.remove(&key)?;
        self.due_by_id.remove(&id);

        let payload = entry.payload.clone();
        if let Some(period) = entry.period_ms {
            let mut next = due.saturating_add(period);
            if next <= now_ms {
                next = now_ms.saturating_add(period);
            }
            self.entries.insert((next, id), entry);
            self.due_by_id.insert(id, next);
        }

        Some(Fired {
            handle: CallbackHandle(id),
            due_ms: due,
            payload,
        })
    }

    fn insert(&mut self, due_ms: u64, payload: T, period_ms: Option<u64>) -> CallbackHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert((due_ms, id), Entry { payload, period_ms });
        self.due_by_id.insert(id, due_ms);
        CallbackHandle(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order_then_fifo() {
        let mut queue = CallbackQueue::new();
        queue.schedule_at(200, "late");
        queue.schedule_at(100, "first");
        queue.schedule_at(100, "second");

        assert!(queue.pop_due(50).is_none());
        assert_eq!(queue.pop_due(300).unwrap().payload, "first");
        assert_eq!(queue.pop_due(300).unwrap().payload, "second");
        assert_eq!(queue.pop_due(300).unwrap().payload, "late");
        assert!(queue.is_empty());
    }

    #[test]
    fn cancelled_entries_never_fire() {
        let mut queue = CallbackQueue::new();
        let handle = queue.schedule_at(100, 1);
        assert!(queue.is_pending(handle));
        assert!(queue.cancel(handle));
        assert!(!queue.cancel(handle));
        assert!(queue.pop_due(1_000).is_none());
    }

    #[test]
    fn periodic_entries_rearm() {
        let mut queue = CallbackQueue::new();
        let handle = queue.schedule_every(0, 100, ());
        assert_eq!(queue.pop_due(0).unwrap().due_ms, 0);
        assert_eq!(queue.due_of(handle), Some(100));
        assert!(queue.pop_due(99).is_none());
        assert_eq!(queue.pop_due(100).unwrap().due_ms, 100);
        assert_eq!(queue.due_of(handle), Some(200));
    }

    #[test]
    fn periodic_entries_coalesce_after_suspension() {
        let mut queue = CallbackQueue::new();
        let handle = queue.schedule_every(0, 100, ());
        queue.pop_due(0);

        // Suspended for ten periods: one firing, then re-armed after now.
        assert!(queue.pop_due(1_050).is_some());
        assert!(queue.pop_due(1_050).is_none());
        assert_eq!(queue.due_of(handle), Some(1_150));
    }

    #[test]
    fn periodic_entry_can_be_cancelled_after_firing() {
        let mut queue = CallbackQueue::new();
        let fired = {
            queue.schedule_every(0, 10, ());
            queue.pop_due(0).unwrap()
        };
        assert!(queue.cancel(fired.handle));
        assert!(queue.pop_due(1_000).is_none());
    }

    #[test]
    fn cancel_where_filters_by_payload() {
        let mut queue = CallbackQueue::new();
        queue.schedule_at(10, ("a", 1));
        queue.schedule_every(10, 5, ("b", 2));
        queue.schedule_at(20, ("a", 3));
        assert_eq!(queue.cancel_where(|p| p.0 == "a"), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_due(), Some(10));
    }
}
