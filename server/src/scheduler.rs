//! Keyed one-shot timers driven by the owner's clock.
//!
//! The scheduler never runs anything by itself. Its owner calls
//! [`Scheduler::pop_due`] from the loop it already runs (the tick, or the
//! network select) and handles the returned events synchronously, so timer
//! callbacks can never re-enter one another.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Identifies one scheduled event. Handles come from a monotonically
/// increasing counter and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
pub struct Scheduler<E> {
    next_id: u64,
    /// Ordered by deadline, ties broken by scheduling order.
    queue: BTreeMap<(Instant, u64), E>,
    deadlines: HashMap<u64, Instant>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, event: E) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;

        let deadline = now + delay;
        self.queue.insert((deadline, id), event);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Removes a pending event. Returns `None` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<E> {
        let deadline = self.deadlines.remove(&handle.0)?;
        self.queue.remove(&(deadline, handle.0))
    }

    /// Removes and returns every event due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<(TimerHandle, E)> {
        let mut due = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((_, id), event) = entry.remove_entry();
            self.deadlines.remove(&id);
            due.push((TimerHandle(id), event));
        }
        due
    }

    /// Cancels every pending event the predicate rejects.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&E) -> bool,
    {
        let deadlines = &mut self.deadlines;
        self.queue.retain(|(_, id), event| {
            let keep = keep(event);
            if !keep {
                deadlines.remove(id);
            }
            keep
        });
    }

    #[cfg(test)]
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.deadlines.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
