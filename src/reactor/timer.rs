//! Deadline bookkeeping for the reactor's timer wheel.
//!
//! Deleted timers are removed from `meta` immediately but left in the heap
//! (lazy deletion): `take_due` discards any popped entry whose id is no
//! longer in `meta`. This keeps `del` O(log n) instead of requiring a linear
//! scan of the heap.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

#[derive(Clone, Copy)]
struct TimerMeta {
    interval: Duration,
    persistent: bool,
}

pub(crate) struct TimerTable {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    meta: HashMap<u64, TimerMeta>,
}

impl TimerTable {
    pub(crate) fn new() -> Self {
        TimerTable {
            heap: BinaryHeap::new(),
            meta: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, id: u64, delay: Duration, persistent: bool) {
        let deadline = Instant::now() + delay;
        self.heap.push(Reverse((deadline, id)));
        self.meta.insert(id, TimerMeta { interval: delay, persistent });
    }

    /// Returns `true` if a timer with this id was armed.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.meta.remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.meta.contains_key(&id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Delay until the next potentially-due timer, or `None` if no timer is
    /// armed. May under-estimate slightly for stale (deleted) heap entries;
    /// `take_due` discards those for free on the next wakeup.
    pub(crate) fn next_timeout(&self) -> Option<Duration> {
        self.heap
            .peek()
            .map(|&Reverse((deadline, _))| deadline.saturating_duration_since(Instant::now()))
    }

    /// Pops and returns the ids of every timer whose deadline has passed.
    /// Persistent timers are rescheduled in place; one-shot timers are
    /// consumed (removed from `meta`) so a second firing is structurally
    /// impossible.
    pub(crate) fn take_due(&mut self) -> Vec<u64> {
        let now = Instant::now();
        let mut due = Vec::new();
        while let Some(&Reverse((deadline, id))) = self.heap.peek() {
            if deadline > now {
                break;
            }
            self.heap.pop();
            let Some(meta) = self.meta.get(&id).copied() else {
                continue; // deleted since it was scheduled
            };
            due.push(id);
            if meta.persistent {
                self.heap.push(Reverse((now + meta.interval, id)));
            } else {
                self.meta.remove(&id);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let mut table = TimerTable::new();
        table.insert(1, Duration::from_millis(0), false);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(table.take_due(), vec![1]);
        assert!(table.take_due().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn persistent_reschedules() {
        let mut table = TimerTable::new();
        table.insert(1, Duration::from_millis(0), true);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(table.take_due(), vec![1]);
        assert!(table.contains(1));
    }

    #[test]
    fn removed_timer_is_discarded_on_pop() {
        let mut table = TimerTable::new();
        table.insert(1, Duration::from_millis(0), false);
        assert!(table.remove(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(table.take_due().is_empty());
    }
}
