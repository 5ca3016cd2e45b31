//! Deferred emulated-input transitions keyed by simulated time.

use std::{collections::BTreeMap, time::Duration};

use release_judge_core::{EmuKey, Player};

/// Transition queued on a player's emulated channel once its timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DeferredKey {
    pub(crate) player: Player,
    pub(crate) key: EmuKey,
}

/// Single-threaded task queue polled once per tick.
///
/// Tasks fire in due order, ties broken by insertion order.
#[derive(Debug)]
pub(crate) struct TimerQueue {
    entries: BTreeMap<(Duration, u64), DeferredKey>,
    next_sequence: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    pub(crate) fn schedule(&mut self, due: Duration, task: DeferredKey) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let _ = self.entries.insert((due, sequence), task);
    }

    /// Removes and returns every task due at or before `now`.
    pub(crate) fn drain_due(&mut self, now: Duration) -> Vec<DeferredKey> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
