// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deadline-ordered timer queue.
//!
//! Holds lookup keys, never the timed objects themselves. The owner keeps the
//! object and re-inserts its key whenever the deadline changes, so a cancelled
//! key can never surface from `pop_expired`.
//!
//! Ordering is `(deadline, insertion sequence)`: equal deadlines pop in FIFO
//! order. Insert, cancel and pop are `O(log n)`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    deadline: Instant,
    seq: u64,
}

/// Ordered schedule of keys by absolute deadline.
#[derive(Debug)]
pub struct TimerQueue<K> {
    by_deadline: BTreeMap<Slot, K>,
    by_key: HashMap<K, Slot>,
    next_seq: u64,
}

impl<K> TimerQueue<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            by_deadline: BTreeMap::new(),
            by_key: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Insert `key`, or move it if already scheduled.
    ///
    /// A rescheduled key loses its FIFO position among equal deadlines.
    pub fn schedule(&mut self, key: K, deadline: Instant) {
        if let Some(old) = self.by_key.remove(&key) {
            self.by_deadline.remove(&old);
        }
        let slot = Slot {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.by_deadline.insert(slot, key);
        self.by_key.insert(key, slot);
    }

    /// Remove `key`. Returns its deadline if it was scheduled.
    pub fn cancel(&mut self, key: &K) -> Option<Instant> {
        let slot = self.by_key.remove(key)?;
        self.by_deadline.remove(&slot);
        Some(slot.deadline)
    }

    /// Remove and return, in deadline order, every key due at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired = Vec::new();
        while let Some(entry) = self.by_deadline.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            let key = entry.remove();
            self.by_key.remove(&key);
            expired.push(key);
        }
        expired
    }

    pub fn deadline_of(&self, key: &K) -> Option<Instant> {
        self.by_key.get(key).map(|slot| slot.deadline)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|slot| slot.deadline)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_deadline.clear();
        self.by_key.clear();
    }
}

impl<K> Default for TimerQueue<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
