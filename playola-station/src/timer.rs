//! Deadline queue keyed by monotonic time
//!
//! Every self-rescheduling callback in the station (start, fade begin, fade
//! step, prefetch tick, advance check) is an entry here. The owning event
//! loop sleeps until [`TimerQueue::next_deadline`] and then drains
//! [`TimerQueue::pop_due`]; nothing sleeps on its own.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use playola_common::time::DateHandler;
use tokio::time::Instant;

/// Monotonic deadline for a wall-clock instant on `clock`'s timeline
///
/// Instants already in the past map to now.
pub fn deadline_for(clock: &dyn DateHandler, when: DateTime<Utc>) -> Instant {
    let wait = (clock.adjusted_date(when) - clock.now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    Instant::now() + wait
}

/// Handle for cancelling a scheduled entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(Instant, TimerId), T>,
    deadlines: HashMap<TimerId, Instant>,
    next_id: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries with equal deadlines fire in scheduling order
    pub fn schedule(&mut self, deadline: Instant, payload: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.insert((deadline, id), payload);
        self.deadlines.insert(id, deadline);
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let deadline = self.deadlines.remove(&id)?;
        self.entries.remove(&(deadline, id))
    }

    /// Cancel every entry whose payload matches; returns how many went
    pub fn cancel_where(&mut self, mut matches: impl FnMut(&T) -> bool) -> usize {
        let doomed: Vec<(Instant, TimerId)> = self
            .entries
            .iter()
            .filter(|(_, payload)| matches(payload))
            .map(|(key, _)| *key)
            .collect();
        for key in &doomed {
            self.entries.remove(key);
            self.deadlines.remove(&key.1);
        }
        doomed.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every entry due at or before `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let (_, id) = *entry.key();
            due.push(entry.remove());
            self.deadlines.remove(&id);
        }
        due
    }

    pub fn contains(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Instant, &T)> {
        self.entries.iter().map(|((deadline, _), payload)| (*deadline, payload))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.deadlines.clear();
    }
}
