use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Clone)]
struct Pending<E> {
    key: &'static str,
    version: u64,
    due_at: Instant,
    event: E,
}

/// Keyed one-shot timers.
///
/// Scheduling a key again, or cancelling it, invalidates whatever was
/// pending under that key; stale entries are dropped when they come due.
#[derive(Debug)]
pub struct Scheduler<E> {
    pending: Vec<Pending<E>>,
    versions: HashMap<&'static str, u64>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            versions: HashMap::new(),
        }
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: &'static str, delay: Duration, event: E, now: Instant) {
        let version = self.bump_version(key);
        trace!(key, ?delay, version, "scheduled timer");
        self.pending.push(Pending {
            key,
            version,
            due_at: now + delay,
            event,
        });
    }

    pub fn cancel(&mut self, key: &'static str) {
        self.bump_version(key);
        self.pending.retain(|task| task.key != key);
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.pending
            .iter()
            .any(|task| task.key == key && self.is_current(task))
    }

    /// Removes and returns every live event due at `now`, earliest first.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<E> {
        let mut due = Vec::new();
        let mut idx = 0usize;
        while idx < self.pending.len() {
            if self.pending[idx].due_at <= now {
                let task = self.pending.swap_remove(idx);
                if self.is_current(&task) {
                    due.push(task);
                }
            } else {
                idx += 1;
            }
        }

        due.sort_by_key(|task| task.due_at);
        due.into_iter().map(|task| task.event).collect()
    }

    /// Time until the next pending entry, capped at `default_timeout`.
    pub fn poll_timeout(&self, now: Instant, default_timeout: Duration) -> Duration {
        self.pending
            .iter()
            .filter(|task| self.is_current(task))
            .map(|task| task.due_at.saturating_duration_since(now))
            .fold(default_timeout, Duration::min)
    }

    fn is_current(&self, task: &Pending<E>) -> bool {
        self.versions.get(task.key).copied().unwrap_or(0) == task.version
    }

    fn bump_version(&mut self, key: &'static str) -> u64 {
        let entry = self.versions.entry(key).or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }
}
