//! crates/pet_tales_core/src/clock.rs
//!
//! Cancellable timers on a virtual clock.
//!
//! Time is a `Duration` measured from the start of a writing session. The editor
//! state machines only ever see these offsets, so tests advance time by hand while
//! the server maps deadlines onto `tokio::time::Instant`s.

use std::time::Duration;

/// The timers a writing session uses. Each kind has at most one pending deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Settle delay before a suggestion fetch starts.
    SuggestionTrigger,
    /// Debounced persistence of the active chapter.
    Save,
    /// Reverts the "saved" indicator to idle.
    SaveStatusReset,
    /// Starts the per-character reveal of accepted text.
    HighlightStart,
    /// End of the acceptance highlight; editing resumes.
    HighlightComplete,
}

/// A table of keyed deadlines. Scheduling an existing key replaces its deadline.
#[derive(Debug, Clone)]
pub struct Timers<K = TimerKind> {
    entries: Vec<(K, Duration)>,
}

impl<K> Default for Timers<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Copy + Eq> Timers<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to fire at `at`, replacing any pending deadline for it.
    pub fn schedule(&mut self, key: K, at: Duration) {
        self.cancel(key);
        self.entries.push((key, at));
    }

    /// Removes the pending deadline for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: K) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        before != self.entries.len()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_scheduled(&self, key: K) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    pub fn deadline(&self, key: K) -> Option<Duration> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, at)| *at)
    }

    /// The earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.entries.iter().map(|(_, at)| *at).min()
    }

    /// Removes and returns every key due at `now`, earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<K> {
        let mut due: Vec<(K, Duration)> = Vec::new();
        self.entries.retain(|&(k, at)| {
            if at <= now {
                due.push((k, at));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, at)| *at);
        due.into_iter().map(|(k, _)| k).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
