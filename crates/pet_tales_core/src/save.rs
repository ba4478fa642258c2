//! crates/pet_tales_core/src/save.rs
//!
//! Debounced persistence of the active chapter and the tri-state save indicator.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::clock::{TimerKind, Timers};
use crate::domain::{Chapter, Notification, SaveStatus};

/// Quiet period after the last change before the chapter is written.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(1500);
/// How long the "saved" confirmation stays up.
pub const SAVED_RESET_DELAY: Duration = Duration::from_millis(2000);

/// One write of a chapter's content, always the latest known version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub chapter_id: Uuid,
    pub content: String,
    pub word_count: usize,
}

#[derive(Debug, Clone)]
pub struct SaveCoordinator {
    debounce: Duration,
    reset_delay: Duration,
    status: SaveStatus,
    /// Latest content not yet handed to the store.
    pending: Option<SaveRequest>,
    in_flight: usize,
}

impl Default for SaveCoordinator {
    fn default() -> Self {
        Self::new(SAVE_DEBOUNCE, SAVED_RESET_DELAY)
    }
}

impl SaveCoordinator {
    pub fn new(debounce: Duration, reset_delay: Duration) -> Self {
        Self {
            debounce,
            reset_delay,
            status: SaveStatus::Idle,
            pending: None,
            in_flight: 0,
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.pending.is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Records the chapter's new content and restarts the debounce. Placeholder
    /// chapters are never persisted; returns `false` for them.
    pub fn content_changed(&mut self, chapter: &Chapter, now: Duration, timers: &mut Timers) -> bool {
        if chapter.is_placeholder() {
            return false;
        }
        timers.cancel(TimerKind::SaveStatusReset);
        self.status = SaveStatus::Idle;
        self.pending = Some(SaveRequest {
            chapter_id: chapter.id,
            content: chapter.content.clone(),
            word_count: chapter.word_count,
        });
        timers.schedule(TimerKind::Save, now + self.debounce);
        true
    }

    /// The debounce elapsed; hands out the latest content.
    pub fn save_due(&mut self) -> Option<SaveRequest> {
        self.issue()
    }

    /// Writes immediately, cancelling the debounce. Nothing is issued when every
    /// change has already been handed out.
    pub fn flush(&mut self, timers: &mut Timers) -> Option<SaveRequest> {
        timers.cancel(TimerKind::Save);
        self.issue()
    }

    /// Applies the store's answer for a previously issued request.
    pub fn save_finished(
        &mut self,
        result: Result<(), String>,
        now: Duration,
        timers: &mut Timers,
    ) -> Option<Notification> {
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(()) => {
                if self.in_flight == 0 && self.pending.is_none() {
                    self.status = SaveStatus::Saved;
                    timers.schedule(TimerKind::SaveStatusReset, now + self.reset_delay);
                }
                None
            }
            Err(message) => {
                timers.cancel(TimerKind::SaveStatusReset);
                self.status = SaveStatus::Idle;
                Some(Notification::error(format!(
                    "Failed to save changes: {}",
                    message
                )))
            }
        }
    }

    /// The confirmation period ended.
    pub fn status_reset_fired(&mut self) -> bool {
        if self.status == SaveStatus::Saved {
            self.status = SaveStatus::Idle;
            true
        } else {
            false
        }
    }

    fn issue(&mut self) -> Option<SaveRequest> {
        let request = self.pending.take()?;
        debug!(chapter_id = %request.chapter_id, words = request.word_count, "issuing save");
        self.status = SaveStatus::Saving;
        self.in_flight += 1;
        Some(request)
    }
}
