//! crates/pet_tales_core/src/settings.rs

use std::time::Duration;

use crate::cadence::{SUGGESTION_SETTLE_DELAY, SUGGESTION_WORD_TRIGGER};
use crate::save::{SAVED_RESET_DELAY, SAVE_DEBOUNCE};

/// Tunable timings of the writing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditorSettings {
    pub suggestion_word_trigger: usize,
    pub suggestion_settle_delay: Duration,
    pub save_debounce: Duration,
    pub saved_reset_delay: Duration,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            suggestion_word_trigger: SUGGESTION_WORD_TRIGGER,
            suggestion_settle_delay: SUGGESTION_SETTLE_DELAY,
            save_debounce: SAVE_DEBOUNCE,
            saved_reset_delay: SAVED_RESET_DELAY,
        }
    }
}
