//! crates/pet_tales_core/src/animator.rs
//!
//! Timing for the reveal animation that plays over freshly accepted text.

use std::time::Duration;

use serde::Serialize;

use crate::clock::{TimerKind, Timers};

/// Delay between the start of consecutive characters.
pub const STAGGER_DELAY: Duration = Duration::from_millis(20);
/// Transition length of a single character.
pub const CHAR_TRANSITION: Duration = Duration::from_millis(400);
/// How long the fully revealed text stays highlighted.
pub const HOLD_DURATION: Duration = Duration::from_millis(1000);
/// Gap between rendering the overlay and starting the wave.
pub const START_DELAY: Duration = Duration::from_millis(10);

/// Total animation time for `char_count` characters.
pub fn total_duration(char_count: usize) -> Duration {
    let steps = char_count.saturating_sub(1) as u32;
    STAGGER_DELAY * steps + CHAR_TRANSITION + HOLD_DURATION
}

/// One character of the overlay and when its transition starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharReveal {
    pub ch: char,
    pub delay_ms: u64,
}

/// Everything a client needs to render the highlight overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightPlan {
    pub text_before: String,
    pub chars: Vec<CharReveal>,
    pub transition_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorState {
    Inactive,
    /// Overlay rendered, wave not yet started.
    Pending,
    Animating,
}

#[derive(Debug, Clone)]
pub struct HighlightAnimator {
    state: AnimatorState,
}

impl Default for HighlightAnimator {
    fn default() -> Self {
        Self {
            state: AnimatorState::Inactive,
        }
    }
}

impl HighlightAnimator {
    pub fn state(&self) -> AnimatorState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != AnimatorState::Inactive
    }

    /// Starts a highlight, replacing any that is still running.
    pub fn start(
        &mut self,
        highlight_text: &str,
        text_before: &str,
        now: Duration,
        timers: &mut Timers,
    ) -> HighlightPlan {
        self.cancel(timers);

        let chars: Vec<CharReveal> = highlight_text
            .chars()
            .enumerate()
            .map(|(i, ch)| CharReveal {
                ch: if ch == ' ' { '\u{a0}' } else { ch },
                delay_ms: (STAGGER_DELAY * i as u32).as_millis() as u64,
            })
            .collect();
        let total = total_duration(chars.len());

        timers.schedule(TimerKind::HighlightStart, now + START_DELAY);
        timers.schedule(TimerKind::HighlightComplete, now + total);
        self.state = AnimatorState::Pending;

        HighlightPlan {
            text_before: text_before.to_string(),
            chars,
            transition_ms: CHAR_TRANSITION.as_millis() as u64,
            total_ms: total.as_millis() as u64,
        }
    }

    /// The start delay elapsed.
    pub fn begin_wave(&mut self) -> bool {
        if self.state == AnimatorState::Pending {
            self.state = AnimatorState::Animating;
            true
        } else {
            false
        }
    }

    /// The completion timer fired; focus goes back to the end of the document.
    pub fn complete(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = AnimatorState::Inactive;
        was_active
    }

    /// Stops the animation and clears its timers.
    pub fn cancel(&mut self, timers: &mut Timers) {
        timers.cancel(TimerKind::HighlightStart);
        timers.cancel(TimerKind::HighlightComplete);
        self.state = AnimatorState::Inactive;
    }
}
