//! crates/pet_tales_core/src/cadence.rs
//!
//! The suggestion cadence controller: decides when to interrupt the writer with
//! AI continuations, based on how many words were typed since the last cycle.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::clock::{TimerKind, Timers};
use crate::text::{plain_text, word_count};

/// Words typed in one cycle before suggestions are fetched.
pub const SUGGESTION_WORD_TRIGGER: usize = 24;

/// Quiet period after the threshold is crossed, so a typing burst finishes first.
pub const SUGGESTION_SETTLE_DELAY: Duration = Duration::from_millis(750);

/// Shown when the provider fails or answers in an unexpected shape.
pub const SUGGESTIONS_FAILED_MESSAGE: &str =
    "Could not get AI suggestions. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadencePhase {
    /// Counting words; a trigger may be pending on the timer table.
    Idle,
    /// Editor locked, one request in flight.
    Fetching,
    /// Two continuations on screen, editor locked until one is chosen or skipped.
    Suggesting([String; 2]),
}

/// Colour band of the word-count indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressTone {
    Normal,
    NearTrigger,
    Triggered,
}

/// Progress of the current cycle towards the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleProgress {
    pub count: usize,
    pub threshold: usize,
    pub tone: ProgressTone,
}

/// What happened to a batch of fetched suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Shown([String; 2]),
    /// Fewer than two usable strings came back.
    Malformed,
    /// No fetch was in flight (the cycle was reset meanwhile).
    Stale,
}

/// Result of accepting a suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acceptance {
    /// The new chapter content, with a trailing space for the caret.
    pub content: String,
    /// Text typed during the cycle followed by the chosen suggestion.
    pub highlight_text: String,
    /// Content as it was when the cycle started.
    pub text_before: String,
}

#[derive(Debug, Clone)]
pub struct CadenceController {
    threshold: usize,
    settle_delay: Duration,
    phase: CadencePhase,
    enabled: bool,
    cycle_word_count: usize,
    /// Content when suggestions were last fetched, accepted or skipped.
    last_triggered: String,
    /// Content when the current cycle began; the animator highlights what follows it.
    cycle_start: String,
}

impl Default for CadenceController {
    fn default() -> Self {
        Self::new(SUGGESTION_WORD_TRIGGER, SUGGESTION_SETTLE_DELAY)
    }
}

impl CadenceController {
    pub fn new(threshold: usize, settle_delay: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            settle_delay,
            phase: CadencePhase::Idle,
            enabled: true,
            cycle_word_count: 0,
            last_triggered: String::new(),
            cycle_start: String::new(),
        }
    }

    pub fn phase(&self) -> &CadencePhase {
        &self.phase
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn cycle_word_count(&self) -> usize {
        self.cycle_word_count
    }

    pub fn cycle_start(&self) -> &str {
        &self.cycle_start
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The editor is locked while a cycle is being resolved.
    pub fn is_locked(&self) -> bool {
        !matches!(self.phase, CadencePhase::Idle)
    }

    pub fn suggestions(&self) -> Option<&[String; 2]> {
        match &self.phase {
            CadencePhase::Suggesting(s) => Some(s),
            _ => None,
        }
    }

    pub fn progress(&self) -> CycleProgress {
        let count = self.cycle_word_count;
        let tone = if self.is_locked() || count >= self.threshold {
            ProgressTone::Triggered
        } else if count + 2 >= self.threshold {
            ProgressTone::NearTrigger
        } else {
            ProgressTone::Normal
        };
        CycleProgress {
            count,
            threshold: self.threshold,
            tone,
        }
    }

    /// Starts a fresh cycle for a newly activated document.
    pub fn begin_cycle(&mut self, content: &str, timers: &mut Timers) {
        timers.cancel(TimerKind::SuggestionTrigger);
        self.phase = CadencePhase::Idle;
        self.last_triggered = content.to_string();
        self.cycle_start = content.to_string();
        self.cycle_word_count = 0;
    }

    /// Turns triggering on or off. Disabling drops any pending trigger.
    pub fn set_enabled(&mut self, enabled: bool, timers: &mut Timers) {
        self.enabled = enabled;
        if !enabled {
            timers.cancel(TimerKind::SuggestionTrigger);
        }
    }

    /// Recomputes the cycle count for `content` and (re)schedules the trigger.
    pub fn content_changed(&mut self, content: &str, now: Duration, timers: &mut Timers) {
        timers.cancel(TimerKind::SuggestionTrigger);

        let words = word_count(content);
        let count = if words == 0 {
            self.last_triggered.clear();
            self.cycle_start.clear();
            0
        } else {
            words.saturating_sub(word_count(&self.last_triggered))
        };
        self.cycle_word_count = count;

        if count >= self.threshold && self.enabled && self.phase == CadencePhase::Idle {
            debug!(count, "suggestion threshold reached, settling");
            timers.schedule(TimerKind::SuggestionTrigger, now + self.settle_delay);
        }
    }

    /// Called when the settle delay elapses. Returns the content to send to the
    /// suggestion provider, or `None` when a cycle is already being resolved.
    pub fn trigger_fired(&mut self, content: &str) -> Option<String> {
        if !self.enabled || self.phase != CadencePhase::Idle {
            return None;
        }
        self.phase = CadencePhase::Fetching;
        self.last_triggered = content.to_string();
        Some(content.to_string())
    }

    /// Applies the provider's answer.
    pub fn suggestions_loaded(&mut self, suggestions: Vec<String>) -> FetchOutcome {
        if self.phase != CadencePhase::Fetching {
            return FetchOutcome::Stale;
        }
        let mut usable = suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        match (usable.next(), usable.next()) {
            (Some(first), Some(second)) => {
                let pair = [first, second];
                self.phase = CadencePhase::Suggesting(pair.clone());
                FetchOutcome::Shown(pair)
            }
            _ => {
                self.reset();
                FetchOutcome::Malformed
            }
        }
    }

    /// The provider failed; the cycle ends without touching the document.
    /// Returns `false` when no fetch was in flight.
    pub fn suggestions_failed(&mut self) -> bool {
        if self.phase != CadencePhase::Fetching {
            return false;
        }
        self.reset();
        true
    }

    /// Accepts suggestion `index` (0 or 1) against the current `content`.
    pub fn accept(&mut self, index: usize, content: &str) -> Option<Acceptance> {
        let suggestion = self.suggestions()?.get(index)?.clone();

        let text_before = self.cycle_start.clone();
        let typed = plain_text(typed_since(&text_before, content))
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let highlight_text = if typed.is_empty() {
            suggestion.clone()
        } else {
            format!("{} {}", typed, suggestion)
        };

        let accepted = format!("{} {}", content, suggestion);
        self.last_triggered = accepted.clone();
        self.cycle_start = accepted.clone();
        self.reset();

        Some(Acceptance {
            content: format!("{} ", accepted),
            highlight_text,
            text_before,
        })
    }

    /// Dismisses the suggestions; the next cycle starts at `content`.
    pub fn skip(&mut self, content: &str) -> bool {
        if self.suggestions().is_none() {
            return false;
        }
        self.last_triggered = content.to_string();
        self.cycle_start = content.to_string();
        self.reset();
        true
    }

    fn reset(&mut self) {
        self.phase = CadencePhase::Idle;
        self.cycle_word_count = 0;
    }
}

/// The part of `current` written after `start`. When earlier text was edited the
/// shared prefix is used instead.
fn typed_since<'a>(start: &str, current: &'a str) -> &'a str {
    if let Some(rest) = current.strip_prefix(start) {
        return rest;
    }
    let shared = start
        .char_indices()
        .zip(current.chars())
        .find(|((_, a), b)| a != b)
        .map(|((i, _), _)| i)
        .unwrap_or(start.len().min(current.len()));
    &current[shared..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn trigger_is_scheduled_exactly_when_threshold_is_reached() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        for n in 1..SUGGESTION_WORD_TRIGGER {
            cadence.content_changed(&words(n), ms(n as u64), &mut timers);
            assert!(!timers.is_scheduled(TimerKind::SuggestionTrigger), "fired early at {}", n);
        }
        cadence.content_changed(&words(24), ms(100), &mut timers);
        assert_eq!(timers.deadline(TimerKind::SuggestionTrigger), Some(ms(850)));
        assert_eq!(cadence.cycle_word_count(), 24);
    }

    #[test]
    fn further_typing_pushes_the_trigger_back() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.content_changed(&words(24), ms(0), &mut timers);
        cadence.content_changed(&words(25), ms(500), &mut timers);
        assert!(timers.take_due(ms(750)).is_empty());
        assert_eq!(timers.take_due(ms(1250)), vec![TimerKind::SuggestionTrigger]);
    }

    #[test]
    fn clearing_the_document_resets_the_cycle() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.begin_cycle(&words(10), &mut timers);
        cadence.content_changed(&words(15), ms(0), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 5);
        cadence.content_changed("", ms(1), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 0);
        assert_eq!(cadence.cycle_start(), "");
        // Counting restarts from zero rather than going negative.
        cadence.content_changed("fresh start", ms(2), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 2);
    }

    #[test]
    fn deleting_words_never_goes_negative() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.begin_cycle(&words(10), &mut timers);
        cadence.content_changed(&words(3), ms(0), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 0);
    }

    #[test]
    fn crossings_are_ignored_while_a_cycle_is_open() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.content_changed(&words(24), ms(0), &mut timers);
        assert!(cadence.trigger_fired(&words(24)).is_some());
        assert!(cadence.is_locked());
        cadence.content_changed(&words(60), ms(10), &mut timers);
        assert!(!timers.is_scheduled(TimerKind::SuggestionTrigger));
        assert!(cadence.trigger_fired(&words(60)).is_none());
    }

    #[test]
    fn disabled_controller_never_triggers() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.set_enabled(false, &mut timers);
        cadence.content_changed(&words(30), ms(0), &mut timers);
        assert!(!timers.is_scheduled(TimerKind::SuggestionTrigger));
        assert!(cadence.trigger_fired(&words(30)).is_none());
    }

    #[test]
    fn fewer_than_two_suggestions_is_treated_as_failure() {
        let mut cadence = CadenceController::default();
        cadence.trigger_fired("text");
        let outcome = cadence.suggestions_loaded(vec!["only one".into(), "  ".into()]);
        assert_eq!(outcome, FetchOutcome::Malformed);
        assert_eq!(cadence.phase(), &CadencePhase::Idle);
    }

    #[test]
    fn extra_suggestions_are_truncated_to_two() {
        let mut cadence = CadenceController::default();
        cadence.trigger_fired("text");
        let outcome =
            cadence.suggestions_loaded(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(outcome, FetchOutcome::Shown(["a".into(), "b".into()]));
    }

    #[test]
    fn late_results_after_a_reset_are_stale() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.trigger_fired("text");
        cadence.begin_cycle("other chapter", &mut timers);
        assert_eq!(
            cadence.suggestions_loaded(vec!["a".into(), "b".into()]),
            FetchOutcome::Stale
        );
        assert!(!cadence.suggestions_failed());
    }

    #[test]
    fn accepting_appends_one_space_and_advances_the_marker() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.begin_cycle("Rex woke up.", &mut timers);
        let content = "Rex woke up. He stretched";
        cadence.trigger_fired(content);
        cadence.suggestions_loaded(vec!["and yawned.".into(), "then barked.".into()]);

        let acceptance = cadence.accept(1, content).unwrap();
        assert_eq!(acceptance.content, "Rex woke up. He stretched then barked. ");
        assert_eq!(acceptance.highlight_text, "He stretched then barked.");
        assert_eq!(acceptance.text_before, "Rex woke up.");
        assert_eq!(cadence.cycle_start(), "Rex woke up. He stretched then barked.");
        assert_eq!(cadence.phase(), &CadencePhase::Idle);
        assert_eq!(cadence.cycle_word_count(), 0);

        // The trailing caret space does not count towards the next cycle.
        cadence.content_changed(&acceptance.content, ms(0), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 0);
    }

    #[test]
    fn accept_requires_open_suggestions() {
        let mut cadence = CadenceController::default();
        assert!(cadence.accept(0, "text").is_none());
        assert!(!cadence.skip("text"));
    }

    #[test]
    fn skip_restarts_the_cycle_at_current_content() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        let content = words(24);
        cadence.trigger_fired(&content);
        cadence.suggestions_loaded(vec!["a".into(), "b".into()]);
        assert!(cadence.skip(&content));
        assert_eq!(cadence.cycle_start(), content);
        cadence.content_changed(&words(25), ms(0), &mut timers);
        assert_eq!(cadence.cycle_word_count(), 1);
    }

    #[test]
    fn progress_tone_follows_the_count() {
        let mut cadence = CadenceController::default();
        let mut timers = Timers::new();
        cadence.content_changed(&words(21), ms(0), &mut timers);
        assert_eq!(cadence.progress().tone, ProgressTone::Normal);
        cadence.content_changed(&words(22), ms(0), &mut timers);
        assert_eq!(cadence.progress().tone, ProgressTone::NearTrigger);
        cadence.content_changed(&words(24), ms(0), &mut timers);
        assert_eq!(cadence.progress().tone, ProgressTone::Triggered);
    }

    #[test]
    fn typed_since_falls_back_to_shared_prefix() {
        assert_eq!(typed_since("abc", "abc def"), " def");
        assert_eq!(typed_since("abX", "abc def"), "c def");
        assert_eq!(typed_since("", "all new"), "all new");
    }
}
