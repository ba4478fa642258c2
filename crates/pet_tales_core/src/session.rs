//! crates/pet_tales_core/src/session.rs
//!
//! The writing session: the single owner of the editor state for one connected
//! writer. Everything that happens to the editor is an [`Action`]; everything the
//! outside world has to do in response is an [`Effect`]. Timers live on the
//! session's virtual clock and are fired through [`WritingSession::advance`].
//!
//! Every content mutation (typing, images, accepted suggestions) goes through
//! `commit_content`, which recomputes the word count, updates the chapter and feeds
//! both the save coordinator and the cadence controller.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::animator::{HighlightAnimator, HighlightPlan};
use crate::cadence::{
    CadenceController, CycleProgress, FetchOutcome, SUGGESTIONS_FAILED_MESSAGE,
};
use crate::clock::{TimerKind, Timers};
use crate::domain::{
    sort_chapters, Chapter, ImagePayload, Notification, Owner, PetProfile, SaveStatus,
};
use crate::onboarding::OnboardingStep;
use crate::save::{SaveCoordinator, SaveRequest};
use crate::settings::EditorSettings;
use crate::surface::{DocumentSurface, ImageToolbar, SelectionRange};

/// Everything that can happen to a writing session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The writer changed the text directly.
    ContentEdited { content: String },
    SelectionChanged(SelectionRange),
    /// Embed an image (a `data:` URL or a link) at the last selection.
    InsertImage { src: String },
    SelectImage { image_id: String, top: f64, left: f64 },
    DismissImageToolbar,
    RotateImage,
    DeleteImage,
    /// Accept suggestion 0 or 1 (keys "1" and "2").
    SelectSuggestion(usize),
    /// Dismiss the suggestions (Escape).
    SkipSuggestions,
    SuggestionsReady { request_id: u64, suggestions: Vec<String> },
    SuggestionsFailed { request_id: u64, reason: String },
    SaveFinished { result: Result<(), String> },
    /// The editor lost focus.
    Blur,
    SwitchChapter(Uuid),
    ChapterAdded(Chapter),
    ChapterRenamed { chapter_id: Uuid, name: String },
    ProfileSaved(PetProfile),
    /// The connection is going away.
    Teardown,
}

/// Work the host has to carry out, and state changes it has to show.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FetchSuggestions { request_id: u64, story: String, profile: PetProfile },
    Persist(SaveRequest),
    Notify(Notification),
    /// The authoritative content differs from what the writer's surface shows.
    ContentReplaced { chapter_id: Uuid, content: String },
    ActiveChapterChanged { chapter_id: Uuid, content: String },
    Progress(CycleProgress),
    SaveStatusChanged(SaveStatus),
    LockChanged(bool),
    SuggestionsLoading,
    SuggestionsShown([String; 2]),
    SuggestionsCleared,
    HighlightStarted(HighlightPlan),
    HighlightWave,
    /// The highlight ended; the caret goes to the end of the document.
    HighlightFinished,
    ImageToolbarShown(ImageToolbar),
    ImageToolbarHidden,
    OnboardingChanged(OnboardingStep),
}

/// Chapter list entry sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterSummary {
    pub id: Uuid,
    pub name: String,
    pub word_count: usize,
    pub sort_order: i32,
}

impl From<&Chapter> for ChapterSummary {
    fn from(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id,
            name: chapter.name.clone(),
            word_count: chapter.word_count,
            sort_order: chapter.sort_order,
        }
    }
}

/// Full state for a freshly connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub chapters: Vec<ChapterSummary>,
    pub active_chapter_id: Uuid,
    pub content: String,
    pub progress: CycleProgress,
    pub save_status: SaveStatus,
    pub onboarding: OnboardingStep,
    pub locked: bool,
    pub suggestions_enabled: bool,
}

#[derive(Debug)]
pub struct WritingSession {
    owner: Owner,
    chapters: Vec<Chapter>,
    active: usize,
    profile: PetProfile,
    onboarding: OnboardingStep,
    surface: DocumentSurface,
    cadence: CadenceController,
    animator: HighlightAnimator,
    save: SaveCoordinator,
    timers: Timers,
    next_request_id: u64,
    awaiting: Option<u64>,
    torn_down: bool,
}

impl WritingSession {
    /// A session for a signed-in writer. Returns `None` when there is no chapter
    /// to edit.
    pub fn signed_in(
        user_id: Uuid,
        mut chapters: Vec<Chapter>,
        profile: Option<PetProfile>,
        settings: EditorSettings,
    ) -> Option<Self> {
        if chapters.is_empty() {
            return None;
        }
        sort_chapters(&mut chapters);
        let onboarding = OnboardingStep::initial(profile.as_ref(), &chapters);
        Some(Self::build(
            Owner::User(user_id),
            chapters,
            profile.unwrap_or_default(),
            onboarding,
            settings,
        ))
    }

    /// A signed-out visitor gets one scratch chapter that is never saved and
    /// never triggers suggestions.
    pub fn guest(settings: EditorSettings) -> Self {
        Self::build(
            Owner::Unauthenticated,
            vec![Chapter::placeholder()],
            PetProfile::default(),
            OnboardingStep::Off,
            settings,
        )
    }

    fn build(
        owner: Owner,
        chapters: Vec<Chapter>,
        profile: PetProfile,
        onboarding: OnboardingStep,
        settings: EditorSettings,
    ) -> Self {
        let mut timers = Timers::new();
        let mut cadence = CadenceController::new(
            settings.suggestion_word_trigger,
            settings.suggestion_settle_delay,
        );
        cadence.begin_cycle(&chapters[0].content, &mut timers);

        let mut session = Self {
            owner,
            surface: DocumentSurface::new(chapters[0].content.clone()),
            chapters,
            active: 0,
            profile,
            onboarding,
            cadence,
            animator: HighlightAnimator::default(),
            save: SaveCoordinator::new(settings.save_debounce, settings.saved_reset_delay),
            timers,
            next_request_id: 1,
            awaiting: None,
            torn_down: false,
        };
        session.refresh_gating();
        session
    }

    //-------------------------------------------------------------------------------------
    // Read access
    //-------------------------------------------------------------------------------------

    pub fn active_chapter(&self) -> &Chapter {
        &self.chapters[self.active]
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn profile(&self) -> &PetProfile {
        &self.profile
    }

    pub fn onboarding(&self) -> OnboardingStep {
        self.onboarding
    }

    pub fn cadence(&self) -> &CadenceController {
        &self.cadence
    }

    pub fn surface(&self) -> &DocumentSurface {
        &self.surface
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save.status()
    }

    pub fn is_locked(&self) -> bool {
        self.surface.is_locked()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// When [`advance`](Self::advance) next has something to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            chapters: self.chapters.iter().map(ChapterSummary::from).collect(),
            active_chapter_id: self.active_chapter().id,
            content: self.active_chapter().content.clone(),
            progress: self.cadence.progress(),
            save_status: self.save.status(),
            onboarding: self.onboarding,
            locked: self.is_locked(),
            suggestions_enabled: self.cadence.is_enabled(),
        }
    }

    //-------------------------------------------------------------------------------------
    // Transitions
    //-------------------------------------------------------------------------------------

    /// Applies one action at virtual time `now`.
    pub fn apply(&mut self, action: Action, now: Duration) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.torn_down {
            debug!(?action, "session already torn down, ignoring action");
            return effects;
        }

        match action {
            Action::ContentEdited { content } => self.on_content_edited(content, now, &mut effects),
            Action::SelectionChanged(range) => {
                if !self.surface.record_selection(range) {
                    debug!(?range, "ignoring selection outside the document text");
                }
            }
            Action::InsertImage { src } => self.on_insert_image(src, now, &mut effects),
            Action::SelectImage {
                image_id,
                top,
                left,
            } => match self.surface.select_image(&image_id, top, left) {
                Ok(toolbar) => effects.push(Effect::ImageToolbarShown(toolbar.clone())),
                Err(e) => {
                    debug!(error = %e, "cannot select image");
                    effects.push(Effect::ImageToolbarHidden);
                }
            },
            Action::DismissImageToolbar => {
                if self.surface.dismiss_toolbar() {
                    effects.push(Effect::ImageToolbarHidden);
                }
            }
            Action::RotateImage => match self.surface.rotate_selected() {
                Ok(content) => {
                    self.commit_content(content, now, true, &mut effects);
                    if let Some(toolbar) = self.surface.toolbar() {
                        effects.push(Effect::ImageToolbarShown(toolbar.clone()));
                    }
                }
                Err(e) => debug!(error = %e, "rotate ignored"),
            },
            Action::DeleteImage => match self.surface.delete_selected() {
                Ok(content) => {
                    self.commit_content(content, now, true, &mut effects);
                    effects.push(Effect::ImageToolbarHidden);
                }
                Err(e) => debug!(error = %e, "delete ignored"),
            },
            Action::SelectSuggestion(index) => self.on_accept(index, now, &mut effects),
            Action::SkipSuggestions => {
                let content = self.active_chapter().content.clone();
                if self.cadence.skip(&content) {
                    debug!("suggestions skipped");
                    effects.push(Effect::SuggestionsCleared);
                    effects.push(Effect::Progress(self.cadence.progress()));
                    self.refresh_lock(&mut effects);
                }
            }
            Action::SuggestionsReady {
                request_id,
                suggestions,
            } => {
                if self.take_awaiting(request_id) {
                    match self.cadence.suggestions_loaded(suggestions) {
                        FetchOutcome::Shown(pair) => effects.push(Effect::SuggestionsShown(pair)),
                        FetchOutcome::Malformed => {
                            warn!(request_id, "suggestions came back in an unexpected format");
                            self.fetch_failed(&mut effects);
                        }
                        FetchOutcome::Stale => {}
                    }
                }
            }
            Action::SuggestionsFailed { request_id, reason } => {
                if self.take_awaiting(request_id) && self.cadence.suggestions_failed() {
                    warn!(request_id, %reason, "suggestion request failed");
                    self.fetch_failed(&mut effects);
                }
            }
            Action::SaveFinished { result } => {
                if let Some(note) = self.save.save_finished(result, now, &mut self.timers) {
                    effects.push(Effect::Notify(note));
                }
                effects.push(Effect::SaveStatusChanged(self.save.status()));
            }
            Action::Blur => self.flush(&mut effects),
            Action::SwitchChapter(chapter_id) => {
                match self.chapters.iter().position(|c| c.id == chapter_id) {
                    Some(index) if index != self.active => {
                        self.activate(index, &mut effects)
                    }
                    Some(_) => {}
                    None => warn!(%chapter_id, "switch to unknown chapter"),
                }
            }
            Action::ChapterAdded(chapter) => {
                let id = chapter.id;
                self.chapters.push(chapter);
                sort_chapters(&mut self.chapters);
                let index = self
                    .chapters
                    .iter()
                    .position(|c| c.id == id)
                    .unwrap_or(self.active);
                self.activate(index, &mut effects);
            }
            Action::ChapterRenamed { chapter_id, name } => {
                if let Some(chapter) = self.chapters.iter_mut().find(|c| c.id == chapter_id) {
                    chapter.name = name.clone();
                }
                let step = self.onboarding.chapter_renamed(&name);
                self.set_onboarding(step, &mut effects);
            }
            Action::ProfileSaved(profile) => {
                self.profile = profile;
                effects.push(Effect::Notify(Notification::success("Pet profile saved!")));
                let step = self.onboarding.profile_saved();
                self.set_onboarding(step, &mut effects);
            }
            Action::Teardown => {
                info!(chapter_id = %self.active_chapter().id, "writing session closing");
                self.animator.cancel(&mut self.timers);
                self.flush(&mut effects);
                self.timers.cancel_all();
                self.awaiting = None;
                self.torn_down = true;
            }
        }
        effects
    }

    /// Fires every timer due at `now`.
    pub fn advance(&mut self, now: Duration) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.torn_down {
            return effects;
        }
        for timer in self.timers.take_due(now) {
            match timer {
                TimerKind::SuggestionTrigger => {
                    let content = self.active_chapter().content.clone();
                    if let Some(story) = self.cadence.trigger_fired(&content) {
                        let request_id = self.next_request_id;
                        self.next_request_id += 1;
                        self.awaiting = Some(request_id);
                        info!(request_id, words = self.active_chapter().word_count, "fetching suggestions");
                        effects.push(Effect::SuggestionsLoading);
                        effects.push(Effect::FetchSuggestions {
                            request_id,
                            story,
                            profile: self.profile.clone(),
                        });
                        effects.push(Effect::Progress(self.cadence.progress()));
                        self.refresh_lock(&mut effects);
                    }
                }
                TimerKind::Save => {
                    if let Some(request) = self.save.save_due() {
                        self.issue_save(request, &mut effects);
                    }
                }
                TimerKind::SaveStatusReset => {
                    if self.save.status_reset_fired() {
                        effects.push(Effect::SaveStatusChanged(self.save.status()));
                    }
                }
                TimerKind::HighlightStart => {
                    if self.animator.begin_wave() {
                        effects.push(Effect::HighlightWave);
                    }
                }
                TimerKind::HighlightComplete => {
                    if self.animator.complete() {
                        let end = self.surface.content().len();
                        self.surface.record_selection(SelectionRange::collapsed(end));
                        effects.push(Effect::HighlightFinished);
                        self.refresh_lock(&mut effects);
                    }
                }
            }
        }
        effects
    }

    //-------------------------------------------------------------------------------------
    // Internals
    //-------------------------------------------------------------------------------------

    fn on_content_edited(&mut self, content: String, now: Duration, effects: &mut Vec<Effect>) {
        let edited = self.surface.edit(content).map(str::to_string);
        match edited {
            Ok(accepted) => self.commit_content(accepted, now, false, effects),
            Err(e) => {
                debug!(error = %e, "edit rejected, restoring content");
                let chapter = self.active_chapter();
                effects.push(Effect::ContentReplaced {
                    chapter_id: chapter.id,
                    content: chapter.content.clone(),
                });
            }
        }
    }

    fn on_insert_image(&mut self, src: String, now: Duration, effects: &mut Vec<Effect>) {
        if src.starts_with("data:")
            && !ImagePayload::from_data_url(&src).is_some_and(|p| p.is_image())
        {
            effects.push(Effect::Notify(Notification::error(
                "Please select a valid image file.",
            )));
            return;
        }
        let inserted = self.surface.insert_image(&src);
        debug!(image_id = %inserted.image_id, "image inserted");
        self.commit_content(inserted.content, now, true, effects);
    }

    fn on_accept(&mut self, index: usize, now: Duration, effects: &mut Vec<Effect>) {
        let current = self.active_chapter().content.clone();
        let Some(acceptance) = self.cadence.accept(index, &current) else {
            return;
        };
        info!(index, "suggestion accepted");
        effects.push(Effect::SuggestionsCleared);
        self.commit_content(acceptance.content, now, true, effects);
        let plan = self.animator.start(
            &acceptance.highlight_text,
            &acceptance.text_before,
            now,
            &mut self.timers,
        );
        effects.push(Effect::HighlightStarted(plan));
        self.refresh_lock(effects);
    }

    /// The one path every content change takes.
    fn commit_content(
        &mut self,
        content: String,
        now: Duration,
        replace_surface: bool,
        effects: &mut Vec<Effect>,
    ) {
        self.surface.sync_from_state(&content);
        let chapter = &mut self.chapters[self.active];
        chapter.set_content(content);

        let before = self.save.status();
        self.save.content_changed(chapter, now, &mut self.timers);
        if self.save.status() != before {
            effects.push(Effect::SaveStatusChanged(self.save.status()));
        }

        self.cadence
            .content_changed(&chapter.content, now, &mut self.timers);
        if replace_surface {
            effects.push(Effect::ContentReplaced {
                chapter_id: chapter.id,
                content: chapter.content.clone(),
            });
        }
        effects.push(Effect::Progress(self.cadence.progress()));
    }

    fn fetch_failed(&mut self, effects: &mut Vec<Effect>) {
        effects.push(Effect::Notify(Notification::error(SUGGESTIONS_FAILED_MESSAGE)));
        effects.push(Effect::SuggestionsCleared);
        effects.push(Effect::Progress(self.cadence.progress()));
        self.refresh_lock(effects);
    }

    fn take_awaiting(&mut self, request_id: u64) -> bool {
        if self.awaiting == Some(request_id) {
            self.awaiting = None;
            true
        } else {
            debug!(request_id, "dropping stale suggestion result");
            false
        }
    }

    fn flush(&mut self, effects: &mut Vec<Effect>) {
        if let Some(request) = self.save.flush(&mut self.timers) {
            self.issue_save(request, effects);
        }
    }

    fn issue_save(&mut self, request: SaveRequest, effects: &mut Vec<Effect>) {
        let step = self.onboarding.content_saved(request.word_count);
        effects.push(Effect::SaveStatusChanged(self.save.status()));
        effects.push(Effect::Persist(request));
        self.set_onboarding(step, effects);
    }

    /// Makes chapter `index` the active document.
    fn activate(&mut self, index: usize, effects: &mut Vec<Effect>) {
        self.flush(effects);

        let was_suggesting = self.cadence.is_locked();
        if self.animator.is_active() {
            self.animator.cancel(&mut self.timers);
            effects.push(Effect::HighlightFinished);
        }
        self.awaiting = None;
        self.active = index;

        let chapter = &self.chapters[index];
        debug!(chapter_id = %chapter.id, "switching chapter");
        self.cadence.begin_cycle(&chapter.content, &mut self.timers);
        let locked = self.surface.is_locked();
        self.surface = DocumentSurface::new(chapter.content.clone());
        self.surface.set_locked(locked);

        if was_suggesting {
            effects.push(Effect::SuggestionsCleared);
        }
        effects.push(Effect::ImageToolbarHidden);
        effects.push(Effect::ActiveChapterChanged {
            chapter_id: chapter.id,
            content: chapter.content.clone(),
        });
        effects.push(Effect::Progress(self.cadence.progress()));
        self.refresh_lock(effects);
    }

    fn set_onboarding(&mut self, step: OnboardingStep, effects: &mut Vec<Effect>) {
        if step != self.onboarding {
            info!(from = ?self.onboarding, to = ?step, "onboarding step changed");
            self.onboarding = step;
            effects.push(Effect::OnboardingChanged(step));
            self.refresh_gating();
        }
    }

    /// Suggestions only run for signed-in writers who can see the real editor.
    fn refresh_gating(&mut self) {
        let enabled =
            matches!(self.owner, Owner::User(_)) && self.onboarding.editor_visible();
        self.cadence.set_enabled(enabled, &mut self.timers);
    }

    fn refresh_lock(&mut self, effects: &mut Vec<Effect>) {
        let locked = self.cadence.is_locked() || self.animator.is_active();
        if locked != self.surface.is_locked() {
            self.surface.set_locked(locked);
            effects.push(Effect::LockChanged(locked));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CadencePhase;
    use crate::domain::NotificationKind;
    use crate::surface::image_rotation;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| ((b'a' + (i % 26) as u8) as char).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn profile() -> PetProfile {
        PetProfile {
            pet_type: "Dog".into(),
            name: "Rex".into(),
            ..Default::default()
        }
    }

    fn session_with(content: &str) -> WritingSession {
        let user = Uuid::new_v4();
        let mut chapter = Chapter::new(user, "The Park", 0);
        chapter.set_content(content.to_string());
        WritingSession::signed_in(user, vec![chapter], Some(profile()), EditorSettings::default())
            .unwrap()
    }

    fn fetches(effects: &[Effect]) -> Vec<(u64, String)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::FetchSuggestions {
                    request_id, story, ..
                } => Some((*request_id, story.clone())),
                _ => None,
            })
            .collect()
    }

    fn persisted(effects: &[Effect]) -> Vec<SaveRequest> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Persist(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn errors(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Notify(n) if n.kind == NotificationKind::Error))
            .count()
    }

    /// Types `n` words one at a time, 100 ms apart, advancing the clock as it goes.
    fn type_words(session: &mut WritingSession, n: usize, mut t: u64) -> (Vec<Effect>, u64) {
        let mut all = Vec::new();
        for i in 1..=n {
            t += 100;
            all.extend(session.apply(Action::ContentEdited { content: words(i) }, ms(t)));
            all.extend(session.advance(ms(t)));
        }
        (all, t)
    }

    #[test]
    fn happy_path_from_empty_document_to_accepted_suggestion() {
        let mut session = session_with("");
        let (effects, t) = type_words(&mut session, 24, 0);
        assert!(fetches(&effects).is_empty());
        assert_eq!(session.cadence().cycle_word_count(), 24);

        // Nothing before the settle delay has passed.
        assert!(fetches(&session.advance(ms(t + 749))).is_empty());
        let effects = session.advance(ms(t + 750));
        let requested = fetches(&effects);
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[0].1, words(24));
        assert!(session.is_locked());
        assert!(effects.contains(&Effect::LockChanged(true)));

        let effects = session.apply(
            Action::SuggestionsReady {
                request_id: requested[0].0,
                suggestions: vec!["and the sun came out.".into(), "then it rained.".into()],
            },
            ms(t + 900),
        );
        assert!(matches!(effects.as_slice(), [Effect::SuggestionsShown(_)]));

        // Typing is rejected while the suggestions are up.
        let effects = session.apply(
            Action::ContentEdited {
                content: format!("{} zzz", words(24)),
            },
            ms(t + 950),
        );
        assert!(matches!(effects.as_slice(), [Effect::ContentReplaced { .. }]));
        assert_eq!(session.active_chapter().content, words(24));

        let effects = session.apply(Action::SelectSuggestion(0), ms(t + 1000));
        let expected = format!("{} and the sun came out. ", words(24));
        assert_eq!(session.active_chapter().content, expected);
        assert_eq!(session.cadence().phase(), &CadencePhase::Idle);
        assert_eq!(session.cadence().cycle_word_count(), 0);
        let plan = effects
            .iter()
            .find_map(|e| match e {
                Effect::HighlightStarted(plan) => Some(plan.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(plan.text_before, "");
        assert!(session.is_locked());

        // The highlight ends and editing resumes.
        let end = t + 1000 + plan.total_ms;
        let effects = session.advance(ms(end));
        assert!(effects.contains(&Effect::HighlightFinished));
        assert!(effects.contains(&Effect::LockChanged(false)));
        assert!(!session.is_locked());
        assert_eq!(
            session.surface().selection(),
            Some(SelectionRange::collapsed(expected.len()))
        );
    }

    #[test]
    fn provider_failure_leaves_the_document_alone() {
        let mut session = session_with("");
        let (_, t) = type_words(&mut session, 24, 0);
        let request_id = fetches(&session.advance(ms(t + 750)))[0].0;
        let before = session.active_chapter().content.clone();

        let effects = session.apply(
            Action::SuggestionsFailed {
                request_id,
                reason: "network down".into(),
            },
            ms(t + 800),
        );
        assert_eq!(errors(&effects), 1);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::ContentReplaced { .. })));
        assert_eq!(session.active_chapter().content, before);
        assert_eq!(session.cadence().phase(), &CadencePhase::Idle);
        assert!(!session.is_locked());

        // The writer keeps typing towards the next threshold.
        let effects = session.apply(
            Action::ContentEdited {
                content: format!("{} more", before),
            },
            ms(t + 900),
        );
        assert_eq!(session.cadence().cycle_word_count(), 1);
        assert!(effects.iter().any(|e| matches!(e, Effect::Progress(_))));
    }

    #[test]
    fn malformed_results_count_as_a_failure() {
        let mut session = session_with("");
        let (_, t) = type_words(&mut session, 24, 0);
        let request_id = fetches(&session.advance(ms(t + 750)))[0].0;
        let effects = session.apply(
            Action::SuggestionsReady {
                request_id,
                suggestions: vec!["just one".into()],
            },
            ms(t + 800),
        );
        assert_eq!(errors(&effects), 1);
        assert!(!session.is_locked());
    }

    #[test]
    fn stale_results_are_dropped_after_a_chapter_switch() {
        let user = Uuid::new_v4();
        let first = Chapter::new(user, "One", 0);
        let second = Chapter::new(user, "Two", 1);
        let second_id = second.id;
        let mut session = WritingSession::signed_in(
            user,
            vec![first, second],
            Some(profile()),
            EditorSettings::default(),
        )
        .unwrap();

        let (_, t) = type_words(&mut session, 24, 0);
        let request_id = fetches(&session.advance(ms(t + 750)))[0].0;
        let effects = session.apply(Action::SwitchChapter(second_id), ms(t + 800));
        assert_eq!(persisted(&effects).len(), 1);
        assert!(effects.contains(&Effect::SuggestionsCleared));
        assert!(!session.is_locked());

        let effects = session.apply(
            Action::SuggestionsReady {
                request_id,
                suggestions: vec!["a b".into(), "c d".into()],
            },
            ms(t + 900),
        );
        assert!(effects.is_empty());
        assert_eq!(session.active_chapter().id, second_id);
    }

    #[test]
    fn rapid_typing_saves_once_with_the_latest_content() {
        let mut session = session_with("");
        let (effects, t) = type_words(&mut session, 5, 0);
        assert!(persisted(&effects).is_empty());
        let effects = session.advance(ms(t + 1500));
        let saves = persisted(&effects);
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].content, words(5));
        assert_eq!(saves[0].word_count, 5);
        assert!(effects.contains(&Effect::SaveStatusChanged(SaveStatus::Saving)));

        let effects = session.apply(Action::SaveFinished { result: Ok(()) }, ms(t + 1600));
        assert!(effects.contains(&Effect::SaveStatusChanged(SaveStatus::Saved)));
        let effects = session.advance(ms(t + 3600));
        assert!(effects.contains(&Effect::SaveStatusChanged(SaveStatus::Idle)));
    }

    #[test]
    fn failed_save_notifies_and_keeps_local_content() {
        let mut session = session_with("");
        session.apply(Action::ContentEdited { content: "Rex".into() }, ms(0));
        session.apply(Action::Blur, ms(10));
        let effects = session.apply(
            Action::SaveFinished {
                result: Err("timeout".into()),
            },
            ms(20),
        );
        assert_eq!(errors(&effects), 1);
        assert_eq!(session.save_status(), SaveStatus::Idle);
        assert_eq!(session.active_chapter().content, "Rex");
    }

    #[test]
    fn images_flow_through_the_same_save_path() {
        let mut session = session_with("Rex");
        let effects = session.apply(
            Action::InsertImage {
                src: "data:image/png;base64,AAAA".into(),
            },
            ms(0),
        );
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ContentReplaced { .. })));
        let content = session.active_chapter().content.clone();
        let image_id = crate::surface::image_ids(&content).remove(0);

        session.apply(
            Action::SelectImage {
                image_id: image_id.clone(),
                top: 5.0,
                left: 5.0,
            },
            ms(100),
        );
        session.apply(Action::RotateImage, ms(200));
        let saves = persisted(&session.advance(ms(1700)));
        assert_eq!(saves.len(), 1);
        assert_eq!(image_rotation(&saves[0].content, &image_id), Some(90));
        assert_eq!(session.active_chapter().word_count, 1);

        let effects = session.apply(Action::DeleteImage, ms(1800));
        assert!(effects.contains(&Effect::ImageToolbarHidden));
        assert_eq!(session.active_chapter().content, "Rex");
    }

    #[test]
    fn images_can_be_inserted_while_locked() {
        let mut session = session_with("");
        let (_, t) = type_words(&mut session, 24, 0);
        session.advance(ms(t + 750));
        assert!(session.is_locked());
        session.apply(
            Action::InsertImage {
                src: "https://example.com/rex.jpg".into(),
            },
            ms(t + 800),
        );
        assert!(session.active_chapter().content.contains("<figure"));
    }

    #[test]
    fn non_image_data_is_rejected() {
        let mut session = session_with("Rex");
        let effects = session.apply(
            Action::InsertImage {
                src: "data:text/plain;base64,AAAA".into(),
            },
            ms(0),
        );
        assert_eq!(errors(&effects), 1);
        assert_eq!(session.active_chapter().content, "Rex");
    }

    #[test]
    fn guests_never_save_or_fetch() {
        let mut session = WritingSession::guest(EditorSettings::default());
        let (mut effects, t) = type_words(&mut session, 30, 0);
        effects.extend(session.advance(ms(t + 5000)));
        effects.extend(session.apply(Action::Teardown, ms(t + 5001)));
        assert!(persisted(&effects).is_empty());
        assert!(fetches(&effects).is_empty());
        assert!(!session.snapshot().suggestions_enabled);
    }

    #[test]
    fn onboarding_gates_suggestions() {
        let user = Uuid::new_v4();
        let chapter = Chapter::new(user, Chapter::FIRST_CHAPTER_NAME, 0);
        let chapter_id = chapter.id;
        let mut session =
            WritingSession::signed_in(user, vec![chapter], None, EditorSettings::default())
                .unwrap();
        assert_eq!(session.onboarding(), OnboardingStep::PetProfile);
        assert!(!session.cadence().is_enabled());

        let effects = session.apply(Action::ProfileSaved(profile()), ms(0));
        assert!(effects.contains(&Effect::OnboardingChanged(OnboardingStep::ChapterTitle)));
        assert!(!session.cadence().is_enabled());

        session.apply(
            Action::ChapterRenamed {
                chapter_id,
                name: "Day One".into(),
            },
            ms(1),
        );
        assert_eq!(session.onboarding(), OnboardingStep::FirstWords);
        assert!(session.cadence().is_enabled());

        session.apply(Action::ContentEdited { content: "Rex".into() }, ms(2));
        let effects = session.apply(Action::Blur, ms(3));
        assert!(effects.contains(&Effect::OnboardingChanged(OnboardingStep::Complete)));
    }

    #[test]
    fn added_chapters_become_active() {
        let mut session = session_with("Rex");
        let user = match session.active_chapter().owner {
            Owner::User(id) => id,
            Owner::Unauthenticated => unreachable!(),
        };
        let chapter = Chapter::new(user, "Chapter 2", 1);
        let id = chapter.id;
        let effects = session.apply(Action::ChapterAdded(chapter), ms(0));
        assert_eq!(session.active_chapter().id, id);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ActiveChapterChanged { chapter_id, .. } if *chapter_id == id)));
        assert_eq!(session.chapters().len(), 2);
    }

    #[test]
    fn teardown_flushes_and_stops_everything() {
        let mut session = session_with("");
        session.apply(Action::ContentEdited { content: "Rex ran".into() }, ms(0));
        let effects = session.apply(Action::Teardown, ms(10));
        let saves = persisted(&effects);
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].content, "Rex ran");
        assert_eq!(session.next_deadline(), None);
        assert!(session.is_torn_down());
        assert!(session
            .apply(Action::ContentEdited { content: "late".into() }, ms(20))
            .is_empty());
    }

    #[test]
    fn skip_unlocks_and_restarts_the_cycle() {
        let mut session = session_with("");
        let (_, t) = type_words(&mut session, 24, 0);
        let request_id = fetches(&session.advance(ms(t + 750)))[0].0;
        session.apply(
            Action::SuggestionsReady {
                request_id,
                suggestions: vec!["one".into(), "two".into()],
            },
            ms(t + 800),
        );
        let effects = session.apply(Action::SkipSuggestions, ms(t + 900));
        assert!(effects.contains(&Effect::SuggestionsCleared));
        assert!(effects.contains(&Effect::LockChanged(false)));
        assert_eq!(session.active_chapter().content, words(24));
        assert_eq!(session.cadence().cycle_start(), words(24));
    }
}
