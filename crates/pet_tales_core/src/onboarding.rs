//! crates/pet_tales_core/src/onboarding.rs
//!
//! Guided first-run steps for a new account.

use serde::Serialize;

use crate::domain::{Chapter, PetProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    /// Signed out, nothing to guide.
    Off,
    PetProfile,
    ChapterTitle,
    FirstWords,
    Complete,
}

impl OnboardingStep {
    pub fn number(&self) -> u8 {
        match self {
            OnboardingStep::Off => 0,
            OnboardingStep::PetProfile => 1,
            OnboardingStep::ChapterTitle => 2,
            OnboardingStep::FirstWords => 3,
            OnboardingStep::Complete => 4,
        }
    }

    /// Where a signed-in writer resumes, derived from what they already have.
    /// `chapters` must be in sort order.
    pub fn initial(profile: Option<&PetProfile>, chapters: &[Chapter]) -> Self {
        let first = chapters.first();
        let has_profile = profile.is_some_and(PetProfile::has_pet_type);
        let has_named_chapter = first.is_some_and(|c| {
            c.name != Chapter::FIRST_CHAPTER_NAME && !c.name.trim().is_empty()
        });
        let has_words = first.is_some_and(|c| c.word_count > 0);

        if !has_profile {
            OnboardingStep::PetProfile
        } else if !has_named_chapter {
            OnboardingStep::ChapterTitle
        } else if !has_words {
            OnboardingStep::FirstWords
        } else {
            OnboardingStep::Complete
        }
    }

    pub fn profile_saved(self) -> Self {
        match self {
            OnboardingStep::PetProfile => OnboardingStep::ChapterTitle,
            other => other,
        }
    }

    pub fn chapter_renamed(self, name: &str) -> Self {
        match self {
            OnboardingStep::ChapterTitle if !name.trim().is_empty() => OnboardingStep::FirstWords,
            other => other,
        }
    }

    pub fn content_saved(self, word_count: usize) -> Self {
        match self {
            OnboardingStep::FirstWords if word_count > 0 => OnboardingStep::Complete,
            other => other,
        }
    }

    /// Whether the real editor is shown. The profile and chapter-title steps
    /// replace it with guidance, so suggestions cannot trigger there.
    pub fn editor_visible(&self) -> bool {
        !matches!(
            self,
            OnboardingStep::PetProfile | OnboardingStep::ChapterTitle
        )
    }
}
