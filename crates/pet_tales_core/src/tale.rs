//! crates/pet_tales_core/src/tale.rs
//!
//! Shareable tales built from the whole story.

use serde::Serialize;
use tracing::debug;

use crate::domain::{Chapter, PetProfile, TaleLength};
use crate::ports::{PortResult, TaleService};
use crate::share::ShareLinks;
use crate::text::plain_text;

/// Shown when a condensed tale could not be generated.
pub const TALE_FAILED_MESSAGE: &str =
    "Could not generate the tale. The model may be unavailable. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tale {
    pub length: TaleLength,
    pub text: String,
    pub share: ShareLinks,
}

/// The story as plain text: every chapter under its heading, separated by blank lines.
/// `chapters` must be in sort order.
pub fn full_story_text(chapters: &[Chapter]) -> String {
    let markup = chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| format!("{}\n{}", chapter.heading(i), chapter.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    plain_text(&markup).trim().to_string()
}

/// Builds a tale of `length`. The full tale is the story itself and never reaches
/// the provider.
pub async fn compose_tale(
    service: &dyn TaleService,
    chapters: &[Chapter],
    profile: &PetProfile,
    length: TaleLength,
) -> PortResult<Tale> {
    let story = full_story_text(chapters);
    let text = match length {
        TaleLength::Full => story,
        _ => {
            debug!(?length, chars = story.len(), "condensing story");
            service.condense_story(&story, profile, length).await?
        }
    };
    Ok(Tale {
        length,
        share: ShareLinks::for_text(&text),
        text,
    })
}
