//! crates/pet_tales_core/src/prompts.rs
//!
//! Prompt text for the AI providers, and parsing of their structured answers.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::domain::{PetProfile, PortraitOptions, TaleLength};
use crate::text::plain_text;

const NOT_PROVIDED: &str = "Not provided";

fn or_missing(value: &str) -> &str {
    if value.trim().is_empty() {
        NOT_PROVIDED
    } else {
        value
    }
}

fn age_line(profile: &PetProfile, today: NaiveDate) -> String {
    match profile.age_on(today) {
        Some(age) => format!("{} year(s) old", age),
        None => NOT_PROVIDED.to_string(),
    }
}

/// System instructions for the continuation provider.
pub const SUGGESTION_SYSTEM_PROMPT: &str = "You are an expert ghostwriter who helps people write warm, personal, non-fiction stories about their pets. You answer with JSON only.";

/// User prompt asking for two continuations of the story's last sentence.
pub fn suggestion_prompt(story_markup: &str, profile: &PetProfile, today: NaiveDate) -> String {
    let story = plain_text(story_markup);
    let pet_type = profile
        .pet_type_label()
        .unwrap_or_else(|| NOT_PROVIDED.to_string());

    format!(
        r#"Help the writer continue their story with two distinct, natural-sounding continuations of their last sentence. Each continuation should read as if the writer wrote it, matching their style and moving the narrative along with a subtle sense of time, place or feeling.

The story so far:
---
{story}
---

About the pet:
- Pet Type: {pet_type}
- Full Name: {name}
- Breed: {breed}
- Sex: {sex}
- Approximate Age: {age}
- Date of Birth or Adoption: {dob}
- Appearance (color, markings, size): {appearance}
- Personality & Quirks: {personality}
- Favorite Things (toys, foods, activities): {favorite_things}
- Relationship to Owner: {relationship}
- Significant Memories & Places: {memories}
- Owner's Hopes & Dreams for Them: {hopes}

Rules for every suggestion:
1. Continue the VERY LAST sentence seamlessly, in the writer's tone and vocabulary. Do not repeat its last few words.
2. Imply time or setting through action, sensory detail or emotion rather than a bare time reference.
3. Stay consistent with every detail of the story and the pet information.
4. Keep actions appropriate for the pet's species and age.
5. Prefer real, personal moments drawn from the pet information over generic cliches.
6. Make the two suggestions genuinely different, for example one about the pet's inner feeling and one about something observed.
7. Each suggestion must be between 8 and 15 words.
8. Return ONLY a JSON object with a single key "suggestions" holding an array of two unique strings. No other text or markdown.

Example of a valid response:
{{"suggestions": ["letting out a contented sigh as the evening sun streamed in.", "his ears perking up at the familiar sound of the treat jar opening."]}}"#,
        story = story.trim(),
        pet_type = pet_type,
        name = or_missing(&profile.name),
        breed = or_missing(&profile.breed),
        sex = or_missing(profile.sex.as_str()),
        age = age_line(profile, today),
        dob = or_missing(&profile.dob),
        appearance = or_missing(&profile.appearance),
        personality = or_missing(&profile.personality),
        favorite_things = or_missing(&profile.favorite_things),
        relationship = or_missing(&profile.relationship_to_owner),
        memories = or_missing(&profile.significant_memories),
        hopes = or_missing(&profile.hopes_and_aspirations),
    )
}

#[derive(Deserialize)]
struct SuggestionPayload {
    suggestions: Vec<String>,
}

/// Extracts the suggestion list from a provider answer, tolerating markdown code
/// fences and text around the JSON object. `None` when no list can be found.
pub fn parse_suggestions(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    if let Ok(payload) = serde_json::from_str::<SuggestionPayload>(unfenced) {
        return Some(payload.suggestions);
    }
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<SuggestionPayload>(&unfenced[start..=end])
        .ok()
        .map(|payload| payload.suggestions)
}

/// System instructions for the tale provider.
pub const TALE_SYSTEM_PROMPT: &str =
    "You are an expert storyteller who retells pet stories for family and friends.";

/// User prompt condensing the story to the band of `length`. `None` for the full
/// tale, which is never sent to a provider.
pub fn tale_prompt(
    story_text: &str,
    profile: &PetProfile,
    length: TaleLength,
    today: NaiveDate,
) -> Option<String> {
    let brief = length.brief()?;
    let band = length.word_band()?;
    Some(format!(
        r#"Retell the following story about a pet as the reader asks.

The full story:
---
{story}
---

About the main character:
- Pet's Name: {name}
- Approximate Age: {age}

Instructions:
1. {brief}
2. The length must be approximately {band}.
3. Write in a warm, engaging and personal tone suitable for sharing with family and friends.
4. Do not add introductions or sign-offs such as "Here is the summary:".
5. Return ONLY the story text."#,
        story = story_text.trim(),
        name = or_missing(&profile.name),
        age = age_line(profile, today),
        brief = brief,
        band = band,
    ))
}

/// Instructions sent alongside the photo for an illustrated portrait.
pub fn portrait_prompt(options: &PortraitOptions) -> String {
    let details = if options.collar_color.trim().is_empty() || options.collar_color == "None" {
        "No special details requested.".to_string()
    } else {
        format!(
            "The pet is wearing a {} collar.",
            options.collar_color.to_lowercase()
        )
    };

    format!(
        r#"You are a skilled pet portrait illustrator. Turn the provided photograph of a pet into a beautiful illustration:
1. Subject's Age: the pet should look like a {age}.
2. Art Style: use a '{style}' style. (Classic Storybook: detailed and colorful with soft lighting. Watercolor Whimsy: soft, blended look. Vintage Charm: muted tones and texture. Playful Cartoon: simplified, bold outlines, bright colors.)
3. Scene: place the pet in a '{setting}' setting, where it is {activity}.
4. Details: {details}
5. Moment: the overall mood should capture a feeling of '{moment}'.

Generate ONLY the image. Do not add text or borders."#,
        age = options.age,
        style = options.art_style,
        setting = options.setting,
        activity = options.activity.to_lowercase(),
        details = details,
        moment = options.magic_moment,
    )
}
