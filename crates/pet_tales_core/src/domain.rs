//! crates/pet_tales_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::word_count;

//=========================================================================================
// Chapters (the editable documents)
//=========================================================================================

/// Who a chapter belongs to. Signed-out visitors get a placeholder chapter that is
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    User(Uuid),
    Unauthenticated,
}

/// One chapter of the story. `word_count` is always derived from `content`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub word_count: usize,
    pub sort_order: i32,
    pub owner: Owner,
    pub created_at: DateTime<Utc>,
}

impl Chapter {
    /// Name given to the chapter created for a brand-new account.
    pub const FIRST_CHAPTER_NAME: &'static str = "My First Chapter";

    /// A fresh, empty chapter owned by `user_id`.
    pub fn new(user_id: Uuid, name: impl Into<String>, sort_order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: String::new(),
            word_count: 0,
            sort_order,
            owner: Owner::User(user_id),
            created_at: Utc::now(),
        }
    }

    /// The default chapter shown to a visitor who is not signed in.
    pub fn placeholder() -> Self {
        Self {
            id: Uuid::nil(),
            name: String::new(),
            content: String::new(),
            word_count: 0,
            sort_order: 0,
            owner: Owner::Unauthenticated,
            created_at: Utc::now(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.owner == Owner::Unauthenticated
    }

    /// Replaces the content and recomputes the word count from it.
    pub fn set_content(&mut self, content: String) {
        self.word_count = word_count(&content);
        self.content = content;
    }

    /// Heading used by exports and tales: "Chapter 2: The Beach".
    pub fn heading(&self, position: usize) -> String {
        if self.name.trim().is_empty() {
            format!("Chapter {}", position + 1)
        } else {
            format!("Chapter {}: {}", position + 1, self.name)
        }
    }
}

/// Orders chapters by their sort position.
pub fn sort_chapters(chapters: &mut [Chapter]) {
    chapters.sort_by_key(|c| c.sort_order);
}

/// Sort position for a chapter appended after `chapters`.
pub fn next_sort_order(chapters: &[Chapter]) -> i32 {
    chapters.iter().map(|c| c.sort_order).max().unwrap_or(-1) + 1
}

/// Default display name for a chapter appended after `existing` chapters.
pub fn default_chapter_name(existing: usize) -> String {
    format!("Chapter {}", existing + 1)
}

//=========================================================================================
// Users and authentication
//=========================================================================================

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub email_confirmed: bool,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Pet profile ("milestones")
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetSex {
    Male,
    Female,
    #[default]
    #[serde(rename = "")]
    Unspecified,
}

impl PetSex {
    pub fn as_str(&self) -> &'static str {
        match self {
            PetSex::Male => "male",
            PetSex::Female => "female",
            PetSex::Unspecified => "",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => PetSex::Male,
            "female" => PetSex::Female,
            _ => PetSex::Unspecified,
        }
    }
}

/// Descriptive facts about the story's subject, used only as prompt context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PetProfile {
    pub pet_type: String,
    pub pet_type_other: String,
    pub name: String,
    pub breed: String,
    pub sex: PetSex,
    /// Date of birth as entered (`YYYY-MM-DD`).
    pub dob: String,
    pub gotcha_date: String,
    pub appearance: String,
    pub personality: String,
    pub favorite_things: String,
    pub relationship_to_owner: String,
    pub significant_memories: String,
    pub hopes_and_aspirations: String,
}

impl PetProfile {
    pub fn has_pet_type(&self) -> bool {
        !self.pet_type.trim().is_empty()
    }

    /// Pet type with the free-text detail appended for "Other".
    pub fn pet_type_label(&self) -> Option<String> {
        if !self.has_pet_type() {
            return None;
        }
        if self.pet_type == "Other" && !self.pet_type_other.trim().is_empty() {
            Some(format!("{} ({})", self.pet_type, self.pet_type_other))
        } else {
            Some(self.pet_type.clone())
        }
    }

    /// Age in whole years on `today`, or `None` when the date of birth is missing or
    /// unparseable.
    pub fn age_on(&self, today: NaiveDate) -> Option<i32> {
        let dob = NaiveDate::parse_from_str(self.dob.trim(), "%Y-%m-%d").ok()?;
        let mut age = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        Some(age)
    }

    pub fn age_today(&self) -> Option<i32> {
        self.age_on(Utc::now().date_naive())
    }
}

//=========================================================================================
// AI request payloads
//=========================================================================================

/// Raw image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    /// Parses a `data:<mime>;base64,<payload>` URL.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime_type = meta.strip_suffix(";base64")?;
        let data = STANDARD.decode(payload.trim()).ok()?;
        Some(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Options for the illustrated portrait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortraitOptions {
    pub art_style: String,
    pub age: String,
    pub setting: String,
    pub activity: String,
    pub collar_color: String,
    pub magic_moment: String,
}

/// How much of the story a shared tale contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaleLength {
    Teaser,
    Mini,
    Summary,
    Full,
}

impl TaleLength {
    /// Target word band for condensed tales; `None` for the verbatim story.
    pub fn word_band(&self) -> Option<&'static str> {
        match self {
            TaleLength::Teaser => Some("25-50 words"),
            TaleLength::Mini => Some("100-150 words"),
            TaleLength::Summary => Some("250-300 words"),
            TaleLength::Full => None,
        }
    }

    /// What the condensed tale should accomplish.
    pub fn brief(&self) -> Option<&'static str> {
        match self {
            TaleLength::Teaser => Some("Create a tiny, exciting glimpse of the story to get someone hooked. This is perfect for a quick text message."),
            TaleLength::Mini => Some("Create a snapshot of the story, introducing the main character and the beginning of their adventure."),
            TaleLength::Summary => Some("Summarize the core adventure from start to finish, hitting all the key moments and highlights."),
            TaleLength::Full => None,
        }
    }
}

//=========================================================================================
// UI-facing status
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

/// A transient, user-visible message (a toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }
}

/// Persistence indicator shown next to the word counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_accounts_for_birthday_not_yet_reached() {
        let profile = PetProfile {
            dob: "2018-06-15".into(),
            ..Default::default()
        };
        let before = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(profile.age_on(before), Some(5));
        assert_eq!(profile.age_on(on), Some(6));
    }

    #[test]
    fn age_is_none_without_valid_dob() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(PetProfile::default().age_on(today), None);
        let profile = PetProfile {
            dob: "sometime".into(),
            ..Default::default()
        };
        assert_eq!(profile.age_on(today), None);
    }

    #[test]
    fn other_pet_type_includes_detail() {
        let profile = PetProfile {
            pet_type: "Other".into(),
            pet_type_other: "Hedgehog".into(),
            ..Default::default()
        };
        assert_eq!(profile.pet_type_label().as_deref(), Some("Other (Hedgehog)"));
    }

    #[test]
    fn set_content_recomputes_word_count() {
        let mut chapter = Chapter::new(Uuid::new_v4(), "Walks", 0);
        chapter.set_content("<div>Rex ran</div><div>home fast</div>".into());
        assert_eq!(chapter.word_count, 4);
    }

    #[test]
    fn next_sort_order_follows_the_maximum() {
        let user = Uuid::new_v4();
        assert_eq!(next_sort_order(&[]), 0);
        let chapters = vec![Chapter::new(user, "a", 0), Chapter::new(user, "b", 5)];
        assert_eq!(next_sort_order(&chapters), 6);
    }

    #[test]
    fn data_url_decodes_mime_and_bytes() {
        let payload = ImagePayload {
            mime_type: "image/png".into(),
            data: vec![1, 2, 3, 4],
        };
        let url = payload.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ImagePayload::from_data_url(&url), Some(payload));
        assert_eq!(ImagePayload::from_data_url("https://example.com/a.png"), None);
    }

    #[test]
    fn sex_round_trips_through_its_stored_form() {
        assert_eq!(PetSex::Unspecified.as_str(), "");
        assert_eq!(PetSex::parse("Female"), PetSex::Female);
        assert_eq!(PetSex::parse(""), PetSex::Unspecified);
    }
}
