//! crates/pet_tales_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of the database and the AI providers behind them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Chapter, ImagePayload, PetProfile, PortraitOptions, TaleLength, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Already exists: {0}")]
    Conflict(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
        email_confirmed: bool,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Chapters ---
    async fn create_chapter(&self, chapter: &Chapter) -> PortResult<Chapter>;

    /// All chapters of `user_id`, ordered by sort position.
    async fn list_chapters(&self, user_id: Uuid) -> PortResult<Vec<Chapter>>;

    async fn get_chapter(&self, chapter_id: Uuid) -> PortResult<Chapter>;

    async fn update_chapter_content(
        &self,
        chapter_id: Uuid,
        content: &str,
        word_count: usize,
    ) -> PortResult<()>;

    async fn rename_chapter(&self, chapter_id: Uuid, name: &str) -> PortResult<()>;

    // --- Pet profile ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<PetProfile>>;

    async fn upsert_profile(&self, user_id: Uuid, profile: &PetProfile) -> PortResult<()>;
}

#[async_trait]
pub trait SuggestionService: Send + Sync {
    /// Two short continuations of the story's last sentence.
    async fn suggest_continuations(
        &self,
        story_text: &str,
        profile: &PetProfile,
    ) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait PortraitService: Send + Sync {
    /// Turns a photo of the pet into an illustrated portrait.
    async fn generate_portrait(
        &self,
        photo: &ImagePayload,
        options: &PortraitOptions,
    ) -> PortResult<ImagePayload>;
}

#[async_trait]
pub trait TaleService: Send + Sync {
    /// Condenses the full story into the word band of `length`.
    async fn condense_story(
        &self,
        story_text: &str,
        profile: &PetProfile,
        length: TaleLength,
    ) -> PortResult<String>;
}
