//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the story loading used by both the
//! REST handlers and the writing session.

use crate::config::Config;
use pet_tales_core::{
    domain::{sort_chapters, Chapter, PetProfile},
    ports::{DatabaseService, PortResult, PortraitService, SuggestionService, TaleService},
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub suggestions: Arc<dyn SuggestionService>,
    pub tales: Arc<dyn TaleService>,
    /// `None` when no image model is configured.
    pub portraits: Option<Arc<dyn PortraitService>>,
}

//=========================================================================================
// Story loading
//=========================================================================================

/// Everything a writer owns: the chapters in sort order and the pet profile.
pub struct StoryData {
    pub chapters: Vec<Chapter>,
    pub profile: Option<PetProfile>,
}

/// Loads a writer's story, creating "My First Chapter" for a brand new account.
pub async fn load_story(db: &dyn DatabaseService, user_id: Uuid) -> PortResult<StoryData> {
    let mut chapters = db.list_chapters(user_id).await?;
    if chapters.is_empty() {
        info!("No chapters for user {}, creating the first one", user_id);
        let first = Chapter::new(user_id, Chapter::FIRST_CHAPTER_NAME, 0);
        chapters.push(db.create_chapter(&first).await?);
    }
    sort_chapters(&mut chapters);
    let profile = db.get_profile(user_id).await?;
    Ok(StoryData { chapters, profile })
}
