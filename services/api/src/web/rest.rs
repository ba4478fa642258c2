//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::{
    adapters::portrait::PORTRAIT_FAILED_MESSAGE,
    export::{render_story_pdf, EXPORT_FILE_NAME},
    web::{
        auth,
        state::{load_story, AppState},
    },
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use pet_tales_core::{
    domain::{
        default_chapter_name, next_sort_order, Chapter, ImagePayload, Owner, PetProfile,
        PortraitOptions, TaleLength,
    },
    onboarding::OnboardingStep,
    ports::PortError,
    tale::{compose_tale, Tale, TALE_FAILED_MESSAGE},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        get_story_handler,
        create_chapter_handler,
        rename_chapter_handler,
        save_profile_handler,
        create_portrait_handler,
        create_tale_handler,
        export_story_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            ChapterResponse,
            StoryResponse,
            CreateChapterRequest,
            RenameChapterRequest,
            MessageResponse,
            SaveProfileRequest,
            PortraitRequest,
            PortraitResponse,
            TaleRequest,
            TaleResponse,
        )
    ),
    tags(
        (name = "PetTales API", description = "Story editing, pet profile, portraits, tales and export.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ChapterResponse {
    pub id: Uuid,
    pub name: String,
    /// Chapter markup as the editor produced it.
    pub content: String,
    pub word_count: usize,
    pub sort_order: i32,
}

impl From<Chapter> for ChapterResponse {
    fn from(chapter: Chapter) -> Self {
        Self {
            id: chapter.id,
            name: chapter.name,
            content: chapter.content,
            word_count: chapter.word_count,
            sort_order: chapter.sort_order,
        }
    }
}

/// Everything the editor needs on first load.
#[derive(Serialize, ToSchema)]
pub struct StoryResponse {
    pub chapters: Vec<ChapterResponse>,
    #[schema(value_type = Object)]
    pub profile: Option<PetProfile>,
    #[schema(value_type = String)]
    pub onboarding: OnboardingStep,
    pub onboarding_number: u8,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateChapterRequest {
    pub name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameChapterRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SaveProfileRequest {
    #[schema(value_type = Object)]
    pub profile: PetProfile,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PortraitRequest {
    /// The photo as a `data:image/...;base64,` URL.
    pub image: String,
    #[schema(value_type = Object)]
    pub options: PortraitOptions,
}

#[derive(Serialize, ToSchema)]
pub struct PortraitResponse {
    /// The illustration as a `data:` URL.
    pub image: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TaleRequest {
    /// One of `teaser`, `mini`, `summary` or `full`.
    #[schema(value_type = String)]
    pub length: TaleLength,
}

#[derive(Serialize, ToSchema)]
pub struct TaleResponse {
    #[schema(value_type = String)]
    pub length: TaleLength,
    pub text: String,
    /// Opens a web mail compose window with the tale.
    pub email_url: String,
    /// Opens the messaging app with the tale.
    pub sms_url: String,
}

impl From<Tale> for TaleResponse {
    fn from(tale: Tale) -> Self {
        Self {
            length: tale.length,
            text: tale.text,
            email_url: tale.share.email,
            sms_url: tale.share.sms,
        }
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Maps a port failure to a status code and logs it.
fn port_failure(context: &str, e: PortError) -> (StatusCode, String) {
    error!("{}: {:?}", context, e);
    let status = match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{}: {}", context, e))
}

/// Loads a chapter and checks that `user_id` owns it.
async fn owned_chapter(
    state: &AppState,
    user_id: Uuid,
    chapter_id: Uuid,
) -> Result<Chapter, (StatusCode, String)> {
    let chapter = state
        .db
        .get_chapter(chapter_id)
        .await
        .map_err(|e| port_failure("Failed to load chapter", e))?;
    if chapter.owner != Owner::User(user_id) {
        return Err((StatusCode::NOT_FOUND, "Chapter not found".to_string()));
    }
    Ok(chapter)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Load the writer's story, creating the first chapter for a new account.
#[utoipa::path(
    get,
    path = "/story",
    responses(
        (status = 200, description = "Chapters, pet profile and onboarding step", body = StoryResponse),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = load_story(state.db.as_ref(), user_id)
        .await
        .map_err(|e| port_failure("Failed to load story", e))?;
    let onboarding = OnboardingStep::initial(story.profile.as_ref(), &story.chapters);

    Ok(Json(StoryResponse {
        chapters: story.chapters.into_iter().map(ChapterResponse::from).collect(),
        profile: story.profile,
        onboarding_number: onboarding.number(),
        onboarding,
    }))
}

/// Append a chapter to the story.
#[utoipa::path(
    post,
    path = "/chapters",
    request_body = CreateChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterResponse),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CreateChapterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let existing = state
        .db
        .list_chapters(user_id)
        .await
        .map_err(|e| port_failure("Could not add chapter", e))?;
    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_chapter_name(existing.len()));

    let chapter = Chapter::new(user_id, name, next_sort_order(&existing));
    let created = state
        .db
        .create_chapter(&chapter)
        .await
        .map_err(|e| port_failure("Could not add chapter", e))?;
    info!("Chapter {} created for user {}", created.id, user_id);

    Ok((StatusCode::CREATED, Json(ChapterResponse::from(created))))
}

/// Rename a chapter.
#[utoipa::path(
    put,
    path = "/chapters/{id}/name",
    request_body = RenameChapterRequest,
    params(("id" = Uuid, Path, description = "The chapter to rename.")),
    responses(
        (status = 200, description = "Chapter renamed", body = ChapterResponse),
        (status = 404, description = "No such chapter"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn rename_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(chapter_id): Path<Uuid>,
    Json(req): Json<RenameChapterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut chapter = owned_chapter(&state, user_id, chapter_id).await?;
    let name = req.name.trim().to_string();
    state
        .db
        .rename_chapter(chapter_id, &name)
        .await
        .map_err(|e| port_failure("Failed to update name", e))?;
    chapter.name = name;
    Ok(Json(ChapterResponse::from(chapter)))
}

/// Save the pet profile as a whole.
#[utoipa::path(
    put,
    path = "/profile",
    request_body = SaveProfileRequest,
    responses(
        (status = 200, description = "Profile saved", body = MessageResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn save_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SaveProfileRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .upsert_profile(user_id, &req.profile)
        .await
        .map_err(|e| port_failure("Could not save pet profile", e))?;
    Ok(Json(MessageResponse {
        message: "Pet profile saved!".to_string(),
    }))
}

/// Turn a pet photo into an illustrated portrait.
#[utoipa::path(
    post,
    path = "/portraits",
    request_body = PortraitRequest,
    responses(
        (status = 200, description = "The illustration", body = PortraitResponse),
        (status = 400, description = "Not an image"),
        (status = 502, description = "The image model failed"),
        (status = 503, description = "No image model configured")
    )
)]
pub async fn create_portrait_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PortraitRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let photo = ImagePayload::from_data_url(&req.image)
        .filter(ImagePayload::is_image)
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Please select a valid image file.".to_string(),
        ))?;
    let portraits = state.portraits.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        PORTRAIT_FAILED_MESSAGE.to_string(),
    ))?;

    let portrait = portraits
        .generate_portrait(&photo, &req.options)
        .await
        .map_err(|e| {
            error!("Failed to generate portrait: {:?}", e);
            (StatusCode::BAD_GATEWAY, PORTRAIT_FAILED_MESSAGE.to_string())
        })?;

    Ok(Json(PortraitResponse {
        image: portrait.to_data_url(),
    }))
}

/// Build a shareable tale from the whole story.
#[utoipa::path(
    post,
    path = "/tales",
    request_body = TaleRequest,
    responses(
        (status = 200, description = "The tale with e-mail and SMS share links", body = TaleResponse),
        (status = 502, description = "The tale model failed")
    )
)]
pub async fn create_tale_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<TaleRequest>,
) -> Result<Json<TaleResponse>, (StatusCode, String)> {
    let story = load_story(state.db.as_ref(), user_id)
        .await
        .map_err(|e| port_failure("Failed to load story", e))?;
    let profile = story.profile.unwrap_or_default();

    let tale = compose_tale(state.tales.as_ref(), &story.chapters, &profile, req.length)
        .await
        .map_err(|e| {
            error!("Failed to compose tale: {:?}", e);
            (StatusCode::BAD_GATEWAY, TALE_FAILED_MESSAGE.to_string())
        })?;
    Ok(Json(TaleResponse::from(tale)))
}

/// Download the whole story as a PDF.
#[utoipa::path(
    get,
    path = "/export",
    responses(
        (status = 200, description = "The story as a PetTales.pdf attachment"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn export_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let story = load_story(state.db.as_ref(), user_id)
        .await
        .map_err(|e| port_failure("Failed to load story", e))?;

    let pdf = tokio::task::spawn_blocking(move || render_story_pdf(&story.chapters))
        .await
        .map_err(|e| {
            error!("PDF rendering task failed: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to export story".to_string())
        })?
        .map_err(|e| {
            error!("Failed to render PDF: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to export story".to_string())
        })?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        pdf,
    ))
}
