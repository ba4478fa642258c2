//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, GeminiPortraitAdapter, OpenAiSuggestionAdapter, OpenAiTaleAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, me_handler, signup_handler},
        guest_ws_handler,
        middleware::require_auth,
        rest::{
            create_chapter_handler, create_portrait_handler, create_tale_handler,
            export_story_handler, get_story_handler, rename_chapter_handler,
            save_profile_handler, ApiDoc,
        },
        state::AppState,
        ws_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use pet_tales_core::ports::PortraitService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or(ApiError::MissingApiKey("OPENAI_API_KEY"))?,
    );
    let openai_client = Client::with_config(openai_config);

    let suggestions = Arc::new(OpenAiSuggestionAdapter::new(
        openai_client.clone(),
        config.suggestion_model.clone(),
    ));
    let tales = Arc::new(OpenAiTaleAdapter::new(
        openai_client.clone(),
        config.tale_model.clone(),
    ));

    let portraits: Option<Arc<dyn PortraitService>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiPortraitAdapter::new(
            reqwest::Client::new(),
            key.clone(),
            config.gemini_base_url.clone(),
            config.portrait_model.clone(),
        ))),
        None => {
            warn!("GEMINI_API_KEY is not set; portrait generation is disabled");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        config: config.clone(),
        suggestions,
        tales,
        portraits,
    });

    // --- 5. CORS ---
    let cors_origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|source| ApiError::InvalidCorsOrigin {
            origin: config.cors_origin.clone(),
            source,
        })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/ws/guest", get(guest_ws_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(me_handler))
        .route("/story", get(get_story_handler))
        .route("/chapters", post(create_chapter_handler))
        .route("/chapters/{id}/name", put(rename_chapter_handler))
        .route("/profile", put(save_profile_handler))
        .route("/portraits", post(create_portrait_handler))
        .route("/tales", post(create_tale_handler))
        .route("/export", get(export_story_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes. Photos arrive as data URLs, hence the larger body limit.
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
