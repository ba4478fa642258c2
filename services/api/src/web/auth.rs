//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use pet_tales_core::{
    auth::{validate_signup, welcome_message, AuthFailure},
    ports::PortError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    middleware::{session_cookie, SESSION_COOKIE},
    state::AppState,
};

/// Lifetime of a login.
const SESSION_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    /// Greeting to show after signing in.
    pub message: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn rejected(status: StatusCode, failure: AuthFailure) -> (StatusCode, String) {
    (status, failure.user_message())
}

fn internal(failure: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        AuthFailure::Other(failure.to_string()).user_message(),
    )
}

/// Stores a new auth session and returns the `Set-Cookie` value for it.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, (StatusCode, String)> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            internal("Failed to create session")
        })?;

    Ok(format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    ))
}

fn hash_password(password: &str) -> Result<String, (StatusCode, String)> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            internal("Failed to hash password")
        })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new account and sign straight in
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 401, description = "Account created but not yet usable"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();
    validate_signup(&email, &req.password).map_err(|f| rejected(StatusCode::BAD_REQUEST, f))?;

    let password_hash = hash_password(&req.password)?;
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let email_confirmed = !state.config.require_email_confirmation;

    let user = state
        .db
        .create_user_with_email(&email, &password_hash, display_name, email_confirmed)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => rejected(StatusCode::CONFLICT, AuthFailure::EmailTaken),
            other => {
                error!("Failed to create user: {:?}", other);
                internal("Failed to create user")
            }
        })?;
    info!("New account {} created", user.user_id);

    // Sign-up is followed by a sign-in, which an unconfirmed account cannot pass.
    if !email_confirmed {
        return Err(rejected(
            StatusCode::UNAUTHORIZED,
            AuthFailure::EmailNotConfirmed,
        ));
    }

    let cookie = start_session(&state, user.user_id).await?;
    let response = AuthResponse {
        user_id: user.user_id,
        message: welcome_message(user.display_name.as_deref(), true),
        email: user.email.unwrap_or(email),
        display_name: user.display_name,
    };

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid login credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = req.email.trim().to_lowercase();
    let user_creds = state.db.get_user_by_email(&email).await.map_err(|e| match e {
        PortError::NotFound(_) => {
            rejected(StatusCode::UNAUTHORIZED, AuthFailure::InvalidCredentials)
        }
        other => {
            error!("Failed to get user: {:?}", other);
            internal("Authentication error")
        }
    })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        internal("Authentication error")
    })?;

    let valid = Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(rejected(StatusCode::UNAUTHORIZED, AuthFailure::InvalidCredentials));
    }
    if !user_creds.email_confirmed {
        warn!("Login for unconfirmed account {}", user_creds.user_id);
        return Err(rejected(StatusCode::UNAUTHORIZED, AuthFailure::EmailNotConfirmed));
    }

    let cookie = start_session(&state, user_creds.user_id).await?;
    let display_name = state
        .db
        .get_user(user_creds.user_id)
        .await
        .ok()
        .and_then(|u| u.display_name);

    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
        message: welcome_message(display_name.as_deref(), false),
        display_name,
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id = session_cookie(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            internal("Failed to logout")
        })?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}

/// GET /auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The current user", body = AuthResponse),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.db.get_user(user_id).await.map_err(|e| {
        error!("Failed to load user {}: {:?}", user_id, e);
        (StatusCode::UNAUTHORIZED, "Not signed in".to_string())
    })?;
    Ok(Json(AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or_default(),
        message: welcome_message(user.display_name.as_deref(), false),
        display_name: user.display_name,
    }))
}
