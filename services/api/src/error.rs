//! services/api/src/error.rs
//!
//! Errors that stop the PetTales server from starting or end a writing session.
//! Request handlers answer with a status code and a message instead.

use crate::config::ConfigError;
use axum::http::header::InvalidHeaderValue;
use pet_tales_core::ports::PortError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A provider key the server cannot run without.
    #[error("{0} is required")]
    MissingApiKey(&'static str),

    #[error("Invalid CORS_ORIGIN '{origin}': {source}")]
    InvalidCorsOrigin {
        origin: String,
        source: InvalidHeaderValue,
    },

    /// Story loading guarantees a first chapter, so this means the store is inconsistent.
    #[error("User {0} has no chapters")]
    StoryUnavailable(Uuid),

    #[error("Story store error: {0}")]
    Port(#[from] PortError),

    /// Connecting to Postgres or running the migrations.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("WebSocket error: {0}")]
    Websocket(#[from] axum::Error),

    #[error("Could not encode JSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn startup_errors_name_the_setting() {
        assert_eq!(
            ApiError::MissingApiKey("OPENAI_API_KEY").to_string(),
            "OPENAI_API_KEY is required"
        );

        let source = HeaderValue::from_str("bad\norigin").unwrap_err();
        let err = ApiError::InvalidCorsOrigin {
            origin: "bad origin".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Invalid CORS_ORIGIN 'bad origin'"));
    }

    #[test]
    fn store_failures_keep_their_cause() {
        let err: ApiError = PortError::NotFound("chapter".to_string()).into();
        assert_eq!(err.to_string(), "Story store error: Item not found: chapter");
    }
}
