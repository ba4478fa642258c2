//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;

use pet_tales_core::settings::EditorSettings;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub suggestion_model: String,
    pub tale_model: String,
    pub portrait_model: String,
    /// New accounts must confirm their e-mail before signing in.
    pub require_email_confirmation: bool,
    pub editor: EditorSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());

        // --- API Keys (optional; the matching features are disabled without them) ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let gemini_api_key = lookup("GEMINI_API_KEY");

        // --- Adapter-specific Settings ---
        let gemini_base_url = lookup("GEMINI_BASE_URL")
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string());
        let suggestion_model =
            lookup("SUGGESTION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let tale_model = lookup("TALE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let portrait_model = lookup("PORTRAIT_MODEL")
            .unwrap_or_else(|| "gemini-2.5-flash-image-preview".to_string());

        let require_email_confirmation = match lookup("REQUIRE_EMAIL_CONFIRMATION") {
            None => false,
            Some(value) => parse_bool("REQUIRE_EMAIL_CONFIRMATION", &value)?,
        };

        // --- Editor timings ---
        let defaults = EditorSettings::default();
        let editor = EditorSettings {
            suggestion_word_trigger: parse_number(
                &lookup,
                "SUGGESTION_WORD_TRIGGER",
                defaults.suggestion_word_trigger as u64,
            )? as usize,
            suggestion_settle_delay: Duration::from_millis(parse_number(
                &lookup,
                "SUGGESTION_SETTLE_MS",
                defaults.suggestion_settle_delay.as_millis() as u64,
            )?),
            save_debounce: Duration::from_millis(parse_number(
                &lookup,
                "SAVE_DEBOUNCE_MS",
                defaults.save_debounce.as_millis() as u64,
            )?),
            saved_reset_delay: defaults.saved_reset_delay,
        };
        if editor.suggestion_word_trigger == 0 {
            return Err(ConfigError::InvalidValue(
                "SUGGESTION_WORD_TRIGGER".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            openai_api_key,
            gemini_api_key,
            gemini_base_url,
            suggestion_model,
            tale_model,
            portrait_model,
            require_email_confirmation,
            editor,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
    }
}
