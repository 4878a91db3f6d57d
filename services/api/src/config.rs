//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
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
    /// When absent the in-memory store is used.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: String,
    pub summary_model: String,
    pub questions_model: String,
    pub question_count: usize,
    pub ai_timeout: Duration,
    pub max_prompt_chars: usize,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub store_retry_delay: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generative Backend Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let summary_model =
            std::env::var("SUMMARY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let questions_model =
            std::env::var("QUESTIONS_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let question_count: usize = parse_var("QUESTION_COUNT", "5")?;
        if question_count == 0 {
            return Err(ConfigError::InvalidValue(
                "QUESTION_COUNT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let ai_timeout = Duration::from_secs(parse_var("AI_TIMEOUT_SECS", "60")?);
        let max_prompt_chars = parse_var("MAX_PROMPT_CHARS", "12000")?;

        // --- Load Identity Settings ---
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        let token_ttl = chrono::Duration::minutes(parse_var("TOKEN_TTL_MINUTES", "60")?);
        let cookie_secure = parse_var("COOKIE_SECURE", "false")?;
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let store_retry_delay = Duration::from_secs(parse_var("STORE_RETRY_SECS", "5")?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            summary_model,
            questions_model,
            question_count,
            ai_timeout,
            max_prompt_chars,
            jwt_secret,
            token_ttl,
            cookie_secure,
            frontend_url,
            store_retry_delay,
        })
    }
}

/// Reads `name` (or `default` when unset) and parses it.
fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
