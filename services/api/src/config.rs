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
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub chat_max_tokens: u32,
    /// Reject whole messages that use words outside the learner's vocabulary.
    pub strict_vocabulary: bool,
    pub vocabulary_timeout: Duration,
    pub persistence_timeout: Duration,
    /// Progression trackers of sessions idle this long are dropped.
    pub session_idle_timeout: Duration,
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

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server and Database Settings ---
        let bind_address =
            parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Chat Completion ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let chat_model = lookup("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let chat_max_tokens = parse_or(&lookup, "CHAT_MAX_TOKENS", 100u32)?;

        // --- Vocabulary and Progression ---
        let strict_vocabulary = parse_or(&lookup, "STRICT_VOCABULARY", false)?;
        let vocabulary_timeout =
            Duration::from_millis(parse_or(&lookup, "VOCABULARY_TIMEOUT_MS", 2000u64)?);
        let persistence_timeout =
            Duration::from_millis(parse_or(&lookup, "PERSISTENCE_TIMEOUT_MS", 3000u64)?);
        let session_idle_timeout =
            Duration::from_millis(parse_or(&lookup, "SESSION_IDLE_TIMEOUT_MS", 1_800_000u64)?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            chat_model,
            chat_max_tokens,
            strict_vocabulary,
            vocabulary_timeout,
            persistence_timeout,
            session_idle_timeout,
        })
    }
}

/// Parses `key` when it is set, otherwise uses `default`.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/test")]))
                .unwrap();

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.chat_max_tokens, 100);
        assert!(!config.strict_vocabulary);
        assert_eq!(config.vocabulary_timeout, Duration::from_millis(2000));
        assert_eq!(config.persistence_timeout, Duration::from_millis(3000));
        assert_eq!(config.session_idle_timeout, Duration::from_secs(30 * 60));
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("BIND_ADDRESS", "127.0.0.1:8080"),
            ("STRICT_VOCABULARY", "true"),
            ("VOCABULARY_TIMEOUT_MS", "150"),
            ("RUST_LOG", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 8080);
        assert!(config.strict_vocabulary);
        assert_eq!(config.vocabulary_timeout, Duration::from_millis(150));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://db/app"),
            ("STRICT_VOCABULARY", "sometimes"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "STRICT_VOCABULARY"));
    }
}
