//! Runtime configuration loaded from the environment.
//!
//! A `.env` file in the working directory is honoured outside of tests.

use std::env;

use hsc_core::analytics::MasteryThreshold;
use thiserror::Error;

use crate::ai_service::AiConfig;

pub const DEFAULT_DB_URL: &str = "sqlite://hsc.sqlite3?mode=rwc";
pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// `None` when no API key is set; the AI facade then serves fallbacks.
    pub ai: Option<AiConfig>,
    pub mastery: MasteryThreshold,
}

impl Config {
    /// Read `HSC_*` variables, falling back to defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable is set but cannot
    /// be parsed or violates the mastery threshold bounds.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("HSC_DB_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let ai = lookup("HSC_AI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| AiConfig {
                base_url: lookup("HSC_AI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string()),
                model: lookup("HSC_AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
                api_key,
            });

        let defaults = MasteryThreshold::default();
        let min_accuracy = parse_or(
            &lookup,
            "HSC_MASTERY_MIN_ACCURACY",
            defaults.min_accuracy(),
        )?;
        let min_attempts = parse_or(
            &lookup,
            "HSC_MASTERY_MIN_ATTEMPTS",
            defaults.min_attempts(),
        )?;
        let min_interval_days = parse_or(
            &lookup,
            "HSC_MASTERY_MIN_INTERVAL_DAYS",
            defaults.min_interval_days(),
        )?;
        let mastery = MasteryThreshold::new(min_accuracy, min_attempts, min_interval_days)
            .map_err(|e| ConfigError::InvalidValue {
                var: "HSC_MASTERY_MIN_ACCURACY",
                reason: e.to_string(),
            })?;

        Ok(Self {
            database_url,
            ai,
            mastery,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
