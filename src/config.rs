//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::store::DEFAULT_AGE_TOLERANCE;

/// Bot configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Path to the local database file.
    pub db_path: PathBuf,
    /// ± tolerance for age matching.
    pub age_tolerance: u8,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".into()))?;

        let db_path = std::env::var("STUDY_MATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/study-match.db"));

        let age_tolerance = match std::env::var("STUDY_MATCH_AGE_TOLERANCE") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "STUDY_MATCH_AGE_TOLERANCE".into(),
                message: format!("expected a small integer, got {raw:?}"),
            })?,
            Err(_) => DEFAULT_AGE_TOLERANCE,
        };

        Ok(Self {
            bot_token,
            db_path,
            age_tolerance,
        })
    }
}
