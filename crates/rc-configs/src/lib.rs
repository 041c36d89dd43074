//! # rc-configs
//!
//! Layered settings for a rusty-comments deployment: an optional
//! `config/default.toml`, then `RUSTY_COMMENTS__*` environment variables
//! (with `.env` picked up through dotenvy).
//!
//! ```toml
//! [database]
//! url = "sqlite:rusty_comments.db"
//!
//! [comments.article]
//! app_label = "articles"
//! model_name = "articlecomment"
//!
//! [comments.article.policy]
//! use_control_question = true
//! autoclose_after = 25
//! ```

use std::collections::BTreeMap;

use config::{Config, Environment, File, FileFormat};
use rc_core::{PolicySettings, RecordType};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "RUSTY_COMMENTS";
const DEFAULT_FILE: &str = "config/default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Required when any configuration enables the external classifier.
    #[serde(default)]
    pub akismet: Option<AkismetSettings>,
    #[serde(default)]
    pub webhook: Option<WebhookSettings>,
    /// Username the CLI acts as.
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub comments: BTreeMap<String, CommentSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:rusty_comments.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AkismetSettings {
    pub api_key: SecretString,
    pub blog_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
}

/// One registry entry: the record type plus its policy.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentSettings {
    pub app_label: String,
    pub model_name: String,
    #[serde(default)]
    pub policy: PolicySettings,
}

impl CommentSettings {
    pub fn record_type(&self) -> RecordType {
        RecordType::new(&self.app_label, &self.model_name)
    }
}

fn default_operator() -> String {
    "operator".to_string()
}

impl Settings {
    /// Reads `.env`, the default file and the environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        let settings: Settings = Config::builder()
            .add_source(File::with_name(DEFAULT_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, entry) in &self.comments {
            if entry.app_label.is_empty() || entry.model_name.is_empty() {
                return Err(ConfigError::invalid(
                    format!("comments.{key}"),
                    "app_label and model_name are required",
                ));
            }
            let policy = &entry.policy;
            if policy.paginate_by == 0 {
                return Err(ConfigError::invalid(
                    format!("comments.{key}.policy.paginate_by"),
                    "must be positive",
                ));
            }
            if policy.autoclose_after == Some(0) {
                return Err(ConfigError::invalid(
                    format!("comments.{key}.policy.autoclose_after"),
                    "must be positive; omit it to never close",
                ));
            }
            if policy.use_external_classifier && self.akismet.is_none() {
                return Err(ConfigError::invalid(
                    format!("comments.{key}.policy.use_external_classifier"),
                    "requires an [akismet] section",
                ));
            }
        }
        Ok(())
    }
}
