use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub busy_timeout_ms: u64,
    pub openai_api_key: Option<String>,
    pub gmail: GmailConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("daybook.db"),
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            busy_timeout_ms: 5000,
            openai_api_key: None,
            gmail: GmailConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads the YAML file when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Blank values are ignored so an exported-but-empty variable does not
    /// wipe a file setting.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = value("DAYBOOK_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = value("DAYBOOK_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(level) = value("DAYBOOK_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(key) = value("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(id) = value("GMAIL_CLIENT_ID") {
            self.gmail.client_id = Some(id);
        }
        if let Some(secret) = value("GMAIL_CLIENT_SECRET") {
            self.gmail.client_secret = Some(secret);
        }
        if let Some(uri) = value("GMAIL_REDIRECT_URI") {
            self.gmail.redirect_uri = Some(uri);
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(AppError::Config("database_path must not be empty".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(AppError::Config("log_level must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn mail_configured(&self) -> bool {
        has_text(&self.gmail.client_id) && has_text(&self.gmail.client_secret)
    }

    pub fn insights_configured(&self) -> bool {
        has_text(&self.openai_api_key)
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}
