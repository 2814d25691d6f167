use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding the user settings record.
    #[serde(default = "default_settings_dir")]
    pub settings_dir: String,

    #[serde(default = "default_extraction_base_url")]
    pub extraction_base_url: String,

    #[serde(default = "default_generation_base_url")]
    pub generation_base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("doc-explainer");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("sessions.db").to_string_lossy().to_string()
}

fn default_settings_dir() -> String {
    data_dir().to_string_lossy().to_string()
}

fn default_extraction_base_url() -> String {
    "https://r.jina.ai".to_string()
}

fn default_generation_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            settings_dir: default_settings_dir(),
            extraction_base_url: default_extraction_base_url(),
            generation_base_url: default_generation_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("doc-explainer")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for base in [&self.extraction_base_url, &self.generation_base_url] {
            url::Url::parse(base)
                .map_err(|e| AppError::Config(format!("invalid base URL '{}': {}", base, e)))?;
        }
        Ok(())
    }
}
