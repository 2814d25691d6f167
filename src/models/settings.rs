use serde::{Deserialize, Serialize};

use crate::error::{AppError, CredentialKind, Result};

pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";

fn default_model() -> String {
    DEFAULT_GENERATION_MODEL.to_string()
}

fn default_user_level() -> u8 {
    1
}

/// User-editable preferences. Persisted as one JSON record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub extraction_api_key: String,

    #[serde(default)]
    pub generation_api_key: String,

    #[serde(default = "default_model")]
    pub generation_model: String,

    /// 1..=5 selects an audience description; 0 means no adjustment.
    #[serde(default = "default_user_level")]
    pub user_level: u8,

    #[serde(default)]
    pub user_level_text: String,

    #[serde(default)]
    pub additional_prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            extraction_api_key: String::new(),
            generation_api_key: String::new(),
            generation_model: default_model(),
            user_level: default_user_level(),
            user_level_text: String::new(),
            additional_prompt: String::new(),
        }
    }
}

impl Settings {
    pub fn key(&self, kind: CredentialKind) -> &str {
        match kind {
            CredentialKind::Extraction => &self.extraction_api_key,
            CredentialKind::Generation => &self.generation_api_key,
        }
    }

    pub fn model(&self) -> &str {
        if self.generation_model.is_empty() {
            DEFAULT_GENERATION_MODEL
        } else {
            &self.generation_model
        }
    }

    pub fn require_key(&self, kind: CredentialKind) -> Result<&str> {
        match self.key(kind) {
            "" => Err(AppError::MissingCredential(kind)),
            key => Ok(key),
        }
    }

    pub fn missing_credentials(&self) -> Vec<CredentialKind> {
        [CredentialKind::Extraction, CredentialKind::Generation]
            .into_iter()
            .filter(|kind| self.key(*kind).is_empty())
            .collect()
    }

    pub(crate) fn normalize(&mut self) {
        if self.generation_model.is_empty() {
            self.generation_model = default_model();
        }
    }

    pub(crate) fn merge(&mut self, patch: SettingsPatch) {
        let SettingsPatch {
            extraction_api_key,
            generation_api_key,
            generation_model,
            user_level,
            user_level_text,
            additional_prompt,
        } = patch;

        if let Some(v) = extraction_api_key {
            self.extraction_api_key = v;
        }
        if let Some(v) = generation_api_key {
            self.generation_api_key = v;
        }
        if let Some(v) = generation_model {
            self.generation_model = v;
        }
        if let Some(v) = user_level {
            self.user_level = v;
        }
        if let Some(v) = user_level_text {
            self.user_level_text = v;
        }
        if let Some(v) = additional_prompt {
            self.additional_prompt = v;
        }
        self.normalize();
    }
}

/// A partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_level_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_prompt: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies one `field=value` assignment as typed on the command line.
    pub fn assign(&mut self, assignment: &str) -> Result<()> {
        let (field, value) = assignment.split_once('=').ok_or_else(|| {
            AppError::InvalidArgument(format!("expected field=value, got '{}'", assignment))
        })?;
        let value = value.trim().to_string();

        match field.trim() {
            "extraction-key" => self.extraction_api_key = Some(value),
            "generation-key" => self.generation_api_key = Some(value),
            "model" => self.generation_model = Some(value),
            "level" => {
                let level = value
                    .parse::<u8>()
                    .ok()
                    .filter(|l| *l <= 5)
                    .ok_or_else(|| {
                        AppError::InvalidArgument(format!(
                            "level must be a number from 0 to 5, got '{}'",
                            value
                        ))
                    })?;
                self.user_level = Some(level);
            }
            "level-text" => self.user_level_text = Some(value),
            "prompt" => self.additional_prompt = Some(value),
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "unknown setting '{}'",
                    other
                )))
            }
        }
        Ok(())
    }
}

/// Shows only the last four characters of a key.
pub fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}
