use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which of the two stored API keys an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Extraction,
    Generation,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Extraction => write!(f, "Extraction"),
            CredentialKind::Generation => write!(f, "Generation"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} API key is not set")]
    MissingCredential(CredentialKind),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("A follow-up question is already in progress")]
    Busy,

    #[error("No conversation is open")]
    NoActiveSession,

    #[error("Conversation {0} was closed before the answer arrived")]
    SessionClosed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AppError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a new-session request. Carries the document title when the
/// extraction step already produced one, so it can still be shown.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct StartError {
    pub title: Option<String>,
    #[source]
    pub source: AppError,
}

impl StartError {
    pub fn new(source: AppError) -> Self {
        Self {
            title: None,
            source,
        }
    }

    pub fn with_title(source: AppError, title: Option<String>) -> Self {
        Self { title, source }
    }
}

impl From<AppError> for StartError {
    fn from(source: AppError) -> Self {
        Self::new(source)
    }
}
