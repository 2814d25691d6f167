use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>, timestamp: Option<i64>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
            timestamp,
        }
    }

    pub fn user(text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(Role::User, text, Some(timestamp))
    }

    pub fn model(text: impl Into<String>, timestamp: i64) -> Self {
        Self::new(Role::Model, text, Some(timestamp))
    }

    /// All text parts joined by blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A conversation anchored to one submitted document URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub original_url: String,
    pub original_title: Option<String>,
    pub created_at: i64,
    /// Assigned by the session store on every write.
    #[serde(default)]
    pub last_updated_at: i64,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn display_title(&self) -> &str {
        self.original_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.original_url)
    }
}

/// History listing entry; never carries the turn payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    pub last_updated_at: i64,
}

impl SessionSummary {
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_updated_at).single()
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
