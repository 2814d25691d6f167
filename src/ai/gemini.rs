use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::prompt::build_explain_prompt;
use super::ExplanationGenerator;
use crate::error::{AppError, CredentialKind, Result};
use crate::models::{Explanation, Role, Settings, Turn};

const SERVICE: &str = "Gemini API";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn text(role: Role, text: &'a str) -> Self {
        Self {
            role: role.as_str(),
            parts: vec![TextPart { text }],
        }
    }

    // Timestamps stay local; only role and text go upstream.
    fn from_turn(turn: &'a Turn) -> Self {
        Self {
            role: turn.role.as_str(),
            parts: turn
                .parts
                .iter()
                .map(|p| TextPart { text: &p.text })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// `generateContent` client for Google's generative language API.
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn generate(&self, contents: Vec<Content<'_>>, settings: &Settings) -> Result<String> {
        let api_key = settings.require_key(CredentialKind::Generation)?;
        let model = settings.model();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(model)
        );

        tracing::debug!(model, turns = contents.len(), "Sending generateContent request");

        // The request URL carries the API key, so transport errors drop it.
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&GenerateRequest { contents })
            .send()
            .await
            .map_err(|e| AppError::Transport(e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Transport(e.without_url()))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.to_string());
            tracing::warn!(model, "Generation request failed: {}", detail);
            return Err(AppError::upstream(SERVICE, detail));
        }

        extract_text(&body)
    }
}

/// First text part of the first candidate, or an error describing the shape.
fn extract_text(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AppError::upstream(SERVICE, format!("malformed response: {}", e)))?;

    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| {
            AppError::upstream(SERVICE, "response did not contain the expected candidate text")
        })
}

#[async_trait]
impl ExplanationGenerator for GeminiClient {
    async fn summarize(&self, text: &str, settings: &Settings) -> Result<Explanation> {
        let prompt = build_explain_prompt(text, settings);
        let markdown = self
            .generate(vec![Content::text(Role::User, &prompt)], settings)
            .await?;
        Ok(Explanation { markdown, prompt })
    }

    async fn follow_up(
        &self,
        history: &[Turn],
        question: &str,
        settings: &Settings,
    ) -> Result<String> {
        let mut contents: Vec<Content<'_>> = history.iter().map(Content::from_turn).collect();
        contents.push(Content::text(Role::User, question));
        self.generate(contents, settings).await
    }
}
