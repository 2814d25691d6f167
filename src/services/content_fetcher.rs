use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, CredentialKind, Result};
use crate::models::FetchedDocument;

const SERVICE: &str = "Reader API";

/// Turns a document URL into readable text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, api_key: &str) -> Result<FetchedDocument>;
}

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    data: Option<ReaderData>,
}

#[derive(Debug, Deserialize)]
struct ReaderData {
    content: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReaderErrorBody {
    message: Option<String>,
    #[serde(rename = "readableMessage")]
    readable_message: Option<String>,
}

/// Client for a Jina-Reader style extraction service: `GET <base>/<url>`.
pub struct ReaderClient {
    client: Client,
    base_url: String,
}

impl ReaderClient {
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
}

#[async_trait]
impl ContentFetcher for ReaderClient {
    async fn fetch(&self, url: &str, api_key: &str) -> Result<FetchedDocument> {
        if api_key.is_empty() {
            return Err(AppError::MissingCredential(CredentialKind::Extraction));
        }

        let reader_url = format!("{}/{}", self.base_url, url);
        tracing::debug!("Fetching readable content for {}", url);

        let response = self
            .client
            .get(&reader_url)
            .bearer_auth(api_key)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ReaderErrorBody>(&body)
                .ok()
                .and_then(|e| e.readable_message.or(e.message))
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| status.to_string());
            tracing::warn!("Content fetch for {} failed: {}", url, detail);
            return Err(AppError::upstream(
                SERVICE,
                format!("failed to fetch content: {}", detail),
            ));
        }

        let parsed: ReaderResponse = serde_json::from_str(&body).map_err(|e| {
            AppError::upstream(SERVICE, format!("malformed response: {}", e))
        })?;

        let data = parsed.data.ok_or_else(|| {
            AppError::upstream(SERVICE, "response did not contain the expected data")
        })?;

        let content = data
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::upstream(SERVICE, "no readable content found"))?;

        Ok(FetchedDocument {
            content,
            title: data.title.filter(|t| !t.is_empty()),
        })
    }
}
