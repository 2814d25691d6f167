use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::ai::{ExplanationGenerator, GeminiClient};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::db::SessionStore;
use crate::error::{AppError, CredentialKind, Result, StartError};
use crate::models::{now_millis, Session, SessionSummary, Settings, Turn};
use crate::services::{ContentFetcher, ReaderClient};

/// Session orchestration: owns the store, the two API collaborators and the
/// currently open conversation.
///
/// The open conversation sits behind a plain mutex that is only taken between
/// awaits, never across one.
pub struct App {
    pub sessions: SessionStore,
    fetcher: Arc<dyn ContentFetcher>,
    generator: Arc<dyn ExplanationGenerator>,
    active: Mutex<Option<Conversation>>,
    request_timeout: Duration,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let sessions = SessionStore::new(&config.db_path).await?;
        let timeout = config.request_timeout();
        let fetcher = ReaderClient::new(&config.extraction_base_url, timeout)?;
        let generator = GeminiClient::new(&config.generation_base_url, timeout)?;

        Ok(Self::with_services(
            sessions,
            Arc::new(fetcher),
            Arc::new(generator),
            timeout,
        ))
    }

    pub fn with_services(
        sessions: SessionStore,
        fetcher: Arc<dyn ContentFetcher>,
        generator: Arc<dyn ExplanationGenerator>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            fetcher,
            generator,
            active: Mutex::new(None),
            request_timeout,
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<Conversation>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.request_timeout)),
        }
    }

    /// Snapshot of the open conversation, including any provisional turn.
    pub async fn active_session(&self) -> Option<Session> {
        self.active().as_ref().map(|c| c.session().clone())
    }

    pub async fn history(&self) -> Result<Vec<SessionSummary>> {
        self.sessions.list_summaries().await
    }

    /// Fetches `url`, explains it and stores the result as a new two-turn
    /// session, which becomes the open conversation.
    pub async fn start_new_session(
        &self,
        url: &str,
        settings: &Settings,
    ) -> std::result::Result<Session, StartError> {
        let extraction_key = settings.require_key(CredentialKind::Extraction)?;
        settings.require_key(CredentialKind::Generation)?;
        let url = validate_url(url)?;

        let document = self
            .bounded(self.fetcher.fetch(&url, extraction_key))
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch {}: {}", url, e);
                StartError::new(e)
            })?;

        let explanation = match self
            .bounded(self.generator.summarize(&document.content, settings))
            .await
        {
            Ok(explanation) => explanation,
            Err(e) => {
                tracing::error!("Failed to explain {}: {}", url, e);
                return Err(StartError::with_title(e, document.title));
            }
        };

        let request_text = if explanation.prompt.is_empty() {
            format!("Explain the document at {}", url)
        } else {
            explanation.prompt
        };

        let now = now_millis();
        let mut session = Session {
            id: Uuid::new_v4().to_string(),
            original_url: url,
            original_title: document.title,
            created_at: now,
            last_updated_at: now,
            turns: vec![
                Turn::user(request_text, now),
                Turn::model(explanation.markdown, now),
            ],
        };

        if let Err(e) = self.sessions.upsert(&mut session).await {
            return Err(StartError::with_title(e, session.original_title));
        }

        *self.active() = Some(Conversation::new(session.clone()));
        Ok(session)
    }

    /// Loads a stored session as the open conversation.
    pub async fn open_session(&self, id: &str) -> Result<Option<Session>> {
        let Some(session) = self.sessions.get(id).await? else {
            return Ok(None);
        };
        *self.active() = Some(Conversation::new(session.clone()));
        Ok(Some(session))
    }

    /// Deletes a stored session, closing it if it is the open one.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        self.sessions.delete(id).await?;

        let mut active = self.active();
        if active.as_ref().is_some_and(|c| c.id() == id) {
            *active = None;
        }
        Ok(())
    }

    /// Asks `question` in the open conversation. A second call while one is
    /// outstanding fails with `Busy`; on any failure the conversation is left
    /// exactly as it was and nothing is written. Dropping the returned future
    /// before it completes also rolls the provisional turn back.
    pub async fn append_follow_up(
        &self,
        question: &str,
        settings: &Settings,
    ) -> Result<Session> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidArgument(
                "follow-up question is empty".to_string(),
            ));
        }
        settings.require_key(CredentialKind::Generation)?;

        // The lock is released while the request is in flight; the pending
        // turn itself is what rejects concurrent follow-ups.
        let pending = {
            let mut active = self.active();
            let conversation = active.as_mut().ok_or(AppError::NoActiveSession)?;
            conversation.begin_follow_up(question, now_millis())?
        };
        let mut guard = RollbackOnDrop {
            active: &self.active,
            token: Some(pending.token()),
        };

        let answer = self
            .bounded(
                self.generator
                    .follow_up(pending.history(), pending.question(), settings),
            )
            .await;

        guard.disarm();
        let mut snapshot = {
            let mut active = self.active();
            let conversation = match active.as_mut() {
                Some(c) if c.owns(&pending) => c,
                _ => {
                    tracing::warn!(
                        session_id = pending.session_id(),
                        "Conversation closed while a follow-up was pending"
                    );
                    return Err(AppError::SessionClosed(pending.session_id().to_string()));
                }
            };

            match answer {
                Ok(answer) => {
                    conversation.commit(pending, answer, now_millis())?;
                    conversation.session().clone()
                }
                Err(e) => {
                    tracing::error!(session_id = conversation.id(), "Follow-up failed: {}", e);
                    conversation.roll_back(pending)?;
                    return Err(e);
                }
            }
        };

        self.sessions.upsert(&mut snapshot).await?;

        let mut active = self.active();
        if let Some(conversation) = active.as_mut().filter(|c| c.id() == snapshot.id) {
            conversation.set_last_updated_at(snapshot.last_updated_at);
        }
        Ok(snapshot)
    }
}

/// Removes a follow-up's provisional turn if `append_follow_up` is dropped
/// while the request is in flight.
struct RollbackOnDrop<'a> {
    active: &'a Mutex<Option<Conversation>>,
    token: Option<u64>,
}

impl RollbackOnDrop<'_> {
    fn disarm(&mut self) {
        self.token = None;
    }
}

impl Drop for RollbackOnDrop<'_> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conversation) = active.as_mut() {
            if conversation.abandon(token) {
                tracing::warn!(
                    session_id = conversation.id(),
                    "Follow-up cancelled before an answer arrived"
                );
            }
        }
    }
}

fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidArgument("URL is empty".to_string()));
    }
    let parsed = Url::parse(trimmed).map_err(|e| {
        AppError::InvalidArgument(format!("'{}' is not a valid URL: {}", trimmed, e))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(AppError::InvalidArgument(format!(
            "unsupported URL scheme '{}'",
            other
        ))),
    }
}
