mod gemini;
mod prompt;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Explanation, Settings, Turn};

pub use gemini::GeminiClient;
pub use prompt::{build_explain_prompt, level_description};

/// Produces explanations and follow-up answers from a language model.
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    /// Explains `text` in one request built from the settings' level and
    /// instructions.
    async fn summarize(&self, text: &str, settings: &Settings) -> Result<Explanation>;

    /// Answers `question` given the prior turns. The system instructions are
    /// not sent again; they already live in the first turn.
    async fn follow_up(&self, history: &[Turn], question: &str, settings: &Settings)
        -> Result<String>;
}
