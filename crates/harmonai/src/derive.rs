//! Text derivation via the language model: audio prompts, lyrics, genre tags.

use std::sync::Arc;

use anyhow::Result;

use crate::models::LanguageModel;
use crate::prompts;

/// Upper bound on genre tags returned to the caller.
pub const MAX_CATEGORIES: usize = 5;

/// Turns free-text descriptions into model inputs.
#[derive(Clone)]
pub struct TextDeriver {
    llm: Arc<dyn LanguageModel>,
}

impl TextDeriver {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Comma-separated audio tags for `description`.
    #[tracing::instrument(name = "derive.prompt", skip_all)]
    pub async fn derive_prompt(&self, description: &str) -> Result<String> {
        self.llm
            .complete(&prompts::prompt_instruction(description))
            .await
    }

    /// Song lyrics with section markers for `description`.
    #[tracing::instrument(name = "derive.lyrics", skip_all)]
    pub async fn derive_lyrics(&self, description: &str) -> Result<String> {
        self.llm
            .complete(&prompts::lyrics_instruction(description))
            .await
    }

    /// Up to [`MAX_CATEGORIES`] genre labels for `description`.
    #[tracing::instrument(name = "derive.categories", skip_all, fields(categories.count = tracing::field::Empty))]
    pub async fn derive_categories(&self, description: &str) -> Result<Vec<String>> {
        let reply = self
            .llm
            .complete(&prompts::categories_instruction(description))
            .await?;
        let categories = parse_categories(&reply);
        tracing::Span::current().record("categories.count", categories.len());
        Ok(categories)
    }
}

/// Split a comma-separated reply into trimmed, non-empty labels.
pub fn parse_categories(reply: &str) -> Vec<String> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_CATEGORIES)
        .map(str::to_string)
        .collect()
}
