//! Prompt-driven enrichment over any [`InferenceBackend`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

use tacit_core::{
    ActionItem, EmbeddingBackend, EnrichmentProvider, Error, GenerationBackend, InferenceBackend,
    Result, Vector,
};

use crate::prompts;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```[a-zA-Z]*\s*$").expect("valid regex"));

/// Remove reasoning blocks emitted by thinking models.
pub fn strip_thinking(raw: &str) -> String {
    THINK_BLOCK.replace_all(raw, "").trim().to_string()
}

/// Parse action items from a model response.
///
/// Accepts a bare JSON array or one wrapped in prose or code fences. An array
/// of plain strings is accepted as descriptions.
pub fn parse_action_items(raw: &str) -> Result<Vec<ActionItem>> {
    let cleaned = strip_thinking(raw);
    let cleaned = CODE_FENCE.replace_all(&cleaned, "");
    let (start, end) = match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(Error::Enrichment(
                "Action item response contained no JSON array".to_string(),
            ))
        }
    };
    let slice = &cleaned[start..=end];

    let items = match serde_json::from_str::<Vec<ActionItem>>(slice) {
        Ok(items) => items,
        Err(_) => serde_json::from_str::<Vec<String>>(slice)
            .map(|descriptions| {
                descriptions
                    .into_iter()
                    .map(|description| ActionItem {
                        description,
                        assignee: None,
                        due_date: None,
                    })
                    .collect()
            })
            .map_err(|e| Error::Enrichment(format!("Malformed action item JSON: {}", e)))?,
    };

    Ok(items
        .into_iter()
        .filter(|item| !item.description.trim().is_empty())
        .collect())
}

/// Enrichment provider that prompts an LLM for summaries and action items and
/// asks the same backend for embeddings.
pub struct LlmEnrichmentProvider {
    backend: Arc<dyn InferenceBackend>,
    name: String,
}

impl LlmEnrichmentProvider {
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        let name = format!(
            "{}/{}",
            GenerationBackend::model_name(&*backend),
            EmbeddingBackend::model_name(&*backend)
        );
        Self { backend, name }
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }
}

#[async_trait]
impl EnrichmentProvider for LlmEnrichmentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, title, text), fields(subsystem = "inference", component = "provider", op = "summarize", input_len = text.len()))]
    async fn summarize(&self, title: &str, text: &str) -> Result<String> {
        let raw = self
            .backend
            .generate_with_system(prompts::SYSTEM_PROMPT, &prompts::summary_prompt(title, text))
            .await?;
        let summary = strip_thinking(&raw);
        if summary.is_empty() {
            return Err(Error::Enrichment("Model returned an empty summary".to_string()));
        }
        Ok(summary)
    }

    #[instrument(skip(self, text), fields(subsystem = "inference", component = "provider", op = "embed", input_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vector> {
        let vectors = self.backend.embed_texts(&[text.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Enrichment("Backend returned no embedding".to_string()))?;

        let expected = self.backend.dimension();
        let actual = vector.as_slice().len();
        if actual != expected {
            return Err(Error::Enrichment(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                expected, actual
            )));
        }
        Ok(vector)
    }

    #[instrument(skip(self, text), fields(subsystem = "inference", component = "provider", op = "extract_action_items", input_len = text.len()))]
    async fn extract_action_items(&self, text: &str) -> Result<Vec<ActionItem>> {
        let raw = self
            .backend
            .generate_with_system(prompts::SYSTEM_PROMPT, &prompts::action_items_prompt(text))
            .await?;
        let items = parse_action_items(&raw)?;
        debug!(item_count = items.len(), "Action items extracted");
        Ok(items)
    }
}
