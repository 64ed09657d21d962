//! Client for `/embeddings`, `/chat/completions` and `/models`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use tacit_core::{EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Vector};

use super::types::*;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-small";

pub const DEFAULT_GEN_MODEL: &str = "gpt-4o-mini";

/// Output width of text-embedding-3-small.
pub const DEFAULT_DIMENSION: usize = 1536;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Low temperature keeps summaries close to the conversation.
const GENERATION_TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    /// Required for api.openai.com, optional for self-hosted servers.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    pub embed_dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            embed_dimension: DEFAULT_DIMENSION,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Read `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `OPENAI_EMBED_MODEL`,
    /// `OPENAI_GEN_MODEL`, `OPENAI_EMBED_DIM` and `OPENAI_TIMEOUT`.
    pub fn from_env() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            base_url: env("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: env("OPENAI_API_KEY"),
            embed_model: env("OPENAI_EMBED_MODEL").unwrap_or(defaults.embed_model),
            gen_model: env("OPENAI_GEN_MODEL").unwrap_or(defaults.gen_model),
            embed_dimension: env("OPENAI_EMBED_DIM")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.embed_dimension),
            timeout_seconds: env("OPENAI_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_seconds),
        }
    }

    /// Hosted OpenAI needs a key; self-hosted compatible servers do not.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid OpenAI base URL {}: {}", self.base_url, e)))?;
        if url.host_str() == Some("api.openai.com") && self.api_key.is_none() {
            return Err(Error::Config(
                "OPENAI_API_KEY is required for api.openai.com".to_string(),
            ));
        }
        if self.embed_dimension == 0 {
            return Err(Error::Config(
                "Embedding dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// OpenAI-compatible inference backend.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    /// Create a backend. Missing credentials are a construction error.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing OpenAI backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env())
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// POST `body` to `endpoint` with bearer auth when a key is set.
    async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(endpoint)).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::Enrichment(format!("openai {}: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| Error::Enrichment(format!("openai {} reply undecodable: {}", endpoint, e)))
    }
}

/// Turn a non-2xx reply into an enrichment error carrying the status and
/// the server's own message when it sent one.
async fn rejection(response: reqwest::Response) -> Error {
    let status = response.status();
    let hint = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "check OPENAI_API_KEY",
        StatusCode::TOO_MANY_REQUESTS => "rate limited or out of quota",
        StatusCode::NOT_FOUND => "unknown model or endpoint",
        s if s.is_server_error() => "provider outage",
        _ => "request rejected",
    };
    let message = match response.json::<ErrorEnvelope>().await {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("{} [{}]", envelope.error.message, kind),
            None => envelope.error.message,
        },
        Err(_) => "no error body".to_string(),
    };
    Error::Enrichment(format!("openai returned {} ({}): {}", status, hint, message))
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "openai", op = "embed_texts", model = %self.config.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let started = Instant::now();
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
            encoding_format: Some("float"),
        };
        let mut reply: EmbeddingResponse = self.post_json("/embeddings", &request).await?;

        // Order by input position; servers do not promise it.
        reply.data.sort_by_key(|d| d.index);
        if reply.data.len() != texts.len() {
            return Err(Error::Enrichment(format!(
                "openai returned {} embeddings for {} inputs",
                reply.data.len(),
                texts.len()
            )));
        }
        let vectors: Vec<Vector> = reply
            .data
            .into_iter()
            .map(|d| Vector::from(d.embedding))
            .collect();

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Embedded {} texts",
            vectors.len()
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "openai", op = "generate", model = %self.config.gen_model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let messages = [("system", system), ("user", prompt)]
            .into_iter()
            .filter(|(_, content)| !content.is_empty())
            .map(|(role, content)| ChatMessage { role, content })
            .collect();
        let request = ChatCompletionRequest {
            model: &self.config.gen_model,
            messages,
            temperature: Some(GENERATION_TEMPERATURE),
            stream: false,
        };
        let reply: ChatCompletionResponse = self.post_json("/chat/completions", &request).await?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Enrichment("openai completion had no content".to_string()))?;

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Generated {} chars",
            content.len()
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl InferenceBackend for OpenAIBackend {
    async fn health_check(&self) -> Result<bool> {
        let mut request = self
            .client
            .get(self.url("/models"))
            .timeout(Duration::from_secs(5));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let healthy = match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "OpenAI endpoint unreachable");
                false
            }
        };
        if !healthy {
            warn!(url = %self.config.base_url, "OpenAI health check failed");
        }
        Ok(healthy)
    }
}
