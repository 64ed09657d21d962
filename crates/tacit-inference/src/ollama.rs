//! Ollama backend: `/api/embed` for vectors, `/api/chat` for summaries and
//! action items.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use tacit_core::{EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Vector};

pub const DEFAULT_OLLAMA_URL: &str = tacit_core::defaults::OLLAMA_URL;

pub const DEFAULT_EMBED_MODEL: &str = tacit_core::defaults::EMBED_MODEL;

pub const DEFAULT_GEN_MODEL: &str = tacit_core::defaults::GEN_MODEL;

/// Output width of nomic-embed-text.
pub const DEFAULT_DIMENSION: usize = tacit_core::defaults::EMBED_DIMENSION;

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Settings for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub gen_model: String,
    pub dimension: usize,
    pub embed_timeout_secs: u64,
    pub gen_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            gen_model: DEFAULT_GEN_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
            embed_timeout_secs: tacit_core::defaults::EMBED_TIMEOUT_SECS,
            gen_timeout_secs: tacit_core::defaults::GEN_TIMEOUT_SECS,
        }
    }
}

impl OllamaConfig {
    /// Read `OLLAMA_BASE`, `OLLAMA_EMBED_MODEL`, `OLLAMA_GEN_MODEL`,
    /// `OLLAMA_EMBED_DIM`, `TACIT_EMBED_TIMEOUT_SECS` and
    /// `TACIT_GEN_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OLLAMA_BASE").unwrap_or(defaults.base_url),
            embed_model: std::env::var("OLLAMA_EMBED_MODEL").unwrap_or(defaults.embed_model),
            gen_model: std::env::var("OLLAMA_GEN_MODEL").unwrap_or(defaults.gen_model),
            dimension: parsed_env("OLLAMA_EMBED_DIM").unwrap_or(defaults.dimension),
            embed_timeout_secs: parsed_env("TACIT_EMBED_TIMEOUT_SECS")
                .unwrap_or(defaults.embed_timeout_secs),
            gen_timeout_secs: parsed_env("TACIT_GEN_TIMEOUT_SECS")
                .unwrap_or(defaults.gen_timeout_secs),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!(
                "Invalid Ollama base URL: {}",
                self.base_url
            )));
        }
        if self.dimension == 0 {
            return Err(Error::Config(
                "Embedding dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ollama inference backend.
pub struct OllamaBackend {
    client: Client,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a backend, validating the configuration.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.gen_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "ollama",
            url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            "Initializing Ollama backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(OllamaConfig::from_env())
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    /// POST `body` to `endpoint` and decode the reply. Transport errors,
    /// non-2xx statuses and undecodable bodies all map to `Error::Enrichment`.
    async fn post_json<B, R>(&self, endpoint: &str, body: &B, timeout: Duration) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.url(endpoint))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Enrichment(format!("ollama {}: {}", endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Enrichment(format!(
                "ollama {} answered {}: {}",
                endpoint, status, detail
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Enrichment(format!("ollama {} reply undecodable: {}", endpoint, e)))
    }
}

const SLOW_GENERATION_MS: u64 = 30_000;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %self.config.embed_model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let started = Instant::now();
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
        };
        let result: EmbeddingResponse = self
            .post_json(
                "/api/embed",
                &request,
                Duration::from_secs(self.config.embed_timeout_secs),
            )
            .await?;

        let vectors: Vec<Vector> = result.embeddings.into_iter().map(Vector::from).collect();

        if vectors.len() != texts.len() {
            return Err(Error::Enrichment(format!(
                "ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Embedded {} texts",
            vectors.len()
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    #[instrument(skip(self, system, prompt), fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.config.gen_model, prompt_len = prompt.len()))]
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let messages: Vec<ChatMessage<'_>> = [("system", system), ("user", prompt)]
            .into_iter()
            .filter(|(_, content)| !content.is_empty())
            .map(|(role, content)| ChatMessage { role, content })
            .collect();

        let request = ChatRequest {
            model: &self.config.gen_model,
            messages,
            stream: false,
        };
        let reply: ChatResponse = self
            .post_json(
                "/api/chat",
                &request,
                Duration::from_secs(self.config.gen_timeout_secs),
            )
            .await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > SLOW_GENERATION_MS {
            warn!(duration_ms = elapsed_ms, "Slow generation");
        } else {
            debug!(duration_ms = elapsed_ms, "Generated {} chars", reply.message.content.len());
        }
        Ok(reply.message.content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn health_check(&self) -> Result<bool> {
        let healthy = match self
            .client
            .get(self.url("/api/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Ollama unreachable");
                false
            }
        };
        if !healthy {
            warn!(url = %self.config.base_url, "Ollama health check failed");
        }
        Ok(healthy)
    }
}
