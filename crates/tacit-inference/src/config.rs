//! Backend selection for the enrichment provider.
//!
//! `TACIT_INFERENCE_BACKEND` picks the backend (`ollama` by default). The
//! provider is built once at startup and handed to the pipeline, so a
//! missing credential fails here rather than on the first ingest.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use tacit_core::{EnrichmentProvider, Error, InferenceBackend, Result};

#[cfg(feature = "ollama")]
use crate::ollama::{OllamaBackend, OllamaConfig};
#[cfg(feature = "openai")]
use crate::openai::{OpenAIBackend, OpenAIConfig};
use crate::provider::LlmEnrichmentProvider;

/// Inference backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Ollama,
    OpenAI,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!(
                "Unknown inference backend '{}' (expected ollama or openai)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

/// Selected backend plus its settings.
#[derive(Debug, Clone)]
pub enum InferenceConfig {
    #[cfg(feature = "ollama")]
    Ollama(OllamaConfig),
    #[cfg(feature = "openai")]
    OpenAI(OpenAIConfig),
}

impl InferenceConfig {
    pub fn from_env() -> Result<Self> {
        let kind = match std::env::var("TACIT_INFERENCE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => BackendKind::default(),
        };
        Self::for_kind(kind)
    }

    pub fn for_kind(kind: BackendKind) -> Result<Self> {
        match kind {
            #[cfg(feature = "ollama")]
            BackendKind::Ollama => Ok(Self::Ollama(OllamaConfig::from_env())),
            #[cfg(feature = "openai")]
            BackendKind::OpenAI => Ok(Self::OpenAI(OpenAIConfig::from_env())),
            #[allow(unreachable_patterns)]
            other => Err(Error::Config(format!(
                "Inference backend '{}' is not compiled in",
                other
            ))),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            #[cfg(feature = "ollama")]
            Self::Ollama(_) => BackendKind::Ollama,
            #[cfg(feature = "openai")]
            Self::OpenAI(_) => BackendKind::OpenAI,
        }
    }

    pub fn build_backend(&self) -> Result<Arc<dyn InferenceBackend>> {
        let backend: Arc<dyn InferenceBackend> = match self {
            #[cfg(feature = "ollama")]
            Self::Ollama(cfg) => Arc::new(OllamaBackend::new(cfg.clone())?),
            #[cfg(feature = "openai")]
            Self::OpenAI(cfg) => Arc::new(OpenAIBackend::new(cfg.clone())?),
        };
        Ok(backend)
    }
}

/// Construct the enrichment provider for a configuration.
pub fn build_provider(config: &InferenceConfig) -> Result<Arc<dyn EnrichmentProvider>> {
    let backend = config.build_backend()?;
    let provider = LlmEnrichmentProvider::new(backend);
    info!(
        subsystem = "inference",
        component = "config",
        backend = %config.kind(),
        provider = %provider.name(),
        "Enrichment provider ready"
    );
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!(" openai ".parse::<BackendKind>().unwrap(), BackendKind::OpenAI);
        assert!(matches!(
            "bedrock".parse::<BackendKind>(),
            Err(Error::Config(_))
        ));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_build_provider_rejects_missing_openai_key() {
        let config = InferenceConfig::OpenAI(OpenAIConfig::default());
        assert!(matches!(build_provider(&config), Err(Error::Config(_))));
    }

    #[cfg(feature = "ollama")]
    #[test]
    fn test_build_provider_ollama() {
        let config = InferenceConfig::Ollama(OllamaConfig::default());
        let provider = build_provider(&config).unwrap();
        assert!(provider.name().starts_with("llama3.1:8b"));
    }
}
