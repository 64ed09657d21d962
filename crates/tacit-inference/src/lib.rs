//! # tacit-inference
//!
//! Enrichment backends for tacit.
//!
//! This crate provides:
//! - Ollama backend (feature `ollama`, default)
//! - OpenAI-compatible backend (feature `openai`, default)
//! - [`LlmEnrichmentProvider`], which turns a backend into summaries,
//!   embeddings and action items
//! - [`build_provider`] for env-driven construction
//! - A deterministic mock provider (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use tacit_inference::{build_provider, InferenceConfig};
//!
//! let provider = build_provider(&InferenceConfig::from_env().unwrap()).unwrap();
//! ```

pub mod config;
pub mod prompts;
pub mod provider;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::{build_provider, BackendKind, InferenceConfig};
pub use provider::{parse_action_items, strip_thinking, LlmEnrichmentProvider};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaBackend, OllamaConfig};

#[cfg(feature = "openai")]
pub use openai::{OpenAIBackend, OpenAIConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBehavior, MockEnrichmentProvider};
