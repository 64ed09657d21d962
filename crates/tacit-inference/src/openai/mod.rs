//! OpenAI-compatible inference backend.
//!
//! Works with the OpenAI cloud API and with self-hosted servers that speak
//! the same protocol (vLLM, LocalAI, LM Studio, Ollama's `/v1` mode).
//!
//! ```rust,no_run
//! use tacit_inference::openai::{OpenAIBackend, OpenAIConfig};
//!
//! let backend = OpenAIBackend::new(OpenAIConfig {
//!     base_url: "http://localhost:11434/v1".to_string(),
//!     api_key: None,
//!     ..Default::default()
//! });
//! assert!(backend.is_ok());
//! ```

mod backend;
mod types;

pub use backend::{
    OpenAIBackend, OpenAIConfig, DEFAULT_DIMENSION, DEFAULT_EMBED_MODEL, DEFAULT_GEN_MODEL,
    DEFAULT_OPENAI_URL, DEFAULT_TIMEOUT_SECS,
};
pub use types::*;
