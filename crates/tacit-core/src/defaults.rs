//! Centralized default constants for tacit.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// TENANCY
// =============================================================================

/// Leading host labels that never identify a tenant.
pub const RESERVED_SUBDOMAINS: &[&str] = &["www", "app", "api", "admin"];

/// Platform base domain used when `TACIT_BASE_DOMAIN` is unset.
pub const BASE_DOMAIN: &str = "tacit.localhost";

/// Tenant resolution cache TTL in seconds.
pub const TENANT_CACHE_TTL_SECS: u64 = 60;

/// Tenant resolution cache capacity.
pub const TENANT_CACHE_CAPACITY: usize = 1024;

// =============================================================================
// ENRICHMENT
// =============================================================================

/// Summary stored when the enrichment provider fails.
pub const FALLBACK_SUMMARY: &str = "Summary unavailable";

/// Per-call timeout for enrichment provider requests (seconds).
pub const ENRICH_TIMEOUT_SECS: u64 = 30;

/// Maximum characters of normalized content sent to the provider.
pub const ENRICH_MAX_INPUT_CHARS: usize = 24_000;

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model (Ollama).
pub const GEN_MODEL: &str = "llama3.1:8b";

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// INTEGRATIONS
// =============================================================================

/// Timeout for a single adapter HTTP request (seconds).
pub const ADAPTER_TIMEOUT_SECS: u64 = 20;

/// Page size requested from chat platform list endpoints.
pub const ADAPTER_PAGE_SIZE: u32 = 200;

/// Maximum pages followed when fetching a single thread.
pub const ADAPTER_MAX_PAGES: usize = 25;

/// Interval between polls for listening capture adapters (seconds).
pub const LISTEN_POLL_INTERVAL_SECS: u64 = 30;

/// Capacity of the notification channel fed by listeners.
pub const LISTEN_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for list operations.
pub const PAGE_LIMIT: i64 = 50;

/// Hard upper bound for list operations.
pub const PAGE_LIMIT_MAX: i64 = 500;

// =============================================================================
// TAGS
// =============================================================================

/// Maximum tag name length in characters.
pub const TAG_MAX_LEN: usize = 64;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind address.
pub const BIND_ADDR: &str = "0.0.0.0:3000";
