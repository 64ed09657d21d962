//! Field names used in tacit's structured log events.
//!
//! `tracing` macros take field names as identifiers, so these constants are
//! the written-down vocabulary rather than something the macros read. Query
//! tooling and dashboards should use them; new fields go here first.
//!
//! Levels, by convention:
//!
//! - `error`: the operation failed and the caller sees it (persistence,
//!   adapter outage with no fallback).
//! - `warn`: something degraded but the operation continued (enrichment
//!   fallback, embedding skipped, access denied, export rejected).
//! - `info`: a tenant-visible state change (item ingested, exported,
//!   member added, tenant suspended).
//! - `debug`: resolver and gate decisions, provider choice.
//! - `trace`: per-message or per-page detail.

/// Crate-level origin: `api`, `db`, `inference`, `ingest`, `integrations`.
pub const SUBSYSTEM: &str = "subsystem";
/// Part of the subsystem, e.g. `pipeline`, `gate`, `resolver`, `slack`, `pool`.
pub const COMPONENT: &str = "component";
/// Operation being performed, e.g. `ingest`, `summarize`, `capture_thread`.
pub const OPERATION: &str = "op";
/// Set by the HTTP layer from `x-request-id`.
pub const REQUEST_ID: &str = "request_id";

pub const TENANT_ID: &str = "tenant_id";
pub const ACTOR_ID: &str = "actor_id";
pub const ITEM_ID: &str = "item_id";
pub const ROLE: &str = "role";
pub const PLAN: &str = "plan";

/// Integration name as registered, e.g. `slack` or `notion`.
pub const ADAPTER: &str = "adapter";
/// `channel/thread` reference of a captured conversation.
pub const THREAD_REF: &str = "thread_ref";
pub const MESSAGE_COUNT: &str = "message_count";

pub const MODEL: &str = "model";
/// Prompt size in bytes, logged instead of the prompt itself.
pub const PROMPT_LEN: &str = "prompt_len";
pub const DURATION_MS: &str = "duration_ms";

pub const POOL_SIZE: &str = "pool_size";
pub const POOL_IDLE: &str = "pool_idle";

/// Display form of the error that caused the event.
pub const ERROR_MSG: &str = "error";
/// Which enrichment output was replaced by its fallback.
pub const FALLBACK: &str = "fallback";

/// Every field name above.
pub const FIELD_NAMES: &[&str] = &[
    SUBSYSTEM,
    COMPONENT,
    OPERATION,
    REQUEST_ID,
    TENANT_ID,
    ACTOR_ID,
    ITEM_ID,
    ROLE,
    PLAN,
    ADAPTER,
    THREAD_REF,
    MESSAGE_COUNT,
    MODEL,
    PROMPT_LEN,
    DURATION_MS,
    POOL_SIZE,
    POOL_IDLE,
    ERROR_MSG,
    FALLBACK,
];
