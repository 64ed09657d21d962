//! # tacit-core
//!
//! Domain model shared by every tacit crate: tenants, roles and plans,
//! knowledge items, the closed `Error` enum, and the repository, inference
//! and integration traits the other crates implement.

pub mod content;
pub mod defaults;
pub mod error;
pub mod host;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use content::{derive_title, enrichment_input, is_blank, normalize_content, shorten_title};
pub use error::{Error, Result};
pub use host::{parse_host, TenantLookup};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;

// Re-export pgvector Vector type for convenience
pub use pgvector::Vector;
