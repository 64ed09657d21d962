//! # tacit-integrations
//!
//! Integration adapters for tacit.
//!
//! Capture adapters pull conversation threads out of chat platforms and
//! normalize them into [`tacit_core::CapturedThread`]. Export adapters publish
//! finished knowledge items to external document stores.
//!
//! | adapter | kind | platform API |
//! |---------|------|--------------|
//! | [`SlackCaptureAdapter`] | capture | Slack Web API |
//! | [`TeamsCaptureAdapter`] | capture | Microsoft Graph |
//! | [`NotionExportAdapter`] | export | Notion API |
//! | [`ConfluenceExportAdapter`] | export | Confluence Cloud REST |
//!
//! Adapters connect lazily: the first capture or export call runs
//! `connect()` if it has not succeeded yet.

pub mod confluence;
mod http;
pub mod listener;
pub mod notion;
pub mod registry;
pub mod slack;
pub mod teams;

pub use confluence::{ConfluenceConfig, ConfluenceExportAdapter};
pub use listener::{ListenerSlot, ThreadPoller};
pub use notion::{NotionConfig, NotionExportAdapter};
pub use registry::AdapterRegistry;
pub use slack::{verify_slack_signature, SlackCaptureAdapter, SlackConfig};
pub use teams::{TeamsCaptureAdapter, TeamsConfig};
