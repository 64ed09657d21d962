//! Named registry of capture and export adapters.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tacit_core::{CaptureAdapter, ExportAdapter, Result, ThreadNotification};

use crate::confluence::{ConfluenceConfig, ConfluenceExportAdapter};
use crate::notion::{NotionConfig, NotionExportAdapter};
use crate::slack::{SlackCaptureAdapter, SlackConfig};
use crate::teams::{TeamsCaptureAdapter, TeamsConfig};

/// Adapters keyed by their `Integration::name`.
///
/// Registering an adapter under a name that already exists replaces it.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    capture: BTreeMap<String, Arc<dyn CaptureAdapter>>,
    export: BTreeMap<String, Arc<dyn ExportAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adapter whose credentials are present in the environment.
    ///
    /// Capture adapters forward listener notifications to `notifications`
    /// when it is given. Credentials that are present but invalid fail with
    /// `Error::Config`.
    pub fn from_env(notifications: Option<mpsc::Sender<ThreadNotification>>) -> Result<Self> {
        let mut registry = Self::new();

        if let Some(config) = SlackConfig::from_env() {
            let mut adapter = SlackCaptureAdapter::new(config)?;
            if let Some(tx) = notifications.clone() {
                adapter = adapter.with_notifications(tx);
            }
            registry.register_capture(Arc::new(adapter));
        }
        if let Some(config) = TeamsConfig::from_env() {
            let mut adapter = TeamsCaptureAdapter::new(config)?;
            if let Some(tx) = notifications {
                adapter = adapter.with_notifications(tx);
            }
            registry.register_capture(Arc::new(adapter));
        }
        if let Some(config) = NotionConfig::from_env() {
            registry.register_export(Arc::new(NotionExportAdapter::new(config)?));
        }
        if let Some(config) = ConfluenceConfig::from_env() {
            registry.register_export(Arc::new(ConfluenceExportAdapter::new(config)?));
        }

        info!(
            subsystem = "integrations",
            component = "registry",
            capture = ?registry.capture_names(),
            export = ?registry.export_names(),
            "Adapters configured"
        );
        Ok(registry)
    }

    pub fn register_capture(&mut self, adapter: Arc<dyn CaptureAdapter>) {
        self.capture.insert(adapter.name().to_string(), adapter);
    }

    pub fn register_export(&mut self, adapter: Arc<dyn ExportAdapter>) {
        self.export.insert(adapter.name().to_string(), adapter);
    }

    pub fn capture(&self, name: &str) -> Option<Arc<dyn CaptureAdapter>> {
        self.capture.get(&name.to_lowercase()).cloned()
    }

    pub fn export(&self, name: &str) -> Option<Arc<dyn ExportAdapter>> {
        self.export.get(&name.to_lowercase()).cloned()
    }

    pub fn capture_names(&self) -> Vec<&str> {
        self.capture.keys().map(String::as_str).collect()
    }

    pub fn export_names(&self) -> Vec<&str> {
        self.export.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.capture.is_empty() && self.export.is_empty()
    }

    /// Connect every adapter. Returns the names that failed.
    pub async fn connect_all(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for (name, adapter) in &self.capture {
            if !adapter.connect().await {
                failed.push(name.clone());
            }
        }
        for (name, adapter) in &self.export {
            if !adapter.connect().await {
                failed.push(name.clone());
            }
        }
        if !failed.is_empty() {
            warn!(
                subsystem = "integrations",
                component = "registry",
                failed = ?failed,
                "Some adapters failed to connect"
            );
        }
        failed
    }

    /// Stop listeners and disconnect everything.
    pub async fn shutdown(&self) {
        for (name, adapter) in &self.capture {
            if let Err(e) = adapter.stop_listening().await {
                warn!(subsystem = "integrations", component = "registry", adapter = %name, error = %e, "Failed to stop listener");
            }
            adapter.disconnect().await;
        }
        for adapter in self.export.values() {
            adapter.disconnect().await;
        }
    }
}
