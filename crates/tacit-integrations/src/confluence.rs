//! Confluence Cloud export adapter.
//!
//! Pages are created in a configured space using the storage (XHTML) format.
//! Tags become page labels.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use tacit_core::defaults::ADAPTER_TIMEOUT_SECS;
use tacit_core::{ContentMessage, Error, ExportAdapter, ExportResult, Integration, Result};

use crate::http::{build_client, status_detail, trim_base, ConnectionState};

#[derive(Debug, Clone)]
pub struct ConfluenceConfig {
    /// Site root, e.g. `https://acme.atlassian.net/wiki`.
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub space_key: String,
    pub timeout_secs: u64,
}

impl ConfluenceConfig {
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        api_token: impl Into<String>,
        space_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            email: email.into(),
            api_token: api_token.into(),
            space_key: space_key.into(),
            timeout_secs: ADAPTER_TIMEOUT_SECS,
        }
    }

    /// `None` unless all four `CONFLUENCE_*` variables are set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Some(Self::new(
            var("CONFLUENCE_BASE_URL")?,
            var("CONFLUENCE_EMAIL")?,
            var("CONFLUENCE_API_TOKEN")?,
            var("CONFLUENCE_SPACE_KEY")?,
        ))
    }

    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty()
            || self.api_token.trim().is_empty()
            || self.space_key.trim().is_empty()
        {
            return Err(Error::Config(
                "Confluence email, API token and space key are required".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!(
                "Invalid Confluence base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.email, self.api_token);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

/// Escape text for the Confluence storage format.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the conversation as a storage-format body.
pub fn render_storage(content: &[ContentMessage]) -> String {
    let mut body = String::from("<h2>Conversation</h2>");
    for message in content {
        let text = escape_html(&message.text).replace('\n', "<br/>");
        body.push_str(&format!(
            "<p><strong>{}:</strong> {}</p>",
            escape_html(&message.author),
            text
        ));
    }
    body
}

/// Confluence labels may not contain whitespace.
fn label_name(tag: &str) -> Option<String> {
    let label: String = tag
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect();
    (!label.is_empty()).then_some(label)
}

#[derive(Debug, Deserialize)]
struct CreatedContent {
    id: String,
    #[serde(default, rename = "_links")]
    links: Option<ContentLinks>,
}

#[derive(Debug, Deserialize)]
struct ContentLinks {
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    webui: Option<String>,
}

impl CreatedContent {
    fn page_url(&self, fallback_base: &str) -> Option<String> {
        let links = self.links.as_ref()?;
        let webui = links.webui.as_deref()?;
        let base = links.base.as_deref().unwrap_or(fallback_base);
        Some(format!("{}{}", trim_base(base), webui))
    }
}

/// Export adapter writing pages into a Confluence space.
pub struct ConfluenceExportAdapter {
    http: reqwest::Client,
    config: ConfluenceConfig,
    state: ConnectionState,
}

impl ConfluenceExportAdapter {
    pub fn new(config: ConfluenceConfig) -> Result<Self> {
        config.validate()?;
        let http = build_client(config.timeout_secs)?;
        Ok(Self {
            http,
            config,
            state: ConnectionState::default(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", trim_base(&self.config.base_url), path))
            .header(reqwest::header::AUTHORIZATION, self.config.authorization())
    }

    /// `{base}/rest/api/space/{key}` with the key percent-encoded as one
    /// path segment.
    fn space_url(&self) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.config.base_url)
            .map_err(|e| Error::Config(format!("Invalid Confluence base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!(
                    "Confluence base URL cannot carry a path: {}",
                    self.config.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["rest", "api", "space", self.config.space_key.trim()]);
        Ok(url)
    }

    async fn create_page(
        &self,
        title: &str,
        content: &[ContentMessage],
        tags: &[String],
    ) -> std::result::Result<CreatedContent, String> {
        let labels: Vec<_> = tags
            .iter()
            .filter_map(|t| label_name(t))
            .map(|name| json!({"prefix": "global", "name": name}))
            .collect();
        let body = json!({
            "type": "page",
            "title": title,
            "space": {"key": self.config.space_key},
            "body": {
                "storage": {
                    "value": render_storage(content),
                    "representation": "storage"
                }
            },
            "metadata": {"labels": labels}
        });

        let response = self
            .request(reqwest::Method::POST, "/rest/api/content")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Confluence request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(status_detail("Confluence", response).await);
        }
        response
            .json::<CreatedContent>()
            .await
            .map_err(|e| format!("Confluence returned an unreadable body: {}", e))
    }
}

#[async_trait]
impl Integration for ConfluenceExportAdapter {
    fn name(&self) -> &str {
        "confluence"
    }

    async fn connect(&self) -> bool {
        let ok = match self.test_connection().await {
            Ok(()) => true,
            Err(e) => {
                warn!(subsystem = "integrations", component = "confluence", error = %e, "Confluence connection failed");
                false
            }
        };
        self.state.set(ok);
        ok
    }

    async fn disconnect(&self) {
        self.state.set(false);
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .http
            .get(self.space_url()?)
            .header(reqwest::header::AUTHORIZATION, self.config.authorization())
            .send()
            .await
            .map_err(|e| Error::AdapterConnection(format!("Confluence request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::AdapterConnection(
                status_detail("Confluence", response).await,
            ));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.get()
    }
}

#[async_trait]
impl ExportAdapter for ConfluenceExportAdapter {
    #[instrument(skip(self, content, tags), fields(subsystem = "integrations", component = "confluence", op = "export", message_count = content.len()))]
    async fn export_knowledge(
        &self,
        title: &str,
        content: &[ContentMessage],
        tags: &[String],
    ) -> ExportResult {
        if !self.state.get() && !self.connect().await {
            return ExportResult::failed("Confluence is not connected");
        }
        match self.create_page(title, content, tags).await {
            Ok(page) => {
                let url = page.page_url(&self.config.base_url);
                info!(external_id = %page.id, "Exported to Confluence");
                ExportResult::ok(page.id, url)
            }
            Err(error) => {
                warn!(error = %error, "Confluence export failed");
                ExportResult::failed(error)
            }
        }
    }
}
