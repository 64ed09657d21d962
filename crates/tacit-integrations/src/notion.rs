//! Notion export adapter.
//!
//! Each knowledge item becomes a child page of a configured parent page.
//! Notion caps a create request at 100 blocks and a rich text run at 2000
//! characters; longer content is split and appended in batches.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use tacit_core::content::truncate_chars;
use tacit_core::defaults::ADAPTER_TIMEOUT_SECS;
use tacit_core::{ContentMessage, Error, ExportAdapter, ExportResult, Integration, Result};

use crate::http::{build_client, status_detail, trim_base, ConnectionState};

/// Default Notion API base.
pub const DEFAULT_NOTION_API: &str = "https://api.notion.com/v1";

/// API version header value.
pub const NOTION_VERSION: &str = "2022-06-28";

const MAX_BLOCKS_PER_REQUEST: usize = 100;
const MAX_RICH_TEXT_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub base_url: String,
    pub token: String,
    pub parent_page_id: String,
    pub timeout_secs: u64,
}

impl NotionConfig {
    pub fn new(token: impl Into<String>, parent_page_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_NOTION_API.to_string(),
            token: token.into(),
            parent_page_id: parent_page_id.into(),
            timeout_secs: ADAPTER_TIMEOUT_SECS,
        }
    }

    /// `None` unless `NOTION_TOKEN` and `NOTION_PARENT_PAGE_ID` are set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("NOTION_TOKEN").ok().filter(|v| !v.is_empty())?;
        let parent = std::env::var("NOTION_PARENT_PAGE_ID")
            .ok()
            .filter(|v| !v.is_empty())?;
        let mut config = Self::new(token, parent);
        if let Ok(base) = std::env::var("NOTION_API_BASE") {
            config.base_url = base;
        }
        Some(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() || self.parent_page_id.trim().is_empty() {
            return Err(Error::Config(
                "Notion token and parent page id are required".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!(
                "Invalid Notion API base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn chunk_chars(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars.chunks(max).map(|c| c.iter().collect()).collect()
}

/// Page titles are a single rich text run.
fn page_title(title: &str) -> String {
    truncate_chars(title.trim(), MAX_RICH_TEXT_CHARS)
}

fn text_run(content: &str, bold: bool) -> Value {
    json!({
        "type": "text",
        "text": {"content": content},
        "annotations": {"bold": bold}
    })
}

fn paragraph(runs: Vec<Value>) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {"rich_text": runs}
    })
}

/// Render the conversation as Notion blocks.
pub fn render_blocks(content: &[ContentMessage], tags: &[String]) -> Vec<Value> {
    let mut blocks = Vec::with_capacity(content.len() + 3);
    if !tags.is_empty() {
        blocks.push(paragraph(vec![
            text_run("Tags: ", true),
            text_run(&tags.join(", "), false),
        ]));
    }
    blocks.push(json!({
        "object": "block",
        "type": "heading_2",
        "heading_2": {"rich_text": [text_run("Conversation", false)]}
    }));
    for message in content {
        let mut runs = vec![text_run(&format!("{}: ", message.author), true)];
        runs.extend(
            chunk_chars(&message.text, MAX_RICH_TEXT_CHARS)
                .iter()
                .map(|chunk| text_run(chunk, false)),
        );
        blocks.push(paragraph(runs));
    }
    blocks
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

/// A failed export. `page` is set when the page was created but appending
/// later blocks failed, leaving a partial page behind.
#[derive(Debug)]
struct PageError {
    message: String,
    page: Option<CreatedPage>,
}

impl From<String> for PageError {
    fn from(message: String) -> Self {
        Self {
            message,
            page: None,
        }
    }
}

impl PageError {
    fn into_result(self) -> ExportResult {
        match self.page {
            Some(page) => ExportResult {
                external_id: Some(page.id.clone()),
                url: page.url,
                ..ExportResult::failed(format!(
                    "{} (partial page {} left in Notion)",
                    self.message, page.id
                ))
            },
            None => ExportResult::failed(self.message),
        }
    }
}

/// Export adapter writing pages into a Notion workspace.
pub struct NotionExportAdapter {
    http: reqwest::Client,
    config: NotionConfig,
    state: ConnectionState,
}

impl NotionExportAdapter {
    pub fn new(config: NotionConfig) -> Result<Self> {
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
            .bearer_auth(&self.config.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn create_page(&self, title: &str, blocks: &[Value]) -> std::result::Result<CreatedPage, PageError> {
        let (first, rest) = blocks.split_at(blocks.len().min(MAX_BLOCKS_PER_REQUEST));
        let body = json!({
            "parent": {"page_id": self.config.parent_page_id},
            "properties": {
                "title": {"title": [{"text": {"content": page_title(title)}}]}
            },
            "children": first,
        });

        let response = self
            .request(reqwest::Method::POST, "/pages")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Notion request failed: {}", e))?;
        if !response.status().is_success() {
            return Err(status_detail("Notion", response).await.into());
        }
        let page: CreatedPage = response
            .json()
            .await
            .map_err(|e| format!("Notion returned an unreadable body: {}", e))?;

        for batch in rest.chunks(MAX_BLOCKS_PER_REQUEST) {
            if let Err(message) = self.append_blocks(&page.id, batch).await {
                return Err(PageError {
                    message,
                    page: Some(page),
                });
            }
        }
        Ok(page)
    }

    async fn append_blocks(&self, page_id: &str, batch: &[Value]) -> std::result::Result<(), String> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/blocks/{}/children", page_id))
            .json(&json!({ "children": batch }))
            .send()
            .await
            .map_err(|e| format!("Notion append failed: {}", e))?;
        if !response.status().is_success() {
            return Err(status_detail("Notion", response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl Integration for NotionExportAdapter {
    fn name(&self) -> &str {
        "notion"
    }

    async fn connect(&self) -> bool {
        let ok = match self.test_connection().await {
            Ok(()) => true,
            Err(e) => {
                warn!(subsystem = "integrations", component = "notion", error = %e, "Notion connection failed");
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
            .request(reqwest::Method::GET, "/users/me")
            .send()
            .await
            .map_err(|e| Error::AdapterConnection(format!("Notion request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::AdapterConnection(
                status_detail("Notion", response).await,
            ));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.get()
    }
}

#[async_trait]
impl ExportAdapter for NotionExportAdapter {
    #[instrument(skip(self, content, tags), fields(subsystem = "integrations", component = "notion", op = "export", message_count = content.len()))]
    async fn export_knowledge(
        &self,
        title: &str,
        content: &[ContentMessage],
        tags: &[String],
    ) -> ExportResult {
        if !self.state.get() && !self.connect().await {
            return ExportResult::failed("Notion is not connected");
        }
        let blocks = render_blocks(content, tags);
        match self.create_page(title, &blocks).await {
            Ok(page) => {
                info!(external_id = %page.id, "Exported to Notion");
                ExportResult::ok(page.id, page.url)
            }
            Err(error) => {
                warn!(
                    error = %error.message,
                    partial_page = ?error.page.as_ref().map(|p| &p.id),
                    "Notion export failed"
                );
                error.into_result()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_blocks_layout() {
        let content = vec![ContentMessage::new("X", "Y")];
        let blocks = render_blocks(&content, &["ops".to_string()]);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1]["type"], "heading_2");
        let runs = &blocks[2]["paragraph"]["rich_text"];
        assert_eq!(runs[0]["text"]["content"], "X: ");
        assert_eq!(runs[0]["annotations"]["bold"], true);
        assert_eq!(runs[1]["text"]["content"], "Y");
    }

    #[test]
    fn test_long_text_split_into_runs() {
        let content = vec![ContentMessage::new("A", "x".repeat(4500))];
        let blocks = render_blocks(&content, &[]);
        let runs = blocks[1]["paragraph"]["rich_text"].as_array().unwrap();
        assert_eq!(runs.len(), 1 + 3);
    }

    #[test]
    fn test_page_title_capped() {
        let title = "é".repeat(MAX_RICH_TEXT_CHARS + 10);
        assert_eq!(page_title(&title).chars().count(), MAX_RICH_TEXT_CHARS);
        assert_eq!(page_title("  Deploy freeze "), "Deploy freeze");
    }

    #[test]
    fn test_chunk_chars_multibyte() {
        let chunks = chunk_chars("ééé", 2);
        assert_eq!(chunks, vec!["éé".to_string(), "é".to_string()]);
    }
}
