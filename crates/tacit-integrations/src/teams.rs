//! Microsoft Teams capture adapter over Microsoft Graph.
//!
//! A thread is a channel message plus its replies. Replies are paged via
//! `@odata.nextLink`. Message bodies arrive as HTML and are reduced to text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use tacit_core::defaults::{ADAPTER_MAX_PAGES, ADAPTER_TIMEOUT_SECS, LISTEN_POLL_INTERVAL_SECS};
use tacit_core::{
    Attachment, CaptureAdapter, CapturedThread, Error, Integration, Result, SourceType,
    ThreadMessage, ThreadNotification, ThreadRef,
};

use crate::http::{build_client, read_json, trim_base, ConnectionState};
use crate::listener::{ListenerSlot, ThreadPoller};

/// Default Microsoft Graph base.
pub const DEFAULT_GRAPH_API: &str = "https://graph.microsoft.com/v1.0";

static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</p>|</div>|</li>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip Teams message HTML down to plain text.
pub fn html_to_text(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = TAG.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let text: Vec<&str> = text.lines().map(str::trim_end).collect();
    BLANK_LINES
        .replace_all(&text.join("\n"), "\n\n")
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct TeamsConfig {
    pub base_url: String,
    pub access_token: String,
    pub team_id: String,
    pub watch_channels: Vec<String>,
    pub timeout_secs: u64,
    pub max_pages: usize,
    pub poll_interval_secs: u64,
}

impl TeamsConfig {
    pub fn new(access_token: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_GRAPH_API.to_string(),
            access_token: access_token.into(),
            team_id: team_id.into(),
            watch_channels: Vec::new(),
            timeout_secs: ADAPTER_TIMEOUT_SECS,
            max_pages: ADAPTER_MAX_PAGES,
            poll_interval_secs: LISTEN_POLL_INTERVAL_SECS,
        }
    }

    /// `None` unless both `TEAMS_ACCESS_TOKEN` and `TEAMS_TEAM_ID` are set.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TEAMS_ACCESS_TOKEN").ok().filter(|v| !v.is_empty())?;
        let team = std::env::var("TEAMS_TEAM_ID").ok().filter(|v| !v.is_empty())?;
        let mut config = Self::new(token, team);
        if let Ok(base) = std::env::var("TEAMS_GRAPH_BASE") {
            config.base_url = base;
        }
        config.watch_channels = std::env::var("TEAMS_WATCH_CHANNELS")
            .map(|v| {
                v.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Some(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() || self.team_id.trim().is_empty() {
            return Err(Error::Config(
                "Teams access token and team id are required".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!(
                "Invalid Graph base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphChannel {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    created_date_time: DateTime<Utc>,
    #[serde(default)]
    last_modified_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    from: Option<GraphFrom>,
    body: GraphBody,
    #[serde(default)]
    attachments: Vec<GraphAttachment>,
    #[serde(default)]
    web_url: Option<String>,
    #[serde(default)]
    deleted_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GraphFrom {
    #[serde(default)]
    user: Option<GraphIdentity>,
    #[serde(default)]
    application: Option<GraphIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphIdentity {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_url: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
}

impl GraphMessage {
    fn author(&self) -> String {
        self.from
            .as_ref()
            .and_then(|f| {
                f.user
                    .as_ref()
                    .or(f.application.as_ref())
                    .and_then(|i| i.display_name.clone())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn text(&self) -> String {
        match self.body.content_type.as_deref() {
            Some(t) if t.eq_ignore_ascii_case("text") => self.body.content.trim().to_string(),
            _ => html_to_text(&self.body.content),
        }
    }

    fn into_thread_message(self) -> ThreadMessage {
        ThreadMessage {
            author: self.author(),
            content: self.text(),
            timestamp: self.created_date_time,
            attachments: self
                .attachments
                .into_iter()
                // Inline message references carry no file.
                .filter(|a| a.content_type.as_deref() != Some("messageReference"))
                .map(|a| Attachment {
                    name: a.name.unwrap_or_else(|| "attachment".to_string()),
                    url: a.content_url,
                    mime_type: a.content_type,
                    size_bytes: None,
                })
                .collect(),
            id: self.id,
        }
    }
}

struct GraphClient {
    http: Client,
    config: TeamsConfig,
}

impl GraphClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", trim_base(&self.config.base_url), path)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await;
        read_json("Microsoft Graph", response).await
    }

    fn channel_path(&self, channel_id: &str) -> String {
        format!("/teams/{}/channels/{}", self.config.team_id, channel_id)
    }

    async fn replies(&self, thread_ref: &ThreadRef) -> Result<Vec<GraphMessage>> {
        let mut url = Some(self.url(&format!(
            "{}/messages/{}/replies?$top=50",
            self.channel_path(&thread_ref.channel_id),
            thread_ref.thread_id
        )));
        let mut replies = Vec::new();
        let mut pages = 0;
        while let Some(next) = url.take() {
            if pages == self.config.max_pages {
                warn!(
                    subsystem = "integrations",
                    component = "teams",
                    thread_ref = %thread_ref,
                    "Thread truncated at page limit"
                );
                break;
            }
            let page: Page<GraphMessage> = self.get(&next).await?;
            pages += 1;
            debug!(page = pages, count = page.value.len(), "Fetched Teams replies page");
            replies.extend(page.value);
            url = page.next_link;
        }
        Ok(replies)
    }
}

struct TeamsPoller {
    client: Arc<GraphClient>,
}

#[async_trait]
impl ThreadPoller for TeamsPoller {
    async fn poll(&self, since: DateTime<Utc>) -> Result<Vec<ThreadRef>> {
        let mut refs = BTreeSet::new();
        for channel in &self.client.config.watch_channels {
            let url = self.client.url(&format!(
                "{}/messages?$top=50",
                self.client.channel_path(channel)
            ));
            let page: Page<GraphMessage> = self.client.get(&url).await?;
            for message in page.value {
                let changed = message.last_modified_date_time.unwrap_or(message.created_date_time);
                if changed > since {
                    refs.insert((channel.clone(), message.id));
                }
            }
        }
        Ok(refs
            .into_iter()
            .map(|(channel, id)| ThreadRef::new(channel, id))
            .collect())
    }
}

/// Capture adapter for Microsoft Teams channels.
pub struct TeamsCaptureAdapter {
    client: Arc<GraphClient>,
    state: ConnectionState,
    listener: ListenerSlot,
    notifications: Option<mpsc::Sender<ThreadNotification>>,
}

impl TeamsCaptureAdapter {
    pub fn new(config: TeamsConfig) -> Result<Self> {
        config.validate()?;
        let http = build_client(config.timeout_secs)?;
        let interval = Duration::from_secs(config.poll_interval_secs.max(1));
        Ok(Self {
            client: Arc::new(GraphClient { http, config }),
            state: ConnectionState::default(),
            listener: ListenerSlot::new("teams", interval),
            notifications: None,
        })
    }

    pub fn with_notifications(mut self, tx: mpsc::Sender<ThreadNotification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn connection_count(&self) -> usize {
        self.listener.connection_count()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state.get() || self.connect().await {
            Ok(())
        } else {
            Err(Error::AdapterConnection("Teams is not connected".to_string()))
        }
    }
}

#[async_trait]
impl Integration for TeamsCaptureAdapter {
    fn name(&self) -> &str {
        "teams"
    }

    async fn connect(&self) -> bool {
        match self.test_connection().await {
            Ok(()) => {
                self.state.set(true);
                info!(subsystem = "integrations", component = "teams", "Teams connected");
                true
            }
            Err(e) => {
                self.state.set(false);
                warn!(
                    subsystem = "integrations",
                    component = "teams",
                    error = %e,
                    "Teams connection failed"
                );
                false
            }
        }
    }

    async fn disconnect(&self) {
        self.listener.stop().await;
        self.state.set(false);
    }

    async fn test_connection(&self) -> Result<()> {
        let url = self
            .client
            .url(&format!("/teams/{}", self.client.config.team_id));
        let _: serde_json::Value = self.client.get(&url).await?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.get()
    }
}

#[async_trait]
impl CaptureAdapter for TeamsCaptureAdapter {
    fn platform(&self) -> SourceType {
        SourceType::Teams
    }

    #[instrument(skip(self), fields(subsystem = "integrations", component = "teams", op = "capture_thread", thread_ref = %thread_ref))]
    async fn capture_thread(&self, thread_ref: &ThreadRef) -> Result<CapturedThread> {
        self.ensure_connected().await?;
        let client = &self.client;
        let channel_path = client.channel_path(&thread_ref.channel_id);

        let root: GraphMessage = client
            .get(&client.url(&format!(
                "{}/messages/{}",
                channel_path, thread_ref.thread_id
            )))
            .await?;
        let web_url = root.web_url.clone();

        let channel_name = match client
            .get::<GraphChannel>(&client.url(&channel_path))
            .await
        {
            Ok(channel) => channel.display_name,
            Err(e) => {
                warn!(error = %e, "Channel lookup failed");
                None
            }
        };

        let mut replies = client.replies(thread_ref).await?;
        replies.retain(|m| m.deleted_date_time.is_none());
        // Graph returns replies newest first.
        replies.sort_by_key(|m| m.created_date_time);

        let mut messages = Vec::with_capacity(replies.len() + 1);
        messages.push(root.into_thread_message());
        messages.extend(replies.into_iter().map(GraphMessage::into_thread_message));
        let root_author = messages[0].author.clone();

        info!(
            message_count = messages.len(),
            channel_name = ?channel_name,
            "Teams thread captured"
        );

        Ok(CapturedThread {
            id: thread_ref.thread_id.clone(),
            channel_id: thread_ref.channel_id.clone(),
            channel_name,
            root_author,
            messages,
            captured_at: Utc::now(),
            platform: SourceType::Teams,
            platform_metadata: serde_json::json!({
                "team_id": client.config.team_id,
                "permalink": web_url,
            }),
        })
    }

    async fn start_listening(&self) -> Result<()> {
        let tx = self.notifications.clone().ok_or_else(|| {
            Error::Config("Teams listener has no notification channel".to_string())
        })?;
        if self.client.config.watch_channels.is_empty() {
            return Err(Error::Config(
                "Teams listener needs TEAMS_WATCH_CHANNELS".to_string(),
            ));
        }
        self.ensure_connected().await?;
        let poller = Arc::new(TeamsPoller {
            client: Arc::clone(&self.client),
        });
        self.listener.start(poller, tx).await;
        Ok(())
    }

    async fn stop_listening(&self) -> Result<()> {
        self.listener.stop().await;
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listener.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = "<div><p>Deploy is <b>blocked</b> &amp; waiting</p><p>on&nbsp;QA<br/>today</p></div>";
        assert_eq!(html_to_text(html), "Deploy is blocked & waiting\non QA\ntoday");
    }

    #[test]
    fn test_html_to_text_mentions() {
        let html = "<at id=\"0\">Dana Li</at> can you check?";
        assert_eq!(html_to_text(html), "Dana Li can you check?");
    }

    #[test]
    fn test_message_author_falls_back_to_application() {
        let message: GraphMessage = serde_json::from_value(serde_json::json!({
            "id": "1",
            "createdDateTime": "2026-01-05T10:00:00Z",
            "from": {"user": null, "application": {"displayName": "Build Bot"}},
            "body": {"contentType": "text", "content": " done "}
        }))
        .unwrap();
        assert_eq!(message.author(), "Build Bot");
        assert_eq!(message.text(), "done");
    }

    #[test]
    fn test_reply_page_without_value_is_empty() {
        let page: Page<GraphMessage> = serde_json::from_value(serde_json::json!({
            "@odata.nextLink": "https://graph.example/next"
        }))
        .unwrap();
        assert!(page.value.is_empty());
        assert_eq!(page.next_link.as_deref(), Some("https://graph.example/next"));
    }

    #[test]
    fn test_config_requires_team() {
        assert!(TeamsConfig::new("token", "").validate().is_err());
        assert!(TeamsConfig::new("token", "team").validate().is_ok());
    }
}
