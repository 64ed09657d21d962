//! Slack capture adapter.
//!
//! Threads are read with `conversations.replies` (cursor paginated), the
//! channel name comes from `conversations.info` and author names from
//! `users.info`, cached per adapter. Slack mrkdwn is reduced to plain text.

mod api;
pub mod signing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, instrument, warn};

use tacit_core::defaults::{
    ADAPTER_MAX_PAGES, ADAPTER_PAGE_SIZE, ADAPTER_TIMEOUT_SECS, LISTEN_POLL_INTERVAL_SECS,
};
use tacit_core::{
    Attachment, CaptureAdapter, CapturedThread, Error, Integration, Result, SourceType,
    ThreadMessage, ThreadNotification, ThreadRef,
};

use crate::http::{build_client, read_json, trim_base, ConnectionState};
use crate::listener::{ListenerSlot, ThreadPoller};

pub use signing::{slack_signature, verify_slack_signature};

/// Default Slack Web API base.
pub const DEFAULT_SLACK_API: &str = "https://slack.com/api";

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@([A-Z0-9]+)(?:\|[^>]*)?>").expect("valid regex"));
static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#([A-Z0-9]+)(?:\|([^>]*))?>").expect("valid regex"));
static SPECIAL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!(here|channel|everyone)(?:\|[^>]*)?>").expect("valid regex"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<((?:https?|mailto):[^|>]+)(?:\|([^>]*))?>").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub base_url: String,
    pub bot_token: String,
    /// Used by the webhook route to verify inbound events.
    pub signing_secret: Option<String>,
    /// Channels polled while listening.
    pub watch_channels: Vec<String>,
    pub timeout_secs: u64,
    pub page_size: u32,
    pub max_pages: usize,
    pub poll_interval_secs: u64,
}

impl SlackConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_SLACK_API.to_string(),
            bot_token: bot_token.into(),
            signing_secret: None,
            watch_channels: Vec::new(),
            timeout_secs: ADAPTER_TIMEOUT_SECS,
            page_size: ADAPTER_PAGE_SIZE,
            max_pages: ADAPTER_MAX_PAGES,
            poll_interval_secs: LISTEN_POLL_INTERVAL_SECS,
        }
    }

    /// `None` when `SLACK_BOT_TOKEN` is unset.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("SLACK_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())?;
        let mut config = Self::new(token);
        if let Ok(base) = std::env::var("SLACK_API_BASE") {
            config.base_url = base;
        }
        config.signing_secret = std::env::var("SLACK_SIGNING_SECRET")
            .ok()
            .filter(|s| !s.is_empty());
        config.watch_channels = std::env::var("SLACK_WATCH_CHANNELS")
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
        if self.bot_token.trim().is_empty() {
            return Err(Error::Config("Slack bot token is empty".to_string()));
        }
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(Error::Config(format!(
                "Invalid Slack API base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}

/// Parse a Slack `ts` ("1700000000.000100") into a timestamp.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{:0<6}", frac).get(..6)?.parse().ok()?;
    DateTime::from_timestamp(secs, micros * 1000)
}

fn to_slack_ts(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

struct SlackClient {
    http: Client,
    config: SlackConfig,
    users: Mutex<HashMap<String, String>>,
}

impl SlackClient {
    async fn call<T: DeserializeOwned>(&self, method: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", trim_base(&self.config.base_url), method);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.config.bot_token)
            .query(query)
            .send()
            .await;
        let envelope: api::Envelope<T> = read_json("Slack", response).await?;
        if !envelope.ok {
            return Err(Error::AdapterConnection(format!(
                "Slack {} failed: {}",
                method,
                envelope.error.unwrap_or_else(|| "unknown_error".to_string())
            )));
        }
        envelope.body.ok_or_else(|| {
            Error::AdapterConnection(format!("Slack {} returned an empty body", method))
        })
    }

    /// All messages of a thread, root first, following cursors.
    async fn replies(&self, thread_ref: &ThreadRef) -> Result<Vec<api::Message>> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        let mut complete = false;

        for page in 0..self.config.max_pages {
            let mut query = vec![
                ("channel", thread_ref.channel_id.clone()),
                ("ts", thread_ref.thread_id.clone()),
                ("limit", self.config.page_size.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("cursor", c.clone()));
            }
            let replies: api::Replies = self.call("conversations.replies", &query).await?;
            debug!(page, count = replies.messages.len(), "Fetched Slack replies page");
            cursor = replies.next_cursor();
            let more = replies.has_more;
            messages.extend(replies.messages);
            if cursor.is_none() || !more {
                complete = true;
                break;
            }
        }
        if !complete {
            warn!(
                subsystem = "integrations",
                component = "slack",
                thread_ref = %thread_ref,
                max_pages = self.config.max_pages,
                "Thread truncated at page limit"
            );
        }

        // Pages can overlap on the root message.
        let mut seen = BTreeSet::new();
        messages.retain(|m| seen.insert(m.ts.clone()));
        messages.sort_by(|a, b| {
            let ka = parse_slack_ts(&a.ts);
            let kb = parse_slack_ts(&b.ts);
            ka.cmp(&kb)
        });
        Ok(messages)
    }

    async fn channel_name(&self, channel_id: &str) -> Option<String> {
        match self
            .call::<api::ChannelInfo>("conversations.info", &[("channel", channel_id.to_string())])
            .await
        {
            Ok(info) => info.channel.name,
            Err(e) => {
                warn!(
                    subsystem = "integrations",
                    component = "slack",
                    channel_id,
                    error = %e,
                    "Channel lookup failed"
                );
                None
            }
        }
    }

    async fn permalink(&self, thread_ref: &ThreadRef) -> Option<String> {
        self.call::<api::Permalink>(
            "chat.getPermalink",
            &[
                ("channel", thread_ref.channel_id.clone()),
                ("message_ts", thread_ref.thread_id.clone()),
            ],
        )
        .await
        .map(|p| p.permalink)
        .ok()
    }

    /// Display name for a user id, cached. Falls back to the id.
    async fn user_name(&self, user_id: &str) -> String {
        if let Some(name) = self.users.lock().await.get(user_id) {
            return name.clone();
        }
        let name = match self
            .call::<api::UserInfo>("users.info", &[("user", user_id.to_string())])
            .await
        {
            Ok(info) => info.user.best_name().unwrap_or_else(|| user_id.to_string()),
            Err(e) => {
                debug!(user_id, error = %e, "User lookup failed; using id");
                user_id.to_string()
            }
        };
        self.users
            .lock()
            .await
            .insert(user_id.to_string(), name.clone());
        name
    }

    async fn author(&self, message: &api::Message) -> String {
        match (&message.user, &message.username, &message.bot_id) {
            (Some(user), _, _) => self.user_name(user).await,
            (None, Some(username), _) => username.clone(),
            (None, None, Some(bot)) => format!("bot:{}", bot),
            _ => "unknown".to_string(),
        }
    }

    /// Reduce Slack mrkdwn to plain text, resolving user mentions.
    async fn plain_text(&self, text: &str) -> String {
        let ids: BTreeSet<String> = USER_MENTION
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect();
        let mut names = HashMap::new();
        for id in ids {
            let name = self.user_name(&id).await;
            names.insert(id, name);
        }

        let text = USER_MENTION.replace_all(text, |c: &regex::Captures| {
            format!("@{}", names.get(&c[1]).map(String::as_str).unwrap_or(&c[1]))
        });
        let text = CHANNEL_MENTION.replace_all(&text, |c: &regex::Captures| {
            format!("#{}", c.get(2).map(|m| m.as_str()).unwrap_or(&c[1]))
        });
        let text = SPECIAL_MENTION.replace_all(&text, "@$1");
        let text = LINK.replace_all(&text, |c: &regex::Captures| match c.get(2) {
            Some(label) if label.as_str() != &c[1] => format!("{} ({})", label.as_str(), &c[1]),
            _ => c[1].to_string(),
        });
        unescape(&text).trim().to_string()
    }
}

fn attachment(file: &api::File) -> Attachment {
    Attachment {
        name: file
            .name
            .clone()
            .or_else(|| file.title.clone())
            .unwrap_or_else(|| "file".to_string()),
        url: file.url_private.clone(),
        mime_type: file.mimetype.clone(),
        size_bytes: file.size,
    }
}

struct SlackPoller {
    client: Arc<SlackClient>,
}

#[async_trait]
impl ThreadPoller for SlackPoller {
    async fn poll(&self, since: DateTime<Utc>) -> Result<Vec<ThreadRef>> {
        let oldest = to_slack_ts(since);
        let mut refs = BTreeSet::new();
        for channel in &self.client.config.watch_channels {
            let history: api::History = self
                .client
                .call(
                    "conversations.history",
                    &[
                        ("channel", channel.clone()),
                        ("oldest", oldest.clone()),
                        ("limit", self.client.config.page_size.to_string()),
                    ],
                )
                .await?;
            for message in history.messages {
                let root = message.thread_ts.unwrap_or(message.ts);
                refs.insert((channel.clone(), root));
            }
        }
        Ok(refs
            .into_iter()
            .map(|(channel, ts)| ThreadRef::new(channel, ts))
            .collect())
    }
}

/// Capture adapter for Slack workspaces.
pub struct SlackCaptureAdapter {
    client: Arc<SlackClient>,
    state: ConnectionState,
    listener: ListenerSlot,
    notifications: Option<mpsc::Sender<ThreadNotification>>,
}

impl SlackCaptureAdapter {
    pub fn new(config: SlackConfig) -> Result<Self> {
        config.validate()?;
        let http = build_client(config.timeout_secs)?;
        let interval = Duration::from_secs(config.poll_interval_secs.max(1));
        Ok(Self {
            client: Arc::new(SlackClient {
                http,
                config,
                users: Mutex::new(HashMap::new()),
            }),
            state: ConnectionState::default(),
            listener: ListenerSlot::new("slack", interval),
            notifications: None,
        })
    }

    /// Channel that receives listener notifications.
    pub fn with_notifications(mut self, tx: mpsc::Sender<ThreadNotification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    pub fn signing_secret(&self) -> Option<&str> {
        self.client.config.signing_secret.as_deref()
    }

    /// Platform connections opened by the listener so far.
    pub fn connection_count(&self) -> usize {
        self.listener.connection_count()
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.state.get() || self.connect().await {
            Ok(())
        } else {
            Err(Error::AdapterConnection("Slack is not connected".to_string()))
        }
    }
}

#[async_trait]
impl Integration for SlackCaptureAdapter {
    fn name(&self) -> &str {
        "slack"
    }

    async fn connect(&self) -> bool {
        match self.test_connection().await {
            Ok(()) => {
                self.state.set(true);
                info!(subsystem = "integrations", component = "slack", "Slack connected");
                true
            }
            Err(e) => {
                self.state.set(false);
                warn!(
                    subsystem = "integrations",
                    component = "slack",
                    error = %e,
                    "Slack connection failed"
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
        let auth: api::AuthTest = self.client.call("auth.test", &[]).await?;
        debug!(team = ?auth.team, user_id = ?auth.user_id, "Slack auth.test ok");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.get()
    }
}

#[async_trait]
impl CaptureAdapter for SlackCaptureAdapter {
    fn platform(&self) -> SourceType {
        SourceType::Slack
    }

    #[instrument(skip(self), fields(subsystem = "integrations", component = "slack", op = "capture_thread", thread_ref = %thread_ref))]
    async fn capture_thread(&self, thread_ref: &ThreadRef) -> Result<CapturedThread> {
        self.ensure_connected().await?;
        let client = &self.client;

        let raw = client.replies(thread_ref).await?;
        if raw.is_empty() {
            return Err(Error::NotFound(format!("Slack thread {} not found", thread_ref)));
        }

        let mut messages = Vec::with_capacity(raw.len());
        for message in &raw {
            messages.push(ThreadMessage {
                id: message.ts.clone(),
                author: client.author(message).await,
                content: client.plain_text(&message.text).await,
                timestamp: parse_slack_ts(&message.ts).unwrap_or_else(Utc::now),
                attachments: message.files.iter().map(attachment).collect(),
            });
        }

        let channel_name = client.channel_name(&thread_ref.channel_id).await;
        let permalink = client.permalink(thread_ref).await;
        let root_author = messages[0].author.clone();

        info!(
            message_count = messages.len(),
            channel_name = ?channel_name,
            "Slack thread captured"
        );

        Ok(CapturedThread {
            id: thread_ref.thread_id.clone(),
            channel_id: thread_ref.channel_id.clone(),
            channel_name,
            root_author,
            messages,
            captured_at: Utc::now(),
            platform: SourceType::Slack,
            platform_metadata: serde_json::json!({
                "thread_ts": thread_ref.thread_id,
                "permalink": permalink,
            }),
        })
    }

    async fn start_listening(&self) -> Result<()> {
        let tx = self.notifications.clone().ok_or_else(|| {
            Error::Config("Slack listener has no notification channel".to_string())
        })?;
        if self.client.config.watch_channels.is_empty() {
            return Err(Error::Config(
                "Slack listener needs SLACK_WATCH_CHANNELS".to_string(),
            ));
        }
        self.ensure_connected().await?;
        let poller = Arc::new(SlackPoller {
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
    use chrono::Timelike;

    #[test]
    fn test_parse_slack_ts() {
        let at = parse_slack_ts("1700000000.000100").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.nanosecond(), 100_000);
        assert!(parse_slack_ts("1700000000").is_some());
        assert!(parse_slack_ts("abc.def").is_none());
    }

    #[test]
    fn test_slack_ts_roundtrip() {
        let at = parse_slack_ts("1700000000.123456").unwrap();
        assert_eq!(to_slack_ts(at), "1700000000.123456");
    }

    #[test]
    fn test_config_validation() {
        assert!(SlackConfig::new("xoxb-1").validate().is_ok());
        assert!(matches!(
            SlackConfig::new("  ").validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &lt;b&gt; &amp; c"), "a <b> & c");
    }
}
