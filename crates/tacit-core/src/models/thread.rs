//! Transient shapes exchanged with integration adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::knowledge::{Attachment, ContentMessage, SourceMetadata, SourceType};

/// Platform-neutral reference to one conversation thread.
///
/// Written as `channel/thread` (also accepts `channel:thread`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub channel_id: String,
    pub thread_id: String,
}

impl ThreadRef {
    pub fn new(channel_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_id: thread_id.into(),
        }
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.thread_id)
    }
}

impl std::str::FromStr for ThreadRef {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (channel, thread) = s
            .split_once('/')
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| format!("Invalid thread reference: {}", s))?;
        let (channel, thread) = (channel.trim(), thread.trim());
        if channel.is_empty() || thread.is_empty() {
            return Err(format!("Invalid thread reference: {}", s));
        }
        Ok(Self::new(channel, thread))
    }
}

/// One message of a captured thread, already normalized to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    /// Display name of the author.
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A conversation pulled from a chat platform, consumed once by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedThread {
    pub id: String,
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub root_author: String,
    pub messages: Vec<ThreadMessage>,
    pub captured_at: DateTime<Utc>,
    pub platform: SourceType,
    #[serde(default)]
    pub platform_metadata: serde_json::Value,
}

impl CapturedThread {
    /// Default knowledge title: the root message's first line, shortened.
    pub fn default_title(&self) -> String {
        let first = self
            .messages
            .first()
            .and_then(|m| m.content.lines().find(|l| !l.trim().is_empty()))
            .map(str::trim)
            .unwrap_or("");
        if first.is_empty() {
            return match &self.channel_name {
                Some(name) => format!("Thread in #{}", name),
                None => format!("Thread {}", self.id),
            };
        }
        crate::content::shorten_title(first)
    }

    /// Source metadata carried onto the knowledge item.
    pub fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            channel_id: Some(self.channel_id.clone()),
            channel_name: self.channel_name.clone(),
            thread_id: Some(self.id.clone()),
            original_timestamp: self.messages.first().map(|m| m.timestamp),
            permalink: self
                .platform_metadata
                .get("permalink")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }

    /// Convert into knowledge content, consuming the thread.
    pub fn into_content(self) -> Vec<ContentMessage> {
        self.messages
            .into_iter()
            .map(|m| ContentMessage {
                author: m.author,
                text: m.content,
                timestamp: m.timestamp,
                attachments: m.attachments,
            })
            .collect()
    }
}

/// Outcome of one export attempt. Export failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    pub external_id: Option<String>,
    pub url: Option<String>,
    pub error: Option<String>,
}

impl ExportResult {
    pub fn ok(external_id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            url,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            url: None,
            error: Some(error.into()),
        }
    }
}

/// Emitted by a listening capture adapter when a thread changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNotification {
    pub adapter: String,
    pub thread_ref: ThreadRef,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(contents: &[&str]) -> CapturedThread {
        CapturedThread {
            id: "1700000000.000100".to_string(),
            channel_id: "C01".to_string(),
            channel_name: Some("eng".to_string()),
            root_author: "Ana".to_string(),
            messages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| ThreadMessage {
                    id: i.to_string(),
                    author: "Ana".to_string(),
                    content: c.to_string(),
                    timestamp: Utc::now(),
                    attachments: vec![],
                })
                .collect(),
            captured_at: Utc::now(),
            platform: SourceType::Slack,
            platform_metadata: serde_json::json!({"permalink": "https://x.slack.com/p1"}),
        }
    }

    #[test]
    fn test_thread_ref_parse() {
        let r: ThreadRef = "C01/1700000000.000100".parse().unwrap();
        assert_eq!(r.channel_id, "C01");
        assert_eq!(r.thread_id, "1700000000.000100");
        let r: ThreadRef = "19:abc@thread.tacv2/1690000".parse().unwrap();
        assert_eq!(r.channel_id, "19:abc@thread.tacv2");
        assert!("nothread".parse::<ThreadRef>().is_err());
        assert!("C01/".parse::<ThreadRef>().is_err());
    }

    #[test]
    fn test_default_title_uses_first_line() {
        let t = thread(&["\nDeploy freeze this week\nmore", "ok"]);
        assert_eq!(t.default_title(), "Deploy freeze this week");
    }

    #[test]
    fn test_default_title_truncates() {
        let long = "a".repeat(200);
        let t = thread(&[&long]);
        assert!(t.default_title().ends_with("..."));
        assert_eq!(t.default_title().chars().count(), 83);
    }

    #[test]
    fn test_default_title_falls_back_to_channel() {
        let t = thread(&["   "]);
        assert_eq!(t.default_title(), "Thread in #eng");
    }

    #[test]
    fn test_source_metadata_and_content() {
        let t = thread(&["one", "two"]);
        let meta = t.source_metadata();
        assert_eq!(meta.channel_name.as_deref(), Some("eng"));
        assert_eq!(meta.permalink.as_deref(), Some("https://x.slack.com/p1"));
        let content = t.into_content();
        assert_eq!(content.len(), 2);
        assert_eq!(content[1].text, "two");
    }

    #[test]
    fn test_export_result_constructors() {
        let ok = ExportResult::ok("page-1", None);
        assert!(ok.success && ok.error.is_none());
        let failed = ExportResult::failed("HTTP 400");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("HTTP 400"));
    }
}
