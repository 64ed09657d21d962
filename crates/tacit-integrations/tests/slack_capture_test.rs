//! Slack capture against a mocked Web API.

use serde_json::json;
use std::time::Duration;
use tacit_core::{CaptureAdapter, Error, Integration, SourceType, ThreadRef};
use tacit_integrations::{SlackCaptureAdapter, SlackConfig};
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok(body: serde_json::Value) -> ResponseTemplate {
    let mut body = body;
    body["ok"] = json!(true);
    ResponseTemplate::new(200).set_body_json(body)
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth.test"))
        .and(header("authorization", "Bearer xoxb-test"))
        .respond_with(ok(json!({"team": "Acme", "user_id": "UBOT"})))
        .mount(server)
        .await;
}

async fn mount_users(server: &MockServer) {
    for (id, name) in [("U1", "Alice"), ("U2", "Bob")] {
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("user", id))
            .respond_with(ok(json!({
                "user": {"name": id.to_lowercase(), "profile": {"display_name": name}}
            })))
            .mount(server)
            .await;
    }
}

fn adapter(server: &MockServer) -> SlackCaptureAdapter {
    let mut config = SlackConfig::new("xoxb-test");
    config.base_url = server.uri();
    SlackCaptureAdapter::new(config).unwrap()
}

#[tokio::test]
async fn test_capture_three_message_thread_across_pages() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    mount_users(&server).await;

    // Second page first: the first matching mock wins.
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .and(query_param("cursor", "page2"))
        .respond_with(ok(json!({
            "messages": [
                {"ts": "1700000000.000300", "thread_ts": "1700000000.000100", "user": "U1",
                 "text": "fixed, see <https://wiki.example.com/rb|runbook>"}
            ],
            "has_more": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .and(query_param("channel", "C042"))
        .and(query_param("ts", "1700000000.000100"))
        .respond_with(ok(json!({
            "messages": [
                {"ts": "1700000000.000100", "thread_ts": "1700000000.000100", "user": "U1",
                 "text": "Deploy is blocked <!here>", "reply_count": 2},
                {"ts": "1700000000.000200", "thread_ts": "1700000000.000100", "user": "U2",
                 "text": "ack <@U1> &amp; looking"}
            ],
            "has_more": true,
            "response_metadata": {"next_cursor": "page2"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/conversations.info"))
        .respond_with(ok(json!({"channel": {"id": "C042", "name": "incidents"}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/chat.getPermalink"))
        .respond_with(ok(json!({
            "permalink": "https://acme.slack.com/archives/C042/p1700000000000100"
        })))
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    let thread = adapter
        .capture_thread(&ThreadRef::new("C042", "1700000000.000100"))
        .await
        .unwrap();

    assert_eq!(thread.messages.len(), 3);
    assert_eq!(thread.root_author, "Alice");
    assert_eq!(thread.root_author, thread.messages[0].author);
    assert_eq!(thread.channel_name.as_deref(), Some("incidents"));
    assert_eq!(thread.platform, SourceType::Slack);

    assert_eq!(thread.messages[0].content, "Deploy is blocked @here");
    assert_eq!(thread.messages[1].author, "Bob");
    assert_eq!(thread.messages[1].content, "ack @Alice & looking");
    assert_eq!(
        thread.messages[2].content,
        "fixed, see runbook (https://wiki.example.com/rb)"
    );
    assert!(thread.messages[0].timestamp < thread.messages[2].timestamp);

    let metadata = thread.source_metadata();
    assert_eq!(
        metadata.permalink.as_deref(),
        Some("https://acme.slack.com/archives/C042/p1700000000000100")
    );
    assert!(adapter.is_connected());
}

#[tokio::test]
async fn test_capture_empty_thread_is_not_found() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .respond_with(ok(json!({"messages": [], "has_more": false})))
        .mount(&server)
        .await;

    let result = adapter(&server)
        .capture_thread(&ThreadRef::new("C042", "1.1"))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_platform_error_surfaces_as_connection_error() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations.replies"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "channel_not_found"})),
        )
        .mount(&server)
        .await;

    let err = adapter(&server)
        .capture_thread(&ThreadRef::new("CX", "1.1"))
        .await
        .unwrap_err();
    match err {
        Error::AdapterConnection(msg) => assert!(msg.contains("channel_not_found")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_token_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth.test"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "error": "invalid_auth"})),
        )
        .mount(&server)
        .await;

    let adapter = adapter(&server);
    assert!(!adapter.connect().await);
    assert!(!adapter.is_connected());
    assert!(adapter.test_connection().await.is_err());
}

#[tokio::test]
async fn test_start_listening_twice_opens_one_connection() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .respond_with(ok(json!({"messages": []})))
        .mount(&server)
        .await;

    let mut config = SlackConfig::new("xoxb-test");
    config.base_url = server.uri();
    config.watch_channels = vec!["C042".to_string()];
    config.poll_interval_secs = 3600;
    let (tx, _rx) = mpsc::channel(8);
    let adapter = SlackCaptureAdapter::new(config)
        .unwrap()
        .with_notifications(tx);

    adapter.start_listening().await.unwrap();
    adapter.start_listening().await.unwrap();
    assert_eq!(adapter.connection_count(), 1);
    assert!(adapter.is_listening());

    adapter.stop_listening().await.unwrap();
    assert!(!adapter.is_listening());
}

#[tokio::test]
async fn test_listener_forwards_thread_notifications() {
    let server = MockServer::start().await;
    mount_auth(&server).await;
    Mock::given(method("GET"))
        .and(path("/conversations.history"))
        .and(query_param("channel", "C042"))
        .respond_with(ok(json!({
            "messages": [
                {"ts": "1700000100.000100", "thread_ts": "1700000000.000100", "text": "reply"}
            ]
        })))
        .mount(&server)
        .await;

    let mut config = SlackConfig::new("xoxb-test");
    config.base_url = server.uri();
    config.watch_channels = vec!["C042".to_string()];
    config.poll_interval_secs = 1;
    let (tx, mut rx) = mpsc::channel(8);
    let adapter = SlackCaptureAdapter::new(config)
        .unwrap()
        .with_notifications(tx);
    adapter.start_listening().await.unwrap();

    let note = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(note.adapter, "slack");
    assert_eq!(note.thread_ref, ThreadRef::new("C042", "1700000000.000100"));
    adapter.stop_listening().await.unwrap();
}

#[tokio::test]
async fn test_start_listening_without_channel_is_config_error() {
    let server = MockServer::start().await;
    let adapter = adapter(&server);
    assert!(matches!(
        adapter.start_listening().await,
        Err(Error::Config(_))
    ));
}
