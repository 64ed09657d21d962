//! Ollama backend against a mock server.

#![cfg(feature = "ollama")]

use std::sync::Arc;

use tacit_core::{EmbeddingBackend, EnrichmentProvider, Error, InferenceBackend};
use tacit_inference::{LlmEnrichmentProvider, OllamaBackend, OllamaConfig};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> OllamaBackend {
    OllamaBackend::new(OllamaConfig {
        base_url: server.uri(),
        embed_model: "nomic-embed-text".to_string(),
        gen_model: "llama3.1:8b".to_string(),
        dimension: 3,
        embed_timeout_secs: 5,
        gen_timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_embed_texts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = backend(&server)
        .embed_texts(&["hello".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].as_slice().len(), 3);
}

#[tokio::test]
async fn test_empty_input_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let vectors = backend(&server).embed_texts(&[]).await.unwrap();
    assert!(vectors.is_empty());
}

#[tokio::test]
async fn test_server_error_maps_to_enrichment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let provider = LlmEnrichmentProvider::new(Arc::new(backend(&server)));
    match provider.summarize("t", "x").await {
        Err(Error::Enrichment(msg)) => assert!(msg.contains("model not loaded")),
        other => panic!("expected Enrichment error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_action_items_through_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(serde_json::json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {
                "role": "assistant",
                "content": "[{\"description\":\"Update the runbook\",\"assignee\":\"bob\"}]"
            }
        })))
        .mount(&server)
        .await;

    let provider = LlmEnrichmentProvider::new(Arc::new(backend(&server)));
    let items = provider
        .extract_action_items("bob: I'll update the runbook")
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].assignee.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"models": []})))
        .mount(&server)
        .await;

    assert!(backend(&server).health_check().await.unwrap());
}

#[tokio::test]
async fn test_short_embedding_reply_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[0.1, 0.2, 0.3]]
        })))
        .mount(&server)
        .await;

    let result = backend(&server)
        .embed_texts(&["one".to_string(), "two".to_string()])
        .await;
    assert!(matches!(result, Err(Error::Enrichment(_))));
}
