//! HTTP plumbing shared by the adapters.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tacit_core::{Error, Result};

/// Build a client with the adapter request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("tacit/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-2xx response into a readable message.
pub(crate) async fn status_detail(platform: &str, response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("{} returned {}", platform, status)
    } else {
        format!("{} returned {}: {}", platform, status, truncate(body, 500))
    }
}

/// Decode a JSON body, mapping transport and status failures to
/// `AdapterConnection`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: &str,
    response: std::result::Result<Response, reqwest::Error>,
) -> Result<T> {
    let response = response
        .map_err(|e| Error::AdapterConnection(format!("{} request failed: {}", platform, e)))?;
    if !response.status().is_success() {
        return Err(Error::AdapterConnection(
            status_detail(platform, response).await,
        ));
    }
    response.json::<T>().await.map_err(|e| {
        Error::AdapterConnection(format!("{} returned an unreadable body: {}", platform, e))
    })
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Connected flag shared by every adapter.
#[derive(Debug, Default)]
pub(crate) struct ConnectionState(AtomicBool);

impl ConnectionState {
    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
