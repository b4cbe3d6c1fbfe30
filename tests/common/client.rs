//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with helpers for the gateway endpoints. When routes or
//! request formats change, update only this file.
#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// How the client presents its API key.
#[derive(Clone, Debug)]
enum Credentials {
    None,
    Bearer(String),
    ApiKeyHeader(String),
}

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    credentials: Credentials,
    next_id: AtomicI64,
}

impl TestClient {
    /// Creates a client that sends no credentials
    pub fn new(base_url: String) -> Self {
        Self::with_credentials(base_url, Credentials::None)
    }

    /// Creates a client sending `Authorization: Bearer <key>`
    pub fn with_bearer(base_url: String, key: &str) -> Self {
        Self::with_credentials(base_url, Credentials::Bearer(key.to_string()))
    }

    /// Creates a client sending `X-API-Key: <key>`
    pub fn with_api_key_header(base_url: String, key: &str) -> Self {
        Self::with_credentials(base_url, Credentials::ApiKeyHeader(key.to_string()))
    }

    fn with_credentials(base_url: String, credentials: Credentials) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            credentials,
            next_id: AtomicI64::new(1),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::None => request,
            Credentials::Bearer(key) => request.bearer_auth(key),
            Credentials::ApiKeyHeader(key) => request.header("X-API-Key", key),
        }
    }

    // ========================================================================
    // Open Endpoints
    // ========================================================================

    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }

    pub async fn api_docs(&self) -> Response {
        self.client
            .get(format!("{}/api/docs", self.base_url))
            .send()
            .await
            .expect("API docs request failed")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("GET request failed")
    }

    // ========================================================================
    // MCP Endpoint
    // ========================================================================

    /// POSTs a raw body to /mcp
    pub async fn post_mcp_raw(&self, body: impl Into<reqwest::Body>) -> Response {
        self.authorize(self.client.post(format!("{}/mcp", self.base_url)))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("MCP request failed")
    }

    /// POSTs a JSON message or batch to /mcp
    pub async fn post_mcp(&self, message: &Value) -> Response {
        self.post_mcp_raw(message.to_string()).await
    }

    /// Sends one JSON-RPC request with a fresh id
    pub async fn rpc(&self, method: &str, params: Option<Value>) -> Response {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
        });
        if let Some(params) = params {
            message["params"] = params;
        }
        self.post_mcp(&message).await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Response {
        self.rpc(
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    pub async fn read_resource(&self, uri: &str) -> Response {
        self.rpc("resources/read", Some(json!({ "uri": uri }))).await
    }

    pub async fn delete_mcp(&self) -> Response {
        self.authorize(self.client.delete(format!("{}/mcp", self.base_url)))
            .send()
            .await
            .expect("DELETE request failed")
    }

    pub async fn get_mcp(&self) -> Response {
        self.get("/mcp").await
    }
}
