//! HTTP client for the Wazuh API
//!
//! Every request carries a fixed 5 second connect timeout. Two pooled
//! clients are kept, one verifying TLS certificates and one that skips
//! verification; the caller picks per request.
//!
//! Transport failures (refused connection, TLS handshake, timeout) come back
//! as [`BridgeError::Transport`]. Any HTTP answer, including 4xx/5xx, is an
//! [`UpstreamResponse`] for the caller to classify.

use crate::error::{BridgeError, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Connection-open timeout applied to every upstream request
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Certificate verification; only an explicit `false` disables it
    pub verify_tls: bool,
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            verify_tls: true,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An HTTP answer from the Wazuh API
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Raw body bytes, passed through untouched by the proxy
    pub body: Vec<u8>,
    /// Body parsed as JSON, when it is JSON
    pub json: Option<Value>,
}

impl UpstreamResponse {
    /// Top-level field of the JSON body
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|body| body.get(name))
    }
}

/// Pooled client for upstream calls
#[derive(Clone)]
pub struct UpstreamClient {
    verifying: reqwest::Client,
    permissive: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> Result<Self> {
        let verifying = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build HTTP client: {}", e)))?;

        let permissive = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build insecure HTTP client: {}", e)))?;

        Ok(Self { verifying, permissive })
    }

    /// Send a request to an absolute URL
    ///
    /// For GET and HEAD the fields of a JSON object body become query
    /// parameters; other methods send the body as JSON.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<UpstreamResponse> {
        let client = if options.verify_tls {
            &self.verifying
        } else {
            &self.permissive
        };

        let sends_query = method == Method::GET || method == Method::HEAD;
        let mut builder = client.request(method, url);

        if let Some(username) = &options.username {
            builder = builder.basic_auth(username, options.password.as_deref());
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = body {
            if sends_query {
                let params = query_params(body);
                if !params.is_empty() {
                    builder = builder.query(&params);
                }
            } else {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        let json = serde_json::from_slice(&body).ok();

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
            json,
        })
    }
}

/// Flatten a JSON object into query pairs; strings are used verbatim
fn query_params(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}
