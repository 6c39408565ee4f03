//! Request proxy to the Wazuh API
//!
//! Forwards a method/path/body triple to the configured Wazuh API using the
//! stored credentials. Failures come back as an [`ErrorEnvelope`] whose HTTP
//! status matches the failure class:
//! - 400: caller omitted `method` or `path`
//! - 404: credentials missing or document store unreachable
//! - 500: transport failure or an error reported by the Wazuh API
//!
//! Unlike the connectivity check, configuration problems here are reported
//! through the status code, not a 200 payload.

use crate::credentials::{CredentialError, CredentialStore};
use crate::error::ErrorCode;
use crate::upstream::{RequestOptions, UpstreamClient, UpstreamResponse};
use crate::version::API_VERSION_HEADER;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::Instrument;

/// Payload of `POST /api/wazuh-api/request`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProxyRequest {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl ProxyRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            path: Some(path.into()),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Structured failure returned instead of the upstream body
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub status: StatusCode,
    pub body: Value,
}

impl ErrorEnvelope {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        let body = json!({
            "statusCode": status.as_u16(),
            "error": code.code(),
            "message": message.into(),
        });
        Self { status, body }
    }

    /// Attach an extra field (`errorMessage`, `errorData`)
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.body {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn code(&self) -> Option<u64> {
        self.body.get("error").and_then(Value::as_u64)
    }
}

/// Outcome of a proxied request
#[derive(Debug, Clone)]
pub enum ProxyReply {
    /// Upstream body, passed through unmodified
    Passthrough(UpstreamResponse),
    Failure(ErrorEnvelope),
}

/// Whether the upstream `error` field signals a failure
///
/// The Wazuh API answers `"error": 0` on success. Null, `false`, zero and
/// the empty string all count as no error.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Present and not blank; the value itself is returned untouched
fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Forwards requests to the Wazuh API with stored credentials
#[derive(Clone)]
pub struct RequestProxy {
    credentials: CredentialStore,
    client: UpstreamClient,
}

impl RequestProxy {
    pub fn new(credentials: CredentialStore, client: UpstreamClient) -> Self {
        Self { credentials, client }
    }

    pub async fn forward(&self, request: &ProxyRequest) -> ProxyReply {
        let Some(method) = required(&request.method) else {
            return ProxyReply::Failure(ErrorEnvelope::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingMethod,
                "Missing param: Method",
            ));
        };
        let Some(path) = required(&request.path) else {
            return ProxyReply::Failure(ErrorEnvelope::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingPath,
                "Missing param: Path",
            ));
        };
        let Ok(method) = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes()) else {
            return ProxyReply::Failure(ErrorEnvelope::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::MissingMethod,
                "Invalid param: Method",
            ));
        };

        let span = tracing::info_span!("proxy_request", method = %method, path = %path);
        self.forward_checked(method, path, request.body.as_ref())
            .instrument(span)
            .await
    }

    async fn forward_checked(&self, method: Method, path: &str, body: Option<&Value>) -> ProxyReply {
        let record = match self.credentials.load().await {
            Ok(record) => record,
            Err(CredentialError::StoreUnavailable(_)) => {
                return ProxyReply::Failure(ErrorEnvelope::new(
                    StatusCode::NOT_FOUND,
                    ErrorCode::StoreUnavailable,
                    "Could not connect with elasticsearch",
                ));
            }
            Err(CredentialError::Missing) => {
                return ProxyReply::Failure(ErrorEnvelope::new(
                    StatusCode::NOT_FOUND,
                    ErrorCode::CredentialsMissing,
                    "Credentials does not exists",
                ));
            }
        };

        let url = format!("{}{}", record.upstream_url, path);
        let options = RequestOptions::new()
            .with_basic_auth(&record.username, &record.password)
            .with_verify_tls(!record.allow_insecure_tls)
            .with_header("api-version", API_VERSION_HEADER);

        let empty = json!({});
        let body = body.unwrap_or(&empty);

        match self.client.request(method, &url, Some(body), &options).await {
            Err(e) => {
                tracing::warn!("Request to Wazuh API failed: {}", e);
                ProxyReply::Failure(
                    ErrorEnvelope::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::RequestFailed, "Request error")
                        .with_detail("errorMessage", Value::String(e.to_string())),
                )
            }
            Ok(response) if response.field("error").map_or(false, is_truthy) => {
                tracing::debug!("Wazuh API reported an error (status {})", response.status);
                let data = response.json.clone().unwrap_or(Value::Null);
                ProxyReply::Failure(
                    ErrorEnvelope::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::UpstreamError, "Wazuh api error")
                        .with_detail("errorData", data),
                )
            }
            Ok(response) => {
                tracing::debug!("Response status: {}", response.status);
                ProxyReply::Passthrough(response)
            }
        }
    }
}
