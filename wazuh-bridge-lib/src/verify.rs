//! Wazuh API connectivity check
//!
//! Runs a single linear pass: load credentials, check the URL scheme, call
//! `{url}/version` with certificate verification forced on, and on a
//! transport failure call it once more honoring the stored insecure flag.
//! The result is always one [`VerificationOutcome`] tag.

use crate::credentials::{CredentialError, CredentialStore};
use crate::error::Result;
use crate::upstream::{RequestOptions, UpstreamClient, UpstreamResponse};
use crate::version::is_compatible;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result of a connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Ok,
    Unauthorized,
    BadUrl,
    SelfSigned,
    NotRunning,
    NoCredentials,
    NoElasticsearch,
    ProtocolError,
}

impl VerificationOutcome {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unauthorized => "unauthorized",
            Self::BadUrl => "bad_url",
            Self::SelfSigned => "self_signed",
            Self::NotRunning => "not_running",
            Self::NoCredentials => "no_credentials",
            Self::NoElasticsearch => "no_elasticsearch",
            Self::ProtocolError => "protocol_error",
        }
    }

    /// Human-readable explanation for the dashboard
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ok => "Wazuh API is reachable and its version is supported",
            Self::Unauthorized => "Wazuh API rejected the stored user and password",
            Self::BadUrl => "The URL does not point to a supported Wazuh API",
            Self::SelfSigned => {
                "Could not connect to the Wazuh API. If it uses a self-signed certificate, enable insecure mode"
            }
            Self::NotRunning => "Wazuh API is not running or not reachable",
            Self::NoCredentials => "No Wazuh API credentials have been saved",
            Self::NoElasticsearch => "Could not connect with Elasticsearch",
            Self::ProtocolError => "The Wazuh API URL must start with http:// or https://",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Response body; always delivered with HTTP 200
    pub fn to_envelope(&self) -> Value {
        match self {
            Self::Ok => json!({ "statusCode": 200, "data": "ok" }),
            other => json!({ "statusCode": 200, "error": "1", "data": other.as_str() }),
        }
    }
}

impl std::fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a version call; None means the transport failed
fn classify(attempt: &Result<UpstreamResponse>) -> Option<VerificationOutcome> {
    let response = attempt.as_ref().ok()?;

    let version_ok = response
        .field("data")
        .and_then(Value::as_str)
        .map_or(false, is_compatible);

    Some(if version_ok {
        VerificationOutcome::Ok
    } else if response.status == StatusCode::UNAUTHORIZED {
        VerificationOutcome::Unauthorized
    } else {
        VerificationOutcome::BadUrl
    })
}

/// Orchestrates credentials, upstream client and version check
#[derive(Clone)]
pub struct ApiVerifier {
    credentials: CredentialStore,
    client: UpstreamClient,
}

impl ApiVerifier {
    pub fn new(credentials: CredentialStore, client: UpstreamClient) -> Self {
        Self { credentials, client }
    }

    pub async fn verify(&self) -> VerificationOutcome {
        let record = match self.credentials.load().await {
            Ok(record) => record,
            Err(CredentialError::StoreUnavailable(_)) => return VerificationOutcome::NoElasticsearch,
            Err(CredentialError::Missing) => return VerificationOutcome::NoCredentials,
        };

        if !record.upstream_url.starts_with("https://") && !record.upstream_url.starts_with("http://") {
            return VerificationOutcome::ProtocolError;
        }

        let url = format!("{}/version", record.upstream_url);
        let options = RequestOptions::new().with_basic_auth(&record.username, &record.password);

        let first = self.client.request(Method::GET, &url, None, &options).await;
        if let Some(outcome) = classify(&first) {
            return outcome;
        }
        if let Err(e) = &first {
            tracing::debug!("Version check against {} failed with TLS verification on: {}", url, e);
        }

        let retry_options = options.with_verify_tls(!record.allow_insecure_tls);
        let retry = self.client.request(Method::GET, &url, None, &retry_options).await;
        if let Some(outcome) = classify(&retry) {
            return outcome;
        }
        if let Err(e) = &retry {
            tracing::debug!("Version check retry against {} failed: {}", url, e);
        }

        if record.allow_insecure_tls {
            VerificationOutcome::NotRunning
        } else {
            VerificationOutcome::SelfSigned
        }
    }
}
