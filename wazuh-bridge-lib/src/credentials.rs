//! Credential store adapter
//!
//! Reads and writes the single Wazuh API credential document. The password
//! is kept base64 encoded at rest and decoded on every read. Nothing is
//! cached: each call re-fetches, so edits take effect immediately.

use crate::error::{BridgeError, Result};
use crate::store::DocumentStore;
use crate::types::{parse_insecure_flag, CredentialRecord, DocKey, SettingsPayload};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;

/// Why credentials could not be produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Document store unreachable
    StoreUnavailable(String),
    /// No document, or an incomplete/undecodable one
    Missing,
}

/// Adapter over the document holding the Wazuh API credentials
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
    key: DocKey,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>, key: DocKey) -> Self {
        Self { store, key }
    }

    /// Fetch and decode the credential record
    pub async fn load(&self) -> std::result::Result<CredentialRecord, CredentialError> {
        let doc = match self.store.get(&self.key).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return Err(CredentialError::Missing),
            Err(e) => {
                tracing::warn!("Could not read credentials from {}: {}", self.key, e);
                return Err(CredentialError::StoreUnavailable(e.to_string()));
            }
        };

        decode_record(&doc).ok_or_else(|| {
            tracing::warn!("Credential document {} is incomplete or malformed", self.key);
            CredentialError::Missing
        })
    }

    /// Validate a settings payload and persist it as the credential document
    ///
    /// Nothing is written unless all four fields are present. The password
    /// is stored exactly as given.
    pub async fn save(&self, payload: &SettingsPayload) -> Result<()> {
        let doc = validate_payload(payload)?;
        self.store.index(&self.key, &doc).await
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Turn a settings payload into the stored document shape
pub fn validate_payload(payload: &SettingsPayload) -> Result<Value> {
    let missing = || BridgeError::invalid_input("Missing data");

    let api_user = non_empty(&payload.api_user).ok_or_else(missing)?;
    let api_password = non_empty(&payload.api_password).ok_or_else(missing)?;
    let api_url = non_empty(&payload.api_url).ok_or_else(missing)?;
    let insecure = payload
        .insecure
        .as_ref()
        .and_then(parse_insecure_flag)
        .ok_or_else(missing)?;

    Ok(json!({
        "api_user": api_user,
        "api_password": api_password,
        "api_url": api_url,
        "insecure": insecure,
    }))
}

/// Decode a stored credential document; None unless all four fields are usable
pub fn decode_record(doc: &Value) -> Option<CredentialRecord> {
    let username = doc.get("api_user")?.as_str()?;
    let encoded = doc.get("api_password")?.as_str()?;
    let upstream_url = doc.get("api_url")?.as_str()?;
    let allow_insecure_tls = parse_insecure_flag(doc.get("insecure")?)?;

    let password = STANDARD.decode(encoded.trim()).ok()?;
    let password = String::from_utf8(password).ok()?;

    Some(CredentialRecord {
        upstream_url: upstream_url.to_string(),
        username: username.to_string(),
        password,
        allow_insecure_tls,
    })
}
