//! Core types for the bridge
//!
//! Defines the data structures shared by the library and the daemon:
//! - Runtime configuration
//! - Credential record and the settings payload that produces it
//! - Setup marker written by provisioning
//! - Document addressing for the document store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Index pattern provisioned for Wazuh alerts
pub const INDEX_PATTERN: &str = "wazuh-alerts-*";

/// Time field of the alerts index pattern
pub const TIME_FIELD: &str = "@timestamp";

/// Name of the index template installed at boot
pub const TEMPLATE_NAME: &str = "wazuh";

/// Document type and id holding the Wazuh API credentials
pub const CREDENTIALS_TYPE: &str = "wazuh-configuration";
pub const CREDENTIALS_ID: &str = "1";

/// Document type and id of the setup marker
pub const SETUP_TYPE: &str = "wazuh-setup";
pub const SETUP_ID: &str = "1";

/// Application configuration
///
/// Built once at startup and handed to every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Bind address of the HTTP API
    pub bind_address: String,
    /// HTTP API port (default: 9090)
    pub port: u16,
    /// Elasticsearch base URL
    pub elasticsearch_url: String,
    /// Optional basic-auth user for Elasticsearch
    pub elasticsearch_username: Option<String>,
    /// Optional basic-auth password for Elasticsearch
    pub elasticsearch_password: Option<String>,
    /// Index holding dashboard documents
    pub kibana_index: String,
    /// Kibana version, used as the id of the UI settings document
    pub kibana_version: String,
    /// Directory with the packaged provisioning files
    pub integration_files_dir: PathBuf,
    /// Application revision written to the setup marker
    pub app_revision: String,
    /// Delay between creating the index pattern and making it the default
    pub settle_delay_ms: u64,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 9090,
            elasticsearch_url: "http://localhost:9200".to_string(),
            elasticsearch_username: None,
            elasticsearch_password: None,
            kibana_index: ".kibana".to_string(),
            kibana_version: "5.3.0".to_string(),
            integration_files_dir: PathBuf::from("integration_files"),
            app_revision: "0".to_string(),
            settle_delay_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, bind: impl Into<String>) -> Self {
        self.bind_address = bind.into();
        self
    }

    /// Set API port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set Elasticsearch URL (trailing slashes are dropped)
    pub fn with_elasticsearch_url(mut self, url: impl Into<String>) -> Self {
        self.elasticsearch_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set Elasticsearch basic-auth credentials
    pub fn with_elasticsearch_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.elasticsearch_username = Some(username.into());
        self.elasticsearch_password = Some(password.into());
        self
    }

    pub fn with_kibana_index(mut self, index: impl Into<String>) -> Self {
        self.kibana_index = index.into();
        self
    }

    pub fn with_kibana_version(mut self, version: impl Into<String>) -> Self {
        self.kibana_version = version.into();
        self
    }

    /// Set the directory holding the packaged provisioning files
    pub fn with_integration_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.integration_files_dir = dir.into();
        self
    }

    pub fn with_app_revision(mut self, revision: impl Into<String>) -> Self {
        self.app_revision = revision.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Key of the credential document
    pub fn credentials_key(&self) -> DocKey {
        DocKey::new(&self.kibana_index, CREDENTIALS_TYPE, CREDENTIALS_ID)
    }

    /// Key of the setup marker document
    pub fn setup_key(&self) -> DocKey {
        DocKey::new(&self.kibana_index, SETUP_TYPE, SETUP_ID)
    }

    /// Key of the dashboard UI settings document
    pub fn ui_settings_key(&self) -> DocKey {
        DocKey::new(&self.kibana_index, "config", &self.kibana_version)
    }
}

/// Address of a document: index, mapping type and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocKey {
    pub index: String,
    pub doc_type: String,
    pub id: String,
}

impl DocKey {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.index, self.doc_type, self.id)
    }
}

/// One document of a bulk index request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub key: DocKey,
    pub source: serde_json::Value,
}

/// Decoded Wazuh API credentials
///
/// Only ever built from a complete stored document; see
/// [`crate::credentials::CredentialStore::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub upstream_url: String,
    pub username: String,
    /// Plaintext password (base64 decoded from the stored document)
    pub password: String,
    pub allow_insecure_tls: bool,
}

/// Settings payload accepted by `PUT /api/wazuh-api/settings`
///
/// Every field is optional at the wire level so the handler can answer
/// with the proper error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsPayload {
    #[serde(default)]
    pub api_user: Option<String>,
    /// Base64 encoded by the caller
    #[serde(default)]
    pub api_password: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    /// Bool, or the strings "true"/"false" as sent by the dashboard form
    #[serde(default)]
    pub insecure: Option<serde_json::Value>,
}

/// Parse an insecure flag stored either as a bool or as a string
pub fn parse_insecure_flag(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Sentinel document distinguishing a first install from an upgrade
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupMarker {
    pub name: String,
    #[serde(rename = "app-version")]
    pub app_version: String,
    pub revision: String,
    #[serde(rename = "installationDate")]
    pub installation_date: DateTime<Utc>,
}

impl SetupMarker {
    pub fn new(app_version: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            name: "Wazuh App".to_string(),
            app_version: app_version.into(),
            revision: revision.into(),
            installation_date: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_port(8000)
            .with_elasticsearch_url("http://es:9200/")
            .with_settle_delay(Duration::from_millis(10));

        assert_eq!(config.port, 8000);
        assert_eq!(config.elasticsearch_url, "http://es:9200");
        assert_eq!(config.settle_delay(), Duration::from_millis(10));
        assert_eq!(config.credentials_key().to_string(), ".kibana/wazuh-configuration/1");
        assert_eq!(config.setup_key().to_string(), ".kibana/wazuh-setup/1");
        assert_eq!(config.ui_settings_key().to_string(), ".kibana/config/5.3.0");
    }

    #[test]
    fn test_parse_insecure_flag() {
        assert_eq!(parse_insecure_flag(&json!(true)), Some(true));
        assert_eq!(parse_insecure_flag(&json!("false")), Some(false));
        assert_eq!(parse_insecure_flag(&json!("yes")), None);
        assert_eq!(parse_insecure_flag(&json!(1)), None);
    }

    #[test]
    fn test_setup_marker_wire_names() {
        let marker = SetupMarker::new("2.0.0", "42");
        let value = serde_json::to_value(&marker).unwrap();
        assert_eq!(value["name"], "Wazuh App");
        assert_eq!(value["app-version"], "2.0.0");
        assert_eq!(value["revision"], "42");
        assert!(value["installationDate"].is_string());
    }
}
