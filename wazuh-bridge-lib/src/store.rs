//! Document store abstraction
//!
//! Provides a trait-based abstraction over the search backend that holds
//! the credential document, the setup marker and the dashboard objects.
//! Implementations include:
//! - MemoryStore: in-process store (tests, standalone runs)
//! - ElasticsearchStore: Elasticsearch REST API over reqwest
//!
//! Documents are addressed by [`DocKey`] (index, mapping type, id).

use crate::error::{BridgeError, Result};
use crate::types::{BulkItem, Config, DocKey};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Trait for document store operations
///
/// Connectivity failures surface as [`BridgeError::Store`], so callers can
/// tell "store unreachable" apart from "document missing" (`Ok(None)`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document source. Returns None if the document doesn't exist.
    async fn get(&self, key: &DocKey) -> Result<Option<Value>>;

    /// Create a document. Fails with [`BridgeError::Conflict`] if it exists.
    async fn create(&self, key: &DocKey, body: &Value) -> Result<()>;

    /// Create or replace a document.
    async fn index(&self, key: &DocKey, body: &Value) -> Result<()>;

    /// Merge `partial` into an existing document.
    ///
    /// Fails with [`BridgeError::NotFound`] if the document doesn't exist.
    async fn update(&self, key: &DocKey, partial: &Value) -> Result<()>;

    /// Install or replace an index template.
    async fn put_template(&self, name: &str, order: i64, body: &Value) -> Result<()>;

    /// Index many documents in a single request.
    async fn bulk(&self, items: &[BulkItem]) -> Result<()>;

    /// Make recent writes visible to search.
    async fn refresh(&self, indices: &[&str]) -> Result<()>;
}

/// Recursive merge with partial-update semantics: objects merge, anything
/// else replaces.
pub fn merge_json(target: &mut Value, partial: &Value) {
    match (target, partial) {
        (Value::Object(target), Value::Object(partial)) => {
            for (k, v) in partial {
                let nested = v.is_object() && target.get(k).map_or(false, Value::is_object);
                if nested {
                    if let Some(existing) = target.get_mut(k) {
                        merge_json(existing, v);
                    }
                } else {
                    target.insert(k.clone(), v.clone());
                }
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

/// Write operation recorded by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Create(DocKey),
    Index(DocKey),
    Update(DocKey),
    PutTemplate(String),
    Bulk(usize),
    Refresh(Vec<String>),
}

/// In-process document store
///
/// Keeps documents and templates in memory and records every write so tests
/// can assert on the exact sequence. Can be switched offline to simulate an
/// unreachable backend.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<DocKey, Value>>,
    templates: RwLock<HashMap<String, Value>>,
    ops: RwLock<Vec<StoreOp>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// All write operations performed so far
    pub async fn ops(&self) -> Vec<StoreOp> {
        self.ops.read().await.clone()
    }

    pub async fn template(&self, name: &str) -> Option<Value> {
        self.templates.read().await.get(name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BridgeError::store("connection refused"));
        }
        Ok(())
    }

    async fn record(&self, op: StoreOp) {
        self.ops.write().await.push(op);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Value>> {
        self.ensure_online()?;
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn create(&self, key: &DocKey, body: &Value) -> Result<()> {
        self.ensure_online()?;
        {
            let mut docs = self.docs.write().await;
            if docs.contains_key(key) {
                return Err(BridgeError::conflict(format!("document already exists: {}", key)));
            }
            docs.insert(key.clone(), body.clone());
        }
        self.record(StoreOp::Create(key.clone())).await;
        Ok(())
    }

    async fn index(&self, key: &DocKey, body: &Value) -> Result<()> {
        self.ensure_online()?;
        self.docs.write().await.insert(key.clone(), body.clone());
        self.record(StoreOp::Index(key.clone())).await;
        Ok(())
    }

    async fn update(&self, key: &DocKey, partial: &Value) -> Result<()> {
        self.ensure_online()?;
        {
            let mut docs = self.docs.write().await;
            let doc = docs
                .get_mut(key)
                .ok_or_else(|| BridgeError::not_found(key.to_string()))?;
            merge_json(doc, partial);
        }
        self.record(StoreOp::Update(key.clone())).await;
        Ok(())
    }

    async fn put_template(&self, name: &str, order: i64, body: &Value) -> Result<()> {
        self.ensure_online()?;
        let mut template = body.clone();
        merge_json(&mut template, &json!({ "order": order }));
        self.templates.write().await.insert(name.to_string(), template);
        self.record(StoreOp::PutTemplate(name.to_string())).await;
        Ok(())
    }

    async fn bulk(&self, items: &[BulkItem]) -> Result<()> {
        self.ensure_online()?;
        {
            let mut docs = self.docs.write().await;
            for item in items {
                docs.insert(item.key.clone(), item.source.clone());
            }
        }
        self.record(StoreOp::Bulk(items.len())).await;
        Ok(())
    }

    async fn refresh(&self, indices: &[&str]) -> Result<()> {
        self.ensure_online()?;
        self.record(StoreOp::Refresh(indices.iter().map(|s| s.to_string()).collect()))
            .await;
        Ok(())
    }
}

/// Elasticsearch-backed document store
///
/// Talks to the REST API with mapping types in the document path
/// (`/{index}/{type}/{id}`), the layout dashboards of that generation use.
pub struct ElasticsearchStore {
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl ElasticsearchStore {
    /// Build a store from the Elasticsearch settings in `config`
    pub fn new(config: &Config) -> Result<Self> {
        // The backend commonly runs with a self-signed certificate.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build Elasticsearch client: {}", e)))?;

        Ok(Self {
            base_url: config.elasticsearch_url.trim_end_matches('/').to_string(),
            username: config.elasticsearch_username.clone(),
            password: config.elasticsearch_password.clone(),
            client,
        })
    }

    fn doc_url(&self, key: &DocKey) -> String {
        format!("{}/{}/{}/{}", self.base_url, key.index, key.doc_type, key.id)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => builder.basic_auth(user, Some(pass)),
            _ => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(StatusCode, Value)> {
        let response = builder
            .send()
            .await
            .map_err(|e| BridgeError::store(format!("Elasticsearch unreachable: {}", e)))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::store(format!("Failed to read Elasticsearch response: {}", e)))?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, body))
    }
}

fn unexpected(what: &str, status: StatusCode, body: &Value) -> BridgeError {
    BridgeError::store(format!("{} failed with {}: {}", what, status, body))
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Value>> {
        let url = self.doc_url(key);
        let (status, body) = self.send(self.request(reqwest::Method::GET, &url)).await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(unexpected("get", status, &body));
        }
        if body.get("found").and_then(Value::as_bool) == Some(false) {
            return Ok(None);
        }
        Ok(body.get("_source").cloned())
    }

    async fn create(&self, key: &DocKey, body: &Value) -> Result<()> {
        let url = format!("{}/_create", self.doc_url(key));
        let (status, resp) = self
            .send(self.request(reqwest::Method::PUT, &url).json(body))
            .await?;

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(BridgeError::conflict(format!("document already exists: {}", key))),
            s => Err(unexpected("create", s, &resp)),
        }
    }

    async fn index(&self, key: &DocKey, body: &Value) -> Result<()> {
        let url = self.doc_url(key);
        let (status, resp) = self
            .send(self.request(reqwest::Method::PUT, &url).json(body))
            .await?;

        if !status.is_success() {
            return Err(unexpected("index", status, &resp));
        }
        Ok(())
    }

    async fn update(&self, key: &DocKey, partial: &Value) -> Result<()> {
        let url = format!("{}/_update", self.doc_url(key));
        let (status, resp) = self
            .send(self.request(reqwest::Method::POST, &url).json(&json!({ "doc": partial })))
            .await?;

        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BridgeError::not_found(key.to_string())),
            s => Err(unexpected("update", s, &resp)),
        }
    }

    async fn put_template(&self, name: &str, order: i64, body: &Value) -> Result<()> {
        let mut template = body.clone();
        merge_json(&mut template, &json!({ "order": order }));

        let url = format!("{}/_template/{}", self.base_url, name);
        let (status, resp) = self
            .send(self.request(reqwest::Method::PUT, &url).json(&template))
            .await?;

        if !status.is_success() {
            return Err(unexpected("put template", status, &resp));
        }
        Ok(())
    }

    async fn bulk(&self, items: &[BulkItem]) -> Result<()> {
        let mut payload = String::new();
        for item in items {
            let action = json!({
                "index": {
                    "_index": item.key.index,
                    "_type": item.key.doc_type,
                    "_id": item.key.id,
                }
            });
            payload.push_str(&serde_json::to_string(&action)?);
            payload.push('\n');
            payload.push_str(&serde_json::to_string(&item.source)?);
            payload.push('\n');
        }

        let url = format!("{}/_bulk", self.base_url);
        let (status, resp) = self
            .send(
                self.request(reqwest::Method::POST, &url)
                    .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                    .body(payload),
            )
            .await?;

        if !status.is_success() {
            return Err(unexpected("bulk", status, &resp));
        }
        if resp.get("errors").and_then(Value::as_bool) == Some(true) {
            return Err(BridgeError::store("bulk request reported item errors"));
        }
        Ok(())
    }

    async fn refresh(&self, indices: &[&str]) -> Result<()> {
        let url = format!("{}/{}/_refresh", self.base_url, indices.join(","));
        let (status, resp) = self.send(self.request(reqwest::Method::POST, &url)).await?;

        if !status.is_success() {
            return Err(unexpected("refresh", status, &resp));
        }
        Ok(())
    }
}
