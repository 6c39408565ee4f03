//! Integration tests for the Elasticsearch-backed document store
//!
//! A fake Elasticsearch keeps documents in memory and answers the handful of
//! REST endpoints the store uses.

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use wazuh_bridge_lib::error::BridgeError;
use wazuh_bridge_lib::store::{DocumentStore, ElasticsearchStore};
use wazuh_bridge_lib::types::{BulkItem, Config, DocKey};

#[derive(Default)]
struct FakeEs {
    docs: HashMap<String, Value>,
    templates: HashMap<String, Value>,
    refreshed: Vec<String>,
}

type Shared = Arc<Mutex<FakeEs>>;

async fn handle(State(es): State<Shared>, method: Method, uri: Uri, body: Bytes) -> (StatusCode, Json<Value>) {
    let segments: Vec<String> = uri
        .path()
        .trim_start_matches('/')
        .split('/')
        .map(|s| s.replace("%2A", "*"))
        .collect();
    let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
    let mut es = es.lock().unwrap();

    match (method.as_str(), segments.as_slice()) {
        ("PUT", ["_template", name]) => {
            let template: Value = serde_json::from_slice(&body).unwrap();
            es.templates.insert(name.to_string(), template);
            (StatusCode::OK, Json(json!({ "acknowledged": true })))
        }
        ("POST", ["_bulk"]) => {
            let text = String::from_utf8(body.to_vec()).unwrap();
            let lines: Vec<&str> = text.lines().collect();
            for pair in lines.chunks(2) {
                let action: Value = serde_json::from_str(pair[0]).unwrap();
                let meta = &action["index"];
                let key = format!(
                    "{}/{}/{}",
                    meta["_index"].as_str().unwrap(),
                    meta["_type"].as_str().unwrap(),
                    meta["_id"].as_str().unwrap()
                );
                es.docs.insert(key, serde_json::from_str(pair[1]).unwrap());
            }
            (StatusCode::OK, Json(json!({ "errors": false, "items": [] })))
        }
        ("POST", [indices, "_refresh"]) => {
            es.refreshed.push(indices.to_string());
            (StatusCode::OK, Json(json!({ "_shards": {} })))
        }
        ("GET", [index, doc_type, id]) => {
            let key = format!("{}/{}/{}", index, doc_type, id);
            match es.docs.get(&key) {
                Some(doc) => (StatusCode::OK, Json(json!({ "found": true, "_source": doc }))),
                None => (StatusCode::NOT_FOUND, Json(json!({ "found": false }))),
            }
        }
        ("PUT", [index, doc_type, id, "_create"]) => {
            let key = format!("{}/{}/{}", index, doc_type, id);
            if es.docs.contains_key(&key) {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({ "error": { "type": "version_conflict_engine_exception" }, "status": 409 })),
                );
            }
            es.docs.insert(key, serde_json::from_slice(&body).unwrap());
            (StatusCode::CREATED, Json(json!({ "created": true })))
        }
        ("PUT", [index, doc_type, id]) => {
            let key = format!("{}/{}/{}", index, doc_type, id);
            es.docs.insert(key, serde_json::from_slice(&body).unwrap());
            (StatusCode::OK, Json(json!({ "result": "updated" })))
        }
        ("POST", [index, doc_type, id, "_update"]) => {
            let key = format!("{}/{}/{}", index, doc_type, id);
            let partial: Value = serde_json::from_slice(&body).unwrap();
            match es.docs.get_mut(&key) {
                Some(Value::Object(doc)) => {
                    for (k, v) in partial["doc"].as_object().unwrap() {
                        doc.insert(k.clone(), v.clone());
                    }
                    (StatusCode::OK, Json(json!({ "result": "updated" })))
                }
                _ => (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": { "type": "document_missing_exception" }, "status": 404 })),
                ),
            }
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported" }))),
    }
}

async fn spawn_fake_es() -> (Shared, ElasticsearchStore) {
    let state: Shared = Arc::new(Mutex::new(FakeEs::default()));
    let router = Router::new().fallback(handle).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake es");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve fake es");
    });

    let config = Config::new().with_elasticsearch_url(format!("http://{}", addr));
    let store = ElasticsearchStore::new(&config).expect("create store");
    (state, store)
}

#[tokio::test]
async fn test_get_create_update_round_trip() {
    let (_es, store) = spawn_fake_es().await;
    let key = DocKey::new(".kibana", "wazuh-setup", "1");

    assert!(store.get(&key).await.expect("get should succeed").is_none());

    store.create(&key, &json!({ "name": "Wazuh App", "revision": "1" })).await.unwrap();
    let err = store.create(&key, &json!({})).await.unwrap_err();
    assert!(err.is_conflict());

    store.update(&key, &json!({ "revision": "2" })).await.unwrap();
    let doc = store.get(&key).await.unwrap().expect("document exists");
    assert_eq!(doc, json!({ "name": "Wazuh App", "revision": "2" }));

    let missing = DocKey::new(".kibana", "wazuh-setup", "2");
    assert!(matches!(store.update(&missing, &json!({})).await, Err(BridgeError::NotFound(_))));
}

#[tokio::test]
async fn test_index_replaces_document() {
    let (_es, store) = spawn_fake_es().await;
    let key = DocKey::new(".kibana", "wazuh-configuration", "1");

    store.index(&key, &json!({ "api_user": "a" })).await.unwrap();
    store.index(&key, &json!({ "api_user": "b" })).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(json!({ "api_user": "b" })));
}

#[tokio::test]
async fn test_template_bulk_and_refresh() {
    let (es, store) = spawn_fake_es().await;

    store
        .put_template("wazuh", 0, &json!({ "template": "wazuh-alerts-*" }))
        .await
        .unwrap();
    store
        .bulk(&[
            BulkItem {
                key: DocKey::new(".kibana", "dashboard", "Overview"),
                source: json!({ "title": "Overview" }),
            },
            BulkItem {
                key: DocKey::new(".kibana", "search", "Alerts"),
                source: json!({ "title": "Alerts" }),
            },
        ])
        .await
        .unwrap();
    store.refresh(&[".kibana", "wazuh-alerts-*"]).await.unwrap();

    let es = es.lock().unwrap();
    assert_eq!(es.templates["wazuh"], json!({ "template": "wazuh-alerts-*", "order": 0 }));
    assert_eq!(es.docs[".kibana/dashboard/Overview"], json!({ "title": "Overview" }));
    assert_eq!(es.docs.len(), 2);
    assert_eq!(es.refreshed, vec![".kibana,wazuh-alerts-*".to_string()]);
}

#[tokio::test]
async fn test_unreachable_elasticsearch_is_store_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config::new().with_elasticsearch_url(format!("http://127.0.0.1:{}", port));
    let store = ElasticsearchStore::new(&config).unwrap();

    let err = store
        .get(&DocKey::new(".kibana", "wazuh-configuration", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Store(_)));
}
