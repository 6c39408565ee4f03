//! Integration tests for the request proxy
//!
//! A fake Wazuh API echoes what it received so tests can check the headers,
//! query string and body the proxy forwarded.

use axum::{
    body::Bytes,
    extract::RawQuery,
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::sync::Arc;
use wazuh_bridge_lib::credentials::CredentialStore;
use wazuh_bridge_lib::proxy::{ProxyReply, ProxyRequest, RequestProxy};
use wazuh_bridge_lib::store::{DocumentStore, MemoryStore};
use wazuh_bridge_lib::types::Config;
use wazuh_bridge_lib::upstream::UpstreamClient;

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream");
    let addr = listener.local_addr().expect("upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve upstream");
    });
    format!("http://{}", addr)
}

async fn spawn_tls_upstream(router: Router) -> String {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .expect("generate self-signed certificate");
    let tls = RustlsConfig::from_pem(cert.pem().into_bytes(), key_pair.serialize_pem().into_bytes())
        .await
        .expect("load TLS config");

    let handle = Handle::new();
    let server = axum_server::bind_rustls("127.0.0.1:0".parse().unwrap(), tls).handle(handle.clone());
    tokio::spawn(async move {
        server
            .serve(router.into_make_service())
            .await
            .expect("serve TLS upstream");
    });

    let addr = handle.listening().await.expect("TLS upstream address");
    format!("https://127.0.0.1:{}", addr.port())
}

async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "error": 0,
        "data": {
            "method": method.as_str(),
            "query": query,
            "api_version": header("api-version"),
            "authorization": header("authorization"),
            "body": serde_json::from_slice::<Value>(&body).ok(),
        }
    }))
}

fn upstream_router() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route(
            "/agents/999",
            get(|| async {
                (
                    StatusCode::OK,
                    Json(json!({ "error": 1701, "message": "Agent does not exist: 999" })),
                )
            }),
        )
        .route(
            "/plain",
            get(|| async { ([("content-type", "text/plain")], "manager is up") }),
        )
}

async fn proxy_for(url: &str) -> RequestProxy {
    proxy_with_insecure(url, "true").await
}

async fn proxy_with_insecure(url: &str, insecure: &str) -> RequestProxy {
    let config = Config::new();
    let store = Arc::new(MemoryStore::new());
    store
        .index(
            &config.credentials_key(),
            &json!({
                "api_user": "foo",
                "api_password": STANDARD.encode("bar"),
                "api_url": url,
                "insecure": insecure,
            }),
        )
        .await
        .expect("store credentials");
    RequestProxy::new(
        CredentialStore::new(store, config.credentials_key()),
        UpstreamClient::new().expect("client"),
    )
}

fn passthrough_json(reply: ProxyReply) -> Value {
    match reply {
        ProxyReply::Passthrough(response) => {
            serde_json::from_slice(&response.body).expect("upstream body should be JSON")
        }
        ProxyReply::Failure(envelope) => panic!("unexpected failure: {}", envelope.body),
    }
}

#[tokio::test]
async fn test_get_forwards_auth_header_and_query() {
    let url = spawn_upstream(upstream_router()).await;
    let proxy = proxy_for(&url).await;

    let request = ProxyRequest::new("get", "/echo").with_body(json!({ "limit": 5, "q": "os.platform=ubuntu" }));
    let body = passthrough_json(proxy.forward(&request).await);

    let data = &body["data"];
    assert_eq!(data["method"], "GET");
    assert_eq!(data["api_version"], "v1.3.0");
    assert_eq!(
        data["authorization"],
        Value::String(format!("Basic {}", STANDARD.encode("foo:bar")))
    );
    let query = data["query"].as_str().expect("query string");
    assert!(query.contains("limit=5"));
    assert!(query.contains("q=os.platform%3Dubuntu"));
}

#[tokio::test]
async fn test_post_forwards_json_body() {
    let url = spawn_upstream(upstream_router()).await;
    let proxy = proxy_for(&url).await;

    let request = ProxyRequest::new("PUT", "/echo").with_body(json!({ "name": "web01" }));
    let body = passthrough_json(proxy.forward(&request).await);

    assert_eq!(body["data"]["method"], "PUT");
    assert_eq!(body["data"]["body"], json!({ "name": "web01" }));
}

#[tokio::test]
async fn test_missing_body_defaults_to_empty_object() {
    let url = spawn_upstream(upstream_router()).await;
    let proxy = proxy_for(&url).await;

    let body = passthrough_json(proxy.forward(&ProxyRequest::new("POST", "/echo")).await);
    assert_eq!(body["data"]["body"], json!({}));
}

#[tokio::test]
async fn test_success_body_passes_through_unmodified() {
    let url = spawn_upstream(upstream_router()).await;
    let proxy = proxy_for(&url).await;

    match proxy.forward(&ProxyRequest::new("GET", "/plain")).await {
        ProxyReply::Passthrough(response) => {
            assert_eq!(response.body, b"manager is up");
            assert!(response.content_type.as_deref().unwrap_or("").starts_with("text/plain"));
        }
        ProxyReply::Failure(envelope) => panic!("unexpected failure: {}", envelope.body),
    }
}

#[tokio::test]
async fn test_upstream_error_is_500_with_upstream_body() {
    let url = spawn_upstream(upstream_router()).await;
    let proxy = proxy_for(&url).await;

    match proxy.forward(&ProxyRequest::new("GET", "/agents/999")).await {
        ProxyReply::Failure(envelope) => {
            assert_eq!(envelope.status.as_u16(), 500);
            assert_eq!(envelope.code(), Some(6));
            assert_eq!(envelope.body["message"], "Wazuh api error");
            assert_eq!(
                envelope.body["errorData"],
                json!({ "error": 1701, "message": "Agent does not exist: 999" })
            );
        }
        ProxyReply::Passthrough(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_transport_error_is_500() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let proxy = proxy_for(&format!("http://127.0.0.1:{}", port)).await;

    match proxy.forward(&ProxyRequest::new("GET", "/agents")).await {
        ProxyReply::Failure(envelope) => {
            assert_eq!(envelope.status.as_u16(), 500);
            assert_eq!(envelope.code(), Some(5));
            assert_eq!(envelope.body["message"], "Request error");
            assert!(envelope.body["errorMessage"].is_string());
        }
        ProxyReply::Passthrough(_) => panic!("expected failure"),
    }
}

#[tokio::test]
async fn test_self_signed_upstream_follows_insecure_flag() {
    let url = spawn_tls_upstream(upstream_router()).await;

    let insecure = proxy_with_insecure(&url, "true").await;
    let body = passthrough_json(insecure.forward(&ProxyRequest::new("GET", "/echo")).await);
    assert_eq!(body["data"]["method"], "GET");

    let strict = proxy_with_insecure(&url, "false").await;
    match strict.forward(&ProxyRequest::new("GET", "/echo")).await {
        ProxyReply::Failure(envelope) => {
            assert_eq!(envelope.status.as_u16(), 500);
            assert_eq!(envelope.code(), Some(5));
        }
        ProxyReply::Passthrough(_) => panic!("certificate should have been rejected"),
    }
}
