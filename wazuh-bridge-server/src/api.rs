//! HTTP API for the Wazuh bridge
//!
//! Provides endpoints for:
//! - Wazuh API connectivity check
//! - Proxying requests to the Wazuh API
//! - Saving Wazuh API credentials
//! - Logging client-side errors

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use wazuh_bridge_lib::{
    ApiVerifier, BridgeError, Config, CredentialStore, DocumentStore, ErrorCode, ErrorEnvelope, ProxyReply,
    ProxyRequest, RequestProxy, SettingsPayload, UpstreamClient,
};

/// API server state
#[derive(Clone)]
pub struct ApiState {
    pub verifier: ApiVerifier,
    pub proxy: RequestProxy,
    pub credentials: CredentialStore,
}

impl ApiState {
    /// Build the state from a document store and the daemon configuration
    pub fn new(store: Arc<dyn DocumentStore>, config: &Config) -> wazuh_bridge_lib::Result<Self> {
        let client = UpstreamClient::new()?;
        let credentials = CredentialStore::new(store, config.credentials_key());
        Ok(Self {
            verifier: ApiVerifier::new(credentials.clone(), client.clone()),
            proxy: RequestProxy::new(credentials.clone(), client),
            credentials,
        })
    }
}

/// Error response carrying a status code and a JSON envelope
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        ErrorEnvelope::new(status, code, message).into()
    }
}

impl From<ErrorEnvelope> for ApiError {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self {
            status: envelope.status,
            body: envelope.body,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// POST /api/wazuh/errlog body
#[derive(Debug, Default, Deserialize)]
pub struct ErrlogBody {
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Create the API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/wazuh-api/test", get(check_api))
        .route("/api/wazuh-api/request", post(proxy_request))
        .route("/api/wazuh-api/settings", put(save_settings))
        .route("/api/wazuh/errlog", post(log_client_error))
        .with_state(state)
}

/// Parse a JSON request body, treating an empty body as `{}`
fn parse_body<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: for<'de> Deserialize<'de>,
{
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, ErrorCode::MalformedBody, format!("Invalid JSON: {}", e))
    })
}

/// GET /api/wazuh-api/test - Check the stored credentials against the Wazuh API
async fn check_api(State(state): State<ApiState>) -> Json<Value> {
    let outcome = state.verifier.verify().await;
    if !outcome.is_ok() {
        tracing::info!("Wazuh API check: {}", outcome.message());
    }
    Json(outcome.to_envelope())
}

/// POST /api/wazuh-api/request - Forward a request to the Wazuh API
async fn proxy_request(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ProxyRequest = parse_body(&body)?;

    match state.proxy.forward(&request).await {
        ProxyReply::Passthrough(upstream) => {
            let content_type = upstream
                .content_type
                .unwrap_or_else(|| "application/json".to_string());
            Ok(([(header::CONTENT_TYPE, content_type)], Body::from(upstream.body)).into_response())
        }
        ProxyReply::Failure(envelope) => Err(envelope.into()),
    }
}

/// PUT /api/wazuh-api/settings - Save the Wazuh API credentials
async fn save_settings(State(state): State<ApiState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let payload: SettingsPayload = parse_body(&body)?;

    match state.credentials.save(&payload).await {
        Ok(()) => {
            tracing::info!("Wazuh API credentials saved");
            Ok(Json(json!({ "statusCode": 200, "message": "ok" })))
        }
        Err(BridgeError::InvalidInput(_)) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::MissingSettings,
            "Missing data",
        )),
        Err(e) => {
            tracing::error!("Failed to save credentials: {}", e);
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::SaveFailed,
                "Could not save data in elasticsearch",
            ))
        }
    }
}

/// POST /api/wazuh/errlog - Record an error reported by the frontend
async fn log_client_error(body: Bytes) -> Result<Json<Value>, ApiError> {
    let req: ErrlogBody = parse_body(&body)?;

    let message = match req.message {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    if message.is_empty() {
        return Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({
                "statusCode": 500,
                "message": "You must provide at least one error message to log",
            }),
        });
    }

    match req.details {
        Some(details) => tracing::error!(target: "client", details = %details, "{}", message),
        None => tracing::error!(target: "client", "{}", message),
    }
    Ok(Json(json!({ "statusCode": 200, "message": "Error logged successfully" })))
}
