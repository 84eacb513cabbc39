//! # Webhook Relay HTTP Service
//!
//! HTTP intake for the relay: one endpoint per webhook source, each doing
//! authentication, persistence, and dispatcher hand-off in that order.
//!
//! The handlers are deliberately thin. Verification happens against the
//! raw body before anything is stored, the record is created with empty
//! `event`/`extra` fields, and all real work runs in the dispatcher's
//! worker so the sender gets its response inside its delivery timeout.

pub mod config;

pub use config::{ConfigValidationError, ServiceConfig};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use bytes::Bytes;
use relay_core::signature::{
    verify_github_signature, verify_internal_token, verify_zammad_signature, WebhookSecrets,
};
use relay_core::store::{NewWebhook, StoreError, WebhookStore};
use relay_core::{DispatchError, SignatureError, TaskDispatcher, WebhookId, WebhookSource};
use serde::Serialize;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Per-source verification secrets
    pub secrets: Arc<WebhookSecrets>,

    /// Durable webhook records
    pub webhooks: Arc<dyn WebhookStore>,

    /// Hand-off to asynchronous processing
    pub dispatcher: TaskDispatcher,
}

impl AppState {
    pub fn new(
        secrets: WebhookSecrets,
        webhooks: Arc<dyn WebhookStore>,
        dispatcher: TaskDispatcher,
    ) -> Self {
        Self {
            secrets: Arc::new(secrets),
            webhooks,
            dispatcher,
        }
    }
}

// ============================================================================
// Responses and Errors
// ============================================================================

/// Body returned for an accepted webhook.
#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    pub status: String,
    pub guid: WebhookId,
}

/// Handler-level failures mapped onto HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Token check failed on the internal endpoint. Rendered as a JSON
    /// body, matching what the internal test tooling expects.
    #[error("Unauthorized: {0}")]
    InternalUnauthorized(SignatureError),

    /// Signature check failed on an external endpoint. Rendered as plain
    /// text; GitHub and Zammad only look at the status code.
    #[error("Forbidden: {0}")]
    SignatureRejected(SignatureError),

    /// The body passed verification but is not valid JSON.
    #[error("Malformed JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: String,
    message: String,
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        match self {
            Self::InternalUnauthorized(e) => (
                StatusCode::FORBIDDEN,
                Json(ErrorBody {
                    status: "bad".to_string(),
                    message: e.to_string(),
                }),
            )
                .into_response(),

            Self::SignatureRejected(e) => {
                (StatusCode::FORBIDDEN, e.to_string()).into_response()
            }

            Self::MalformedBody(e) => {
                error!(error = %e, "Webhook body is not valid JSON");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }

            Self::Store(e) => {
                error!(error = %e, "Failed to persist webhook");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }

            Self::Dispatch(e) => {
                error!(error = %e, "Failed to schedule webhook processing");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/internal/", post(handle_internal_webhook))
        .route("/webhook/github/", post(handle_github_webhook))
        .route("/webhook/zammad/", post(handle_zammad_webhook))
        .route("/health", axum::routing::get(handle_health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Errors from running the HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("HTTP server failed: {message}")]
    ServerFailed { message: String },
}

/// Start the HTTP server, running until SIGINT or SIGTERM.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
) -> Result<(), ServiceError> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e: std::net::AddrParseError| ServiceError::BindFailed {
            address: format!("{}:{}", host, port),
            message: e.to_string(),
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: addr.to_string(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", addr);

    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down"),
            _ = terminate => info!("Received SIGTERM, shutting down"),
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Lowercase the header names; signature lookup and meta capture both key
/// on lowercase names.
fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_lowercase(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect()
}

/// Capture the source's own headers (`x-github-*`, `x-zammad-*`) into the
/// record's meta map. Sources without a meta prefix capture nothing.
fn capture_meta(headers: &HashMap<String, String>, source: WebhookSource) -> HashMap<String, String> {
    let Some(prefix) = source.meta_header_prefix() else {
        return HashMap::new();
    };
    headers
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Persist a verified webhook and hand it to the dispatcher.
async fn accept_webhook(
    state: &AppState,
    source: WebhookSource,
    signature: String,
    meta: HashMap<String, String>,
    body: &Bytes,
) -> Result<WebhookAccepted, WebhookHandlerError> {
    let content: serde_json::Value = serde_json::from_slice(body)?;

    let webhook = state
        .webhooks
        .create(
            NewWebhook::new(source, content)
                .with_signature(signature)
                .with_meta(meta),
        )
        .await?;

    state.dispatcher.enqueue(webhook.id)?;

    info!(
        webhook_id = %webhook.id,
        source = %source,
        "Webhook accepted and queued for processing"
    );

    Ok(WebhookAccepted {
        status: "created".to_string(),
        guid: webhook.id,
    })
}

/// Internal webhooks authenticate with a shared token instead of a body
/// signature.
#[instrument(skip(state, headers, body))]
async fn handle_internal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAccepted>, WebhookHandlerError> {
    let header_map = lowercase_headers(&headers);

    verify_internal_token(&header_map, &state.secrets.internal_token).map_err(|e| {
        warn!(error = %e, "Rejected internal webhook");
        WebhookHandlerError::InternalUnauthorized(e)
    })?;

    // The token is a credential, not a body digest; once verified it must
    // not end up in the stored record.
    let meta = capture_meta(&header_map, WebhookSource::Internal);
    let accepted =
        accept_webhook(&state, WebhookSource::Internal, String::new(), meta, &body).await?;

    Ok(Json(accepted))
}

#[instrument(skip(state, headers, body))]
async fn handle_github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAccepted>, WebhookHandlerError> {
    let header_map = lowercase_headers(&headers);

    let signature = verify_github_signature(&header_map, &body, &state.secrets.github_secret)
        .map_err(|e| {
            warn!(error = %e, "Rejected GitHub webhook");
            WebhookHandlerError::SignatureRejected(e)
        })?;

    let meta = capture_meta(&header_map, WebhookSource::Github);
    let accepted =
        accept_webhook(&state, WebhookSource::Github, signature, meta, &body).await?;

    Ok(Json(accepted))
}

#[instrument(skip(state, headers, body))]
async fn handle_zammad_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAccepted>, WebhookHandlerError> {
    let header_map = lowercase_headers(&headers);

    let signature = verify_zammad_signature(&header_map, &body, &state.secrets.zammad_secret)
        .map_err(|e| {
            warn!(error = %e, "Rejected Zammad webhook");
            WebhookHandlerError::SignatureRejected(e)
        })?;

    let meta = capture_meta(&header_map, WebhookSource::Zammad);
    let accepted =
        accept_webhook(&state, WebhookSource::Zammad, signature, meta, &body).await?;

    Ok(Json(accepted))
}

/// Liveness probe.
async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
