//! Webhook Server Core Tool
//!
//! HTTP transport in front of the dispatcher. It verifies signatures, parses
//! payloads and maps dispatch results onto response codes. It never runs a
//! workflow itself.
//!
//! # Endpoints
//!
//! - GET / - Health check
//! - POST /webhook/linear - Linear issue events
//! - POST /webhook/github - GitHub issue comments
//! - POST /trigger - Manual trigger `{"requirement": "...", "pipeline": false}`

pub mod signature;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sdk::event::{parse_github_event, parse_linear_event, InboundEvent, PayloadError};
use sdk::{DispatchHandle, DispatchRequest, DispatchStatus, EngineError, TriggerRequest};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use signature::verify_signature;

/// Header carrying the Linear body signature
pub const LINEAR_SIGNATURE_HEADER: &str = "linear-signature";
/// Header carrying the GitHub body signature
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header naming the GitHub event type
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

/// Transport settings
#[derive(Debug, Clone, Default)]
pub struct WebhookServerConfig {
    pub bind: String,
    pub port: u16,
    /// Answer every webhook with `disabled` instead of dispatching
    pub disabled: bool,
    pub linear_secret: Option<String>,
    pub github_secret: Option<String>,
}

/// State shared across handlers
#[derive(Clone)]
struct ServerState {
    dispatcher: Arc<dyn DispatchHandle>,
    disabled: bool,
    linear_secret: Option<Arc<str>>,
    github_secret: Option<Arc<str>>,
}

/// Webhook server
pub struct WebhookServer {
    config: WebhookServerConfig,
    dispatcher: Arc<dyn DispatchHandle>,
    addr: Option<SocketAddr>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server_task: Option<tokio::task::JoinHandle<()>>,
}

impl WebhookServer {
    pub fn new(config: WebhookServerConfig, dispatcher: Arc<dyn DispatchHandle>) -> Self {
        Self {
            config,
            dispatcher,
            addr: None,
            shutdown_tx: None,
            server_task: None,
        }
    }

    /// Build the router without binding a socket
    pub fn router(&self) -> Router {
        build_router(&self.config, Arc::clone(&self.dispatcher))
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Bind and serve in a background task
    pub async fn start(&mut self) -> Result<SocketAddr, EngineError> {
        if self.config.linear_secret.is_none() {
            tracing::warn!("No Linear webhook secret configured; signatures will not be verified");
        }
        if self.config.disabled {
            tracing::warn!("Webhook processing is disabled; events will not be dispatched");
        }

        let bind = format!("{}:{}", self.config.bind, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| EngineError::Network(format!("Failed to bind to {}: {}", bind, e)))?;

        let addr = listener
            .local_addr()
            .map_err(|e| EngineError::Network(format!("Failed to get local address: {}", e)))?;

        let app = self.router();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            tracing::info!("Webhook server listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.await.ok();
                    tracing::info!("Webhook server shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Webhook server error: {}", e);
                });
        });

        self.addr = Some(addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.server_task = Some(task);
        Ok(addr)
    }

    /// Stop accepting requests and wait for in-flight responses
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            shutdown_tx.send(()).ok();
        }
        if let Some(task) = self.server_task.take() {
            if let Err(e) = task.await {
                tracing::error!("Webhook server task failed: {}", e);
            }
            tracing::info!("Webhook server stopped");
        }
    }
}

fn build_router(config: &WebhookServerConfig, dispatcher: Arc<dyn DispatchHandle>) -> Router {
    let state = ServerState {
        dispatcher,
        disabled: config.disabled,
        linear_secret: non_empty(&config.linear_secret),
        github_secret: non_empty(&config.github_secret),
    };

    Router::new()
        .route("/", get(health_handler))
        .route("/webhook/linear", post(linear_handler))
        .route("/webhook/github", post(github_handler))
        .route("/trigger", post(trigger_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn non_empty(secret: &Option<String>) -> Option<Arc<str>> {
    secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Arc::from)
}

/// Health check
async fn health_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "message": "Foreman webhook server",
        "disabled": state.disabled,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Linear issue events
async fn linear_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.disabled {
        return disabled_response();
    }
    if let Some(secret) = &state.linear_secret {
        if !signature_matches(secret, &headers, LINEAR_SIGNATURE_HEADER, &body) {
            tracing::warn!("Rejected Linear webhook with invalid signature");
            return unauthorized();
        }
    }

    match parse_linear_event(&body) {
        Ok(InboundEvent::Issue { action, item }) => {
            tracing::info!(
                item = %item.display_ref(),
                action = action.as_str(),
                "Received Linear issue event"
            );
            let status = state
                .dispatcher
                .dispatch(DispatchRequest::Classify(item))
                .await;
            dispatch_response(status)
        }
        Ok(InboundEvent::Comment { .. }) | Ok(InboundEvent::Unsupported { .. }) => {
            ignored_response(&body)
        }
        Err(e) => bad_request(e),
    }
}

/// GitHub issue comments
async fn github_handler(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.disabled {
        return disabled_response();
    }
    if let Some(secret) = &state.github_secret {
        if !signature_matches(secret, &headers, GITHUB_SIGNATURE_HEADER, &body) {
            tracing::warn!("Rejected GitHub webhook with invalid signature");
            return unauthorized();
        }
    }

    let event_name = headers
        .get(GITHUB_EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match parse_github_event(event_name, &body) {
        Ok(InboundEvent::Comment { item }) => {
            tracing::info!(item = %item.display_ref(), "Received GitHub comment trigger");
            let status = state
                .dispatcher
                .dispatch(DispatchRequest::Pipeline(item))
                .await;
            dispatch_response(status)
        }
        Ok(InboundEvent::Unsupported { event_type }) => (
            StatusCode::OK,
            Json(json!({"status": "ignored", "message": format!("Event type: {}", event_type)})),
        )
            .into_response(),
        Ok(InboundEvent::Issue { .. }) => (
            StatusCode::OK,
            Json(json!({"status": "ignored", "message": format!("Event type: {}", event_name)})),
        )
            .into_response(),
        Err(e) => bad_request(e),
    }
}

/// Manual trigger
async fn trigger_handler(State(state): State<ServerState>, body: Bytes) -> Response {
    if state.disabled {
        return disabled_response();
    }

    let request: TriggerRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(PayloadError::Json(e)),
    };

    match request.into_dispatch() {
        Some(request) => {
            tracing::info!(title = %request.item().title, "Received manual trigger");
            let status = state.dispatcher.dispatch(request).await;
            dispatch_response(status)
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "error": "Missing requirement"})),
        )
            .into_response(),
    }
}

fn signature_matches(secret: &str, headers: &HeaderMap, header: &str, body: &[u8]) -> bool {
    headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .map(|sig| verify_signature(secret, body, sig))
        .unwrap_or(false)
}

fn dispatch_response(status: DispatchStatus) -> Response {
    let code = match status {
        DispatchStatus::Accepted { .. } | DispatchStatus::Skipped { .. } => StatusCode::OK,
        DispatchStatus::Busy | DispatchStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(status)).into_response()
}

fn disabled_response() -> Response {
    (
        StatusCode::OK,
        Json(json!({"status": "disabled", "message": "Webhook processing is disabled"})),
    )
        .into_response()
}

fn ignored_response(body: &[u8]) -> Response {
    let event_type = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
        .unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({"status": "ignored", "message": format!("Event type: {}", event_type)})),
    )
        .into_response()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"status": "error", "error": "Invalid signature"})),
    )
        .into_response()
}

fn bad_request(e: PayloadError) -> Response {
    tracing::warn!("Rejected malformed payload: {}", e);
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "error": e.to_string()})),
    )
        .into_response()
}
