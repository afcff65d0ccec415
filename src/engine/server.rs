// Gateway HTTP Surface
// AppState, router, handlers (qr/status/send/media/chats/messages/logout/
// webhook/health), GatewayError → HTTP mapping, serve

use crate::atoms::error::GatewayError;
use crate::engine::whatsapp::gateway::{BootstrapView, Gateway, GatewayStats};
use crate::engine::whatsapp::qr::render_qr_page;
use crate::engine::whatsapp::transport::EventSender;
use crate::engine::whatsapp::webhook::parse_webhook_event;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    /// Webhook handler feeds transport events into the event loop here.
    pub events: EventSender,
    /// Required `?token=` on webhook calls. Empty disables the check.
    pub webhook_token: Arc<str>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, events: EventSender, webhook_token: &str) -> Self {
        AppState { gateway, events, webhook_token: Arc::from(webhook_token) }
    }

    fn webhook_authorized(&self, token: Option<&str>) -> bool {
        if self.webhook_token.is_empty() {
            return true;
        }
        let given = token.unwrap_or("");
        given.len() == self.webhook_token.len()
            && bool::from(given.as_bytes().ct_eq(self.webhook_token.as_bytes()))
    }
}

// ── Errors ─────────────────────────────────────────────────────────────────

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            warn!("[server] {}", self);
        }
        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

// ── Request / response bodies ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMediaRequest {
    #[serde(default)]
    pub number: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    #[serde(flatten)]
    stats: GatewayStats,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/qr", get(qr_handler))
        .route("/status", get(status_handler))
        .route("/send", post(send_handler))
        .route("/send-message", post(send_handler))
        .route("/sendMedia", post(send_media_handler))
        .route("/send-media", post(send_media_handler))
        .route("/chats", get(chats_handler))
        .route("/chat/:id/messages", get(messages_handler))
        .route("/logout", get(logout_handler))
        .route("/webhook/whatsapp", post(webhook_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("[server] Listening on http://{}", addr);
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

// ── Handlers ───────────────────────────────────────────────────────────────

async fn qr_handler(State(state): State<AppState>) -> Response {
    let view = state.gateway.bootstrap_artifact();
    let body = render_qr_page(&view);
    match view {
        BootstrapView::Available(_) => Html(body).into_response(),
        _ => body.into_response(),
    }
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "status": state.gateway.status() }))
}

async fn send_handler(State(state): State<AppState>, Json(req): Json<SendRequest>) -> Response {
    match state.gateway.send_message(&req.number, &req.message).await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn send_media_handler(State(state): State<AppState>, Json(req): Json<SendMediaRequest>) -> Response {
    let result = state
        .gateway
        .send_media(
            &req.number,
            req.media_url.as_deref(),
            req.media_type.as_deref(),
            req.caption.as_deref(),
        )
        .await;
    match result {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn chats_handler(State(state): State<AppState>) -> Response {
    match state.gateway.list_chats().await {
        Ok(chats) => Json(chats).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn messages_handler(State(state): State<AppState>, Path(chat_id): Path<String>) -> Response {
    match state.gateway.list_messages(&chat_id).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn logout_handler(State(state): State<AppState>) -> Response {
    match state.gateway.logout().await {
        Ok(()) => "Logged out successfully".into_response(),
        Err(e) => e.into_response(),
    }
}

/// `200 OK` for every authorized call, whatever the body: Evolution does
/// not act on webhook failures. A missing or wrong token is `401`.
async fn webhook_handler(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    if !state.webhook_authorized(query.token.as_deref()) {
        warn!("[webhook] Rejected call without a valid token");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            debug!("[webhook] Unparseable body ({} bytes): {}", body.len(), e);
            return "OK".into_response();
        }
    };
    for event in parse_webhook_event(&payload) {
        if state.events.send(event).await.is_err() {
            warn!("[webhook] Event loop is gone, dropping event");
            break;
        }
    }
    "OK".into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse { ok: true, stats: state.gateway.stats() })
}
