//! HTTP route handlers

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use super::error::ApiError;
use super::qr;
use crate::client::{DisconnectReason, GatewayInbound};
use crate::session::{SessionPhase, StartOutcome};

/// Response for GET /status
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub session: String,
    pub env: String,
    pub starting: bool,
    pub state: String,
}

/// Query parameters for GET /qr
#[derive(Debug, Deserialize)]
pub struct QrParams {
    /// `png` (default) or `html`
    pub format: Option<String>,
}

/// Body of POST /send; `number` and `message` are accepted as aliases
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(alias = "number")]
    pub to: Option<String>,
    #[serde(alias = "message")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub ok: bool,
    pub to: String,
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestartResponse {
    pub result: StartOutcome,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub delivered: usize,
}

/// Response for GET /debug/info
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfoResponse {
    pub connected: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub starting: bool,
    pub state: SessionPhase,
    pub auth_dir: String,
    pub auth_dir_exists: bool,
    pub generation: u64,
    pub start_failures: u32,
    pub restarts_scheduled: u64,
    pub auto_reconnect: bool,
    pub last_disconnect: Option<DisconnectReason>,
    pub messages_received: u64,
}

/// GET / - Liveness probe
pub async fn root() -> &'static str {
    "OK: service alive"
}

/// GET /status - Session summary
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.session_manager.snapshot().await;
    Json(StatusResponse {
        connected: snapshot.connected,
        has_qr: snapshot.has_qr,
        session: snapshot.id,
        env: state.environment.clone(),
        starting: snapshot.starting,
        state: snapshot.phase.as_str().to_string(),
    })
}

/// GET /qr - Current pairing code as PNG, or as an HTML page with `?format=html`
pub async fn get_qr(
    State(state): State<AppState>,
    Query(params): Query<QrParams>,
) -> Result<Response, ApiError> {
    let snapshot = state.session_manager.snapshot().await;
    let Some(code) = snapshot.pairing_code else {
        return Err(ApiError::NotReady(
            "No QR code available yet. Refresh in 3-10s.".to_string(),
        ));
    };

    let png = qr::render_png(&code, state.qr_width).map_err(|e| {
        tracing::error!("Failed to render QR code: {}", e);
        ApiError::Internal("failed to render QR code".to_string())
    })?;

    let no_store = (header::CACHE_CONTROL, "no-store");
    match params.format.as_deref() {
        Some("html") => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8"), no_store],
            qr::render_html(&png),
        )
            .into_response()),
        None | Some("png") => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png"), no_store],
            bytes::Bytes::from(png),
        )
            .into_response()),
        Some(other) => Err(ApiError::Validation(format!(
            "unsupported format {:?}, expected png or html",
            other
        ))),
    }
}

/// POST /send - Forward a text message
pub async fn send(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;

    let to = request.to.filter(|s| !s.trim().is_empty());
    let text = request.text.filter(|s| !s.trim().is_empty());
    let (Some(to), Some(text)) = (to, text) else {
        return Err(ApiError::Validation(
            "fields 'to' (or 'number') and 'text' (or 'message') are required".to_string(),
        ));
    };

    let sent = state.session_manager.send_text(&to, &text).await?;
    Ok(Json(SendResponse {
        ok: true,
        to: sent.to,
        id: sent.message_id,
    }))
}

/// GET /debug/restart - Trigger a session start
pub async fn debug_restart(State(state): State<AppState>) -> Json<RestartResponse> {
    tracing::info!("DEBUG: /debug/restart invoked");
    let result = state.session_manager.start_session().await;
    Json(RestartResponse { result })
}

/// GET /debug/info - Internal state dump
pub async fn debug_info(State(state): State<AppState>) -> Json<DebugInfoResponse> {
    let snapshot = state.session_manager.snapshot().await;
    let auth_dir = state.session_manager.auth_dir();
    let auth_dir_exists = tokio::fs::try_exists(auth_dir).await.unwrap_or(false);

    Json(DebugInfoResponse {
        connected: snapshot.connected,
        has_qr: snapshot.has_qr,
        starting: snapshot.starting,
        state: snapshot.phase,
        auth_dir: auth_dir.display().to_string(),
        auth_dir_exists,
        generation: snapshot.generation,
        start_failures: snapshot.start_failures,
        restarts_scheduled: snapshot.restarts_scheduled,
        auto_reconnect: snapshot.auto_reconnect,
        last_disconnect: snapshot.last_disconnect,
        messages_received: snapshot.messages_received,
    })
}

/// POST /webhook/gateway - Event deliveries pushed by the messaging gateway
pub async fn gateway_webhook(
    State(inbound): State<GatewayInbound>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let delivered = inbound.deliver(&payload).await;
    Ok(Json(WebhookResponse {
        ok: true,
        delivered,
    }))
}

/// GET /metrics/prometheus - Prometheus text exposition
pub async fn prometheus_metrics(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
