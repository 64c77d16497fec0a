//! HTTP facade: router, shared state and access control

pub mod auth;
pub mod error;
pub mod qr;
pub mod routes;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::client::GatewayInbound;
use crate::session::SessionManager;
pub use auth::{API_KEY_HEADER, ApiKey};
pub use error::ApiError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub api_key: ApiKey,
    /// Deployment environment reported by `/status`
    pub environment: String,
    pub qr_width: u32,
    pub debug_routes: bool,
    pub prometheus: Option<PrometheusHandle>,
    /// Receives the gateway's webhook deliveries when set
    pub gateway_inbound: Option<GatewayInbound>,
}

impl AppState {
    pub fn new(session_manager: Arc<SessionManager>, api_key: &str) -> Self {
        Self {
            session_manager,
            api_key: ApiKey::new(api_key),
            environment: "production".to_string(),
            qr_width: 300,
            debug_routes: true,
            prometheus: None,
            gateway_inbound: None,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_qr_width(mut self, width: u32) -> Self {
        self.qr_width = width;
        self
    }

    pub fn with_debug_routes(mut self, enabled: bool) -> Self {
        self.debug_routes = enabled;
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn with_gateway_inbound(mut self, inbound: GatewayInbound) -> Self {
        self.gateway_inbound = Some(inbound);
        self
    }
}

/// Build the application router. Every route except the public reads sits
/// behind the shared-secret check, including unmatched paths.
pub fn app_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(routes::root))
        .route("/status", get(routes::status))
        .route("/qr", get(routes::get_qr))
        .route("/send", post(routes::send));

    if state.debug_routes {
        router = router
            .route("/debug/restart", get(routes::debug_restart))
            .route("/debug/info", get(routes::debug_info));
    }
    if let Some(handle) = state.prometheus.clone() {
        router = router.route(
            "/metrics/prometheus",
            get(routes::prometheus_metrics).with_state(handle),
        );
    }
    if let Some(inbound) = state.gateway_inbound.clone() {
        router = router.route(
            "/webhook/gateway",
            post(routes::gateway_webhook).with_state(inbound),
        );
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .with_state(state)
}
