//! Shared-secret request gate

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::AppState;
use super::error::ApiError;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths readable without the shared secret (GET/HEAD only)
const PUBLIC_PATHS: &[&str] = &["/", "/qr", "/status"];

/// Static shared secret, held as a SHA-256 digest
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: Sha256::digest(secret.as_bytes()).into(),
        }
    }

    /// Constant-time check of a presented key
    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        let candidate: [u8; 32] = Sha256::digest(presented.as_bytes()).into();
        candidate[..].ct_eq(&self.digest[..]).into()
    }
}

pub fn is_public(method: &Method, path: &str) -> bool {
    (method == Method::GET || method == Method::HEAD) && PUBLIC_PATHS.contains(&path)
}

/// Middleware rejecting non-public requests without the shared secret
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state.api_key.verify(presented) {
        tracing::warn!(
            "Rejected {} {}: missing or invalid API key",
            request.method(),
            request.uri().path()
        );
        metrics::counter!("pairlink_unauthorized_requests_total").increment(1);
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
