//! Collaborator-facing types and error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use super::service::MessagingClient;

/// Disconnect status code the collaborator uses for a logged-out device
pub const LOGGED_OUT_CODE: u16 = 401;

/// Errors raised by the messaging collaborator
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    #[error("Client connection closed")]
    Closed,
}

/// Errors raised by the credential store
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed credentials file: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Authorization material kept between runs.
///
/// Only `registered` and `me` are interpreted; every other key is carried
/// through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub registered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Connection lifecycle reported by the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Close,
}

/// Why a connection closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "code", rename_all = "snake_case")]
pub enum DisconnectReason {
    LoggedOut,
    Other(Option<u16>),
}

impl DisconnectReason {
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(LOGGED_OUT_CODE) => Self::LoggedOut,
            other => Self::Other(other),
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedOut => write!(f, "logged out"),
            Self::Other(Some(code)) => write!(f, "code {}", code),
            Self::Other(None) => write!(f, "unknown"),
        }
    }
}

/// A single connection-state notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionUpdate {
    /// Freshly issued pairing code, if any
    pub qr: Option<String>,
    pub connection: Option<ConnectionPhase>,
    /// Set alongside `ConnectionPhase::Close`
    pub last_disconnect: Option<DisconnectReason>,
}

impl ConnectionUpdate {
    pub fn pairing_code(code: impl Into<String>) -> Self {
        Self {
            qr: Some(code.into()),
            ..Self::default()
        }
    }

    /// Link lost without closing; the collaborator is re-establishing it
    pub fn connecting() -> Self {
        Self {
            connection: Some(ConnectionPhase::Connecting),
            ..Self::default()
        }
    }

    pub fn open() -> Self {
        Self {
            connection: Some(ConnectionPhase::Open),
            ..Self::default()
        }
    }

    pub fn close(reason: DisconnectReason) -> Self {
        Self {
            connection: Some(ConnectionPhase::Close),
            last_disconnect: Some(reason),
            ..Self::default()
        }
    }
}

/// Notifications emitted by a client handle, in emission order
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connection(ConnectionUpdate),
    CredentialsUpdated(Credentials),
    MessageReceived { from: String, text: String },
}

/// Options passed to `ClientConnector::connect`
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub session_name: String,
    /// Protocol version reported by the collaborator, when available
    pub version: Option<String>,
    /// Browser triple announced to the paired device
    pub browser: [String; 3],
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            version: None,
            browser: [
                "PairlinkBot".to_string(),
                "Chrome".to_string(),
                "18".to_string(),
            ],
            connect_timeout: Duration::from_secs(60),
        }
    }
}

/// Outcome of a forwarded text message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// A live client handle together with its ordered event stream
pub struct Connection {
    pub client: Arc<dyn MessagingClient>,
    pub events: mpsc::Receiver<ClientEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logged_out_code_maps_to_logged_out() {
        assert!(DisconnectReason::from_code(Some(401)).is_logged_out());
        assert_eq!(
            DisconnectReason::from_code(Some(428)),
            DisconnectReason::Other(Some(428))
        );
        assert!(!DisconnectReason::from_code(None).is_logged_out());
    }

    #[test]
    fn test_credentials_preserve_unknown_keys() {
        let raw = r#"{"registered":true,"me":"123@s.whatsapp.net","noiseKey":{"pub":"abc"}}"#;
        let creds: Credentials = serde_json::from_str(raw).unwrap();
        assert!(creds.registered);
        assert_eq!(creds.me.as_deref(), Some("123@s.whatsapp.net"));
        assert!(creds.extra.contains_key("noiseKey"));

        let back = serde_json::to_value(&creds).unwrap();
        assert_eq!(back["noiseKey"]["pub"], "abc");
    }

    #[test]
    fn test_missing_fields_default() {
        let creds: Credentials = serde_json::from_str("{}").unwrap();
        assert_eq!(creds, Credentials::default());
    }
}
