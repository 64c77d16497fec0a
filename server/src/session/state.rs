use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::DisconnectReason;

/// Domain appended to bare phone numbers
pub const USER_ADDRESS_SUFFIX: &str = "@s.whatsapp.net";

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created, never started
    Idle,
    /// A start is in flight; excludes concurrent starts
    Starting,
    /// Client handle registered, waiting for the first connection update
    Connecting,
    /// A pairing code is available to scan
    AwaitingScan,
    Connected,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Connecting => "connecting",
            Self::AwaitingScan => "awaiting_scan",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// The single messaging session of this process
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub phase: SessionPhase,
    /// Latest pairing code; cleared once connected
    pub pairing_code: Option<String>,
    /// Cleared on a logged-out disconnect
    pub auto_reconnect: bool,
    /// Incremented on every start; events from older generations are stale
    pub generation: u64,
    /// Consecutive failed starts
    pub start_failures: u32,
    pub last_disconnect: Option<DisconnectReason>,
    pub restarts_scheduled: u64,
    pub connected_at: Option<u64>,
    pub messages_received: u64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: SessionPhase::Idle,
            pairing_code: None,
            auto_reconnect: true,
            generation: 0,
            start_failures: 0,
            last_disconnect: None,
            restarts_scheduled: 0,
            connected_at: None,
            messages_received: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }

    pub fn is_starting(&self) -> bool {
        self.phase == SessionPhase::Starting
    }
}

/// Point-in-time view of a session, safe to hand to HTTP handlers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub phase: SessionPhase,
    pub connected: bool,
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub starting: bool,
    #[serde(skip)]
    pub pairing_code: Option<String>,
    pub auto_reconnect: bool,
    pub generation: u64,
    pub start_failures: u32,
    pub last_disconnect: Option<DisconnectReason>,
    pub restarts_scheduled: u64,
    pub connected_at: Option<u64>,
    pub messages_received: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            phase: session.phase,
            connected: session.is_connected(),
            has_qr: session.pairing_code.is_some(),
            starting: session.is_starting(),
            pairing_code: session.pairing_code.clone(),
            auto_reconnect: session.auto_reconnect,
            generation: session.generation,
            start_failures: session.start_failures,
            last_disconnect: session.last_disconnect,
            restarts_scheduled: session.restarts_scheduled,
            connected_at: session.connected_at,
            messages_received: session.messages_received,
        }
    }
}

/// Resolve a user-supplied destination into a fully qualified address.
///
/// Addresses already containing `@` pass through unchanged. Anything else is
/// reduced to its digits and given the user domain. Returns `None` when no
/// digits remain.
pub fn normalize_address(to: &str) -> Option<String> {
    let to = to.trim();
    if to.contains('@') {
        return Some(to.to_string());
    }
    let digits: String = to.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    Some(format!("{}{}", digits, USER_ADDRESS_SUFFIX))
}

/// Get current timestamp in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
