use crate::client::{
    ClientConnector, ClientError, ClientEvent, ConnectOptions, Connection, ConnectionPhase,
    ConnectionUpdate, CredentialError, CredentialStore, DisconnectReason, MessagingClient,
};
use crate::server::qr;
use crate::session::retry::RetryPolicy;
use crate::session::state::{
    Session, SessionPhase, SessionSnapshot, normalize_address, now_millis,
};
use metrics::{counter, histogram};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors that abort a session start
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),
}

/// Errors returned when forwarding a message
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Session is not connected")]
    NotConnected,

    #[error("Invalid destination: {0}")]
    InvalidAddress(String),

    #[error("Forwarding failed: {0}")]
    Client(#[from] ClientError),
}

/// Result of a `start_session` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    /// Handle registered; the connection continues in the background
    Started,
    /// Another start was in flight, nothing was done
    AlreadyStarting,
    /// Start failed; a retry may have been scheduled
    Failed,
}

/// A message accepted by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Normalized destination address
    pub to: String,
    pub message_id: Option<String>,
}

/// Static settings for the session manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub auth_dir: PathBuf,
    pub retry: RetryPolicy,
    /// Template for connect options; the version is filled in per start
    pub connect_options: ConnectOptions,
    /// Log each pairing code as a terminal-printable QR
    pub print_qr: bool,
}

impl ManagerSettings {
    pub fn new(session_name: impl Into<String>, auth_dir: impl Into<PathBuf>) -> Self {
        Self {
            auth_dir: auth_dir.into(),
            retry: RetryPolicy::default(),
            connect_options: ConnectOptions::new(session_name),
            print_qr: true,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_print_qr(mut self, enabled: bool) -> Self {
        self.print_qr = enabled;
        self
    }
}

struct Inner {
    session: Session,
    client: Option<Arc<dyn MessagingClient>>,
    event_task: Option<JoinHandle<()>>,
}

/// Session manager: sole owner and writer of the session and its client handle
pub struct SessionManager {
    inner: RwLock<Inner>,
    connector: Arc<dyn ClientConnector>,
    store: Arc<dyn CredentialStore>,
    settings: ManagerSettings,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn ClientConnector>,
        store: Arc<dyn CredentialStore>,
        settings: ManagerSettings,
    ) -> Self {
        let session = Session::new(settings.connect_options.session_name.clone());
        Self {
            inner: RwLock::new(Inner {
                session,
                client: None,
                event_task: None,
            }),
            connector,
            store,
            settings,
        }
    }

    pub fn session_name(&self) -> &str {
        &self.settings.connect_options.session_name
    }

    pub fn auth_dir(&self) -> &Path {
        &self.settings.auth_dir
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        SessionSnapshot::from(&inner.session)
    }

    /// Bring up a client handle.
    ///
    /// Returns once the handle is registered. Concurrent calls while a start
    /// is in flight are no-ops.
    pub async fn start_session(self: &Arc<Self>) -> StartOutcome {
        let Some(generation) = self.begin_start().await else {
            info!("start_session ignored: a start is already in flight");
            return StartOutcome::AlreadyStarting;
        };

        let started = Instant::now();
        counter!("pairlink_session_starts_total").increment(1);
        info!(
            "Starting session {} (generation {})",
            self.session_name(),
            generation
        );

        match self.open_connection().await {
            Ok(connection) => {
                self.install(generation, connection).await;
                histogram!("pairlink_session_start_duration_seconds").record(started.elapsed());
                info!("Session started, listening for client events");
                StartOutcome::Started
            }
            Err(e) => {
                error!("Session start failed: {}", e);
                counter!("pairlink_session_start_failures_total").increment(1);
                self.fail_start(generation).await;
                StartOutcome::Failed
            }
        }
    }

    /// Forward a text message through the connected client
    pub async fn send_text(&self, to: &str, text: &str) -> Result<SentMessage, SendError> {
        let address =
            normalize_address(to).ok_or_else(|| SendError::InvalidAddress(to.to_string()))?;

        let client = {
            let inner = self.inner.read().await;
            if !inner.session.is_connected() {
                return Err(SendError::NotConnected);
            }
            inner.client.clone().ok_or(SendError::NotConnected)?
        };

        let receipt = client.send_text(&address, text).await.inspect_err(|_| {
            counter!("pairlink_messages_failed_total").increment(1);
        })?;
        counter!("pairlink_messages_sent_total").increment(1);
        debug!("Forwarded message to {} (id={:?})", address, receipt.message_id);

        Ok(SentMessage {
            to: address,
            message_id: receipt.message_id,
        })
    }

    /// Enter `Starting`, or return `None` if a start is already in flight
    async fn begin_start(&self) -> Option<u64> {
        let mut inner = self.inner.write().await;
        if inner.session.is_starting() {
            return None;
        }

        if let Some(task) = inner.event_task.take() {
            task.abort();
        }
        inner.client = None;

        let session = &mut inner.session;
        session.phase = SessionPhase::Starting;
        session.generation += 1;
        session.pairing_code = None;
        session.auto_reconnect = true;
        Some(session.generation)
    }

    async fn open_connection(&self) -> Result<Connection, StartError> {
        let version = self.connector.latest_version().await?;
        debug!("Protocol version: {:?}", version);

        let credentials = self.store.load_or_create(&self.settings.auth_dir).await?;
        debug!("Credentials ready in {:?}", self.settings.auth_dir);

        let mut options = self.settings.connect_options.clone();
        options.version = version;
        Ok(self.connector.connect(credentials, options).await?)
    }

    async fn install(self: &Arc<Self>, generation: u64, connection: Connection) {
        let mut inner = self.inner.write().await;
        if inner.session.generation != generation {
            warn!("Discarding client handle from superseded start {}", generation);
            return;
        }
        inner.client = Some(connection.client);
        inner.session.phase = SessionPhase::Connecting;
        inner.event_task = Some(self.spawn_event_loop(generation, connection.events));
    }

    async fn fail_start(self: &Arc<Self>, generation: u64) {
        let delay = {
            let mut inner = self.inner.write().await;
            let session = &mut inner.session;
            if session.generation != generation {
                return;
            }
            session.phase = SessionPhase::Closed;
            session.start_failures += 1;

            match self.settings.retry.start_retry_delay(session.start_failures) {
                Some(delay) => {
                    session.restarts_scheduled += 1;
                    Some(delay)
                }
                None => {
                    error!(
                        "Giving up after {} failed starts; use /debug/restart to try again",
                        session.start_failures
                    );
                    None
                }
            }
        };

        if let Some(delay) = delay {
            warn!("Retrying session start in {:?}", delay);
            self.schedule_start(delay);
        }
    }

    fn schedule_start(self: &Arc<Self>, delay: Duration) {
        counter!("pairlink_restarts_scheduled_total").increment(1);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.start_session().await;
        });
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        generation: u64,
        events: mpsc::Receiver<ClientEvent>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.run_events(generation, events).await })
    }

    async fn run_events(self: Arc<Self>, generation: u64, mut events: mpsc::Receiver<ClientEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(generation, event).await {
                debug!("Dropping events from superseded generation {}", generation);
                return;
            }
        }
        debug!("Event stream for generation {} ended", generation);
    }

    /// Apply one client event. Returns false if the event is stale.
    async fn handle_event(self: &Arc<Self>, generation: u64, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Connection(update) => self.apply_connection_update(generation, update).await,
            ClientEvent::CredentialsUpdated(credentials) => {
                if !self.is_current(generation).await {
                    return false;
                }
                if let Err(e) = self.store.save(&self.settings.auth_dir, &credentials).await {
                    error!("Failed to persist credentials: {}", e);
                }
                true
            }
            ClientEvent::MessageReceived { from, text } => {
                {
                    let mut inner = self.inner.write().await;
                    if inner.session.generation != generation {
                        return false;
                    }
                    inner.session.messages_received += 1;
                }
                counter!("pairlink_messages_received_total").increment(1);
                info!("Incoming message {} -> {}", from, text);
                true
            }
        }
    }

    async fn apply_connection_update(
        self: &Arc<Self>,
        generation: u64,
        update: ConnectionUpdate,
    ) -> bool {
        let mut fresh_code = None;
        let reconnect = {
            let mut guard = self.inner.write().await;
            let Inner {
                session, client, ..
            } = &mut *guard;
            if session.generation != generation {
                return false;
            }

            if let Some(code) = update.qr {
                if self.settings.print_qr {
                    fresh_code = Some(code.clone());
                }
                session.pairing_code = Some(code);
                session.phase = SessionPhase::AwaitingScan;
                info!("Pairing code received; visit /qr to scan it (expires in ~60s)");
            }

            match update.connection {
                Some(ConnectionPhase::Open) => {
                    session.phase = SessionPhase::Connected;
                    session.pairing_code = None;
                    session.connected_at = Some(now_millis());
                    session.start_failures = 0;
                    session.last_disconnect = None;
                    info!("Session {} connected", session.id);
                    false
                }
                Some(ConnectionPhase::Close) => {
                    let reason = update
                        .last_disconnect
                        .unwrap_or(DisconnectReason::Other(None));
                    session.phase = SessionPhase::Closed;
                    session.pairing_code = None;
                    session.connected_at = None;
                    session.last_disconnect = Some(reason);
                    *client = None;

                    if reason.is_logged_out() {
                        session.auto_reconnect = false;
                        warn!(
                            "Session {} logged out; delete {:?} and restart to pair again",
                            session.id, self.settings.auth_dir
                        );
                        false
                    } else if session.auto_reconnect {
                        session.restarts_scheduled += 1;
                        info!(
                            "Connection closed ({}), reconnecting in {:?}",
                            reason, self.settings.retry.reconnect_delay
                        );
                        true
                    } else {
                        false
                    }
                }
                Some(ConnectionPhase::Connecting) => {
                    if session.is_connected() {
                        session.phase = SessionPhase::Connecting;
                        session.connected_at = None;
                        warn!("Session {} lost its link, waiting for it to recover", session.id);
                    }
                    false
                }
                None => false,
            }
        };

        if let Some(code) = fresh_code {
            match qr::render_terminal(&code) {
                Ok(art) => info!("Scan this code to pair:\n{}", art),
                Err(e) => warn!("Failed to render pairing code for the terminal: {}", e),
            }
        }
        if reconnect {
            self.schedule_start(self.settings.retry.reconnect_delay);
        }
        true
    }

    async fn is_current(&self, generation: u64) -> bool {
        self.inner.read().await.session.generation == generation
    }
}
