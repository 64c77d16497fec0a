//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use pairlink_server::client::{
    ClientConnector, ClientError, ClientEvent, ConnectOptions, Connection, ConnectionUpdate,
    Credentials, MessagingClient, SendReceipt,
};
use pairlink_server::session::{ManagerSettings, RetryPolicy, SessionManager, SessionSnapshot};
use pairlink_server::{AppState, FileCredentialStore, app_router};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_API_KEY: &str = "test-secret";

/// Client that records forwarded messages and can be told to fail
pub struct RecordingClient {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl MessagingClient for RecordingClient {
    async fn send_text(&self, address: &str, text: &str) -> Result<SendReceipt, ClientError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Rejected {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string()));
        Ok(SendReceipt {
            message_id: Some("3EB0TEST".to_string()),
        })
    }
}

/// Mock connector for driving the session through HTTP tests
#[derive(Default)]
pub struct MockConnector {
    connects: AtomicUsize,
    sender: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail_sends: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub async fn emit(&self, update: ConnectionUpdate) {
        let sender = self.sender.lock().unwrap().clone();
        if let Some(sender) = sender {
            let _ = sender.send(ClientEvent::Connection(update)).await;
        }
    }
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn connect(
        &self,
        _credentials: Credentials,
        _options: ConnectOptions,
    ) -> Result<Connection, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *self.sender.lock().unwrap() = Some(tx);
        Ok(Connection {
            client: Arc::new(RecordingClient {
                sent: self.sent.clone(),
                fail: self.fail_sends.clone(),
            }),
            events: rx,
        })
    }
}

/// Everything an HTTP test needs
pub struct TestApp {
    pub router: Router,
    pub manager: Arc<SessionManager>,
    pub connector: Arc<MockConnector>,
    pub auth_root: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let auth_root = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::default());
        let settings = ManagerSettings::new("it-session", auth_root.path().join("it-session"))
            .with_retry(RetryPolicy::immediate());
        let manager = Arc::new(SessionManager::new(
            connector.clone(),
            Arc::new(FileCredentialStore::new()),
            settings,
        ));
        let state = AppState::new(manager.clone(), TEST_API_KEY).with_environment("test");

        Self {
            router: app_router(state),
            manager,
            connector,
            auth_root,
        }
    }

    /// Start the session and drive it to `Connected`
    pub async fn connected() -> Self {
        let app = Self::new();
        app.manager.start_session().await;
        app.connector.emit(ConnectionUpdate::open()).await;
        app.wait_for(|s| s.connected).await;
        app
    }

    /// Start the session and deliver a pairing code
    pub async fn awaiting_scan(code: &str) -> Self {
        let app = Self::new();
        app.manager.start_session().await;
        app.connector
            .emit(ConnectionUpdate::pairing_code(code))
            .await;
        app.wait_for(|s| s.has_qr).await;
        app
    }

    pub async fn wait_for(&self, predicate: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..200 {
            let snapshot = self.manager.snapshot().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached expected state");
    }
}

/// Initialize test logging for detailed output
pub fn init_test_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairlink_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
