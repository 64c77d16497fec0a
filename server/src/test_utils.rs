//! Test Utilities Module
//!
//! Provides mock collaborators and helpers for testing the session manager.
//! This module is only compiled when running tests.

#![cfg(test)]

use crate::client::{
    ClientConnector, ClientError, ClientEvent, ConnectOptions, Connection, CredentialError,
    CredentialStore, Credentials, MessagingClient, SendReceipt,
};
use crate::session::manager::{ManagerSettings, SessionManager};
use crate::session::retry::RetryPolicy;
use crate::session::state::SessionSnapshot;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

// ============================================================================
// Mock collaborators
// ============================================================================

type SentLog = Arc<Mutex<Vec<(String, String)>>>;

/// Records forwarded messages
pub struct MockClient {
    sent: SentLog,
}

#[async_trait]
impl MessagingClient for MockClient {
    async fn send_text(&self, address: &str, text: &str) -> Result<SendReceipt, ClientError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((address.to_string(), text.to_string()));
        Ok(SendReceipt {
            message_id: Some(format!("MSG{}", sent.len())),
        })
    }
}

/// Connector that hands out mock clients and lets tests inject events
pub struct MockConnector {
    connects: AtomicUsize,
    failures_left: AtomicUsize,
    senders: Mutex<Vec<mpsc::Sender<ClientEvent>>>,
    sent: SentLog,
    gate: Option<Notify>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            connects: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            senders: Mutex::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// Every connect blocks until `release` is called
    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.notify_one();
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Emit an event on the most recent connection
    pub async fn emit(&self, event: ClientEvent) {
        let sender = self.senders.lock().unwrap().last().cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Emit an event on the `index`-th successful connection
    pub async fn emit_on(&self, index: usize, event: ClientEvent) {
        let sender = self.senders.lock().unwrap().get(index).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }
}

#[async_trait]
impl ClientConnector for MockConnector {
    async fn latest_version(&self) -> Result<Option<String>, ClientError> {
        Ok(Some("2.3000.1".to_string()))
    }

    async fn connect(
        &self,
        _credentials: Credentials,
        _options: ConnectOptions,
    ) -> Result<Connection, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::InvalidResponse("mock connect failure".to_string()));
        }

        let (tx, rx) = mpsc::channel(16);
        self.senders.lock().unwrap().push(tx);
        Ok(Connection {
            client: Arc::new(MockClient {
                sent: self.sent.clone(),
            }),
            events: rx,
        })
    }
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    saved: Mutex<Vec<Credentials>>,
    load_failures_left: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn failing_loads(count: usize) -> Self {
        Self {
            load_failures_left: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<Credentials> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_or_create(&self, _dir: &Path) -> Result<Credentials, CredentialError> {
        let failing = self
            .load_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CredentialError::Io(std::io::Error::other("mock load failure")));
        }
        Ok(self.saved.lock().unwrap().last().cloned().unwrap_or_default())
    }

    async fn save(&self, _dir: &Path, credentials: &Credentials) -> Result<(), CredentialError> {
        self.saved.lock().unwrap().push(credentials.clone());
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Manager with mock collaborators and a zero-delay retry policy
pub fn create_test_manager() -> (
    Arc<SessionManager>,
    Arc<MockConnector>,
    Arc<MemoryCredentialStore>,
) {
    let connector = Arc::new(MockConnector::new());
    let store = Arc::new(MemoryCredentialStore::default());
    let settings = ManagerSettings::new("test-session", "/tmp/pairlink-test")
        .with_retry(RetryPolicy::immediate());
    let manager = Arc::new(SessionManager::new(connector.clone(), store.clone(), settings));
    (manager, connector, store)
}

/// Poll until the session matches `predicate`; panics after two seconds
pub async fn wait_for_session(
    manager: &SessionManager,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..200 {
        let snapshot = manager.snapshot().await;
        if predicate(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "session never reached expected state: {:?}",
        manager.snapshot().await
    );
}

/// Poll until at least `count` connects happened
pub async fn wait_for_connects(connector: &MockConnector, count: usize) -> bool {
    for _ in 0..200 {
        if connector.connect_count() >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
