//! Collaborator trait definitions

use async_trait::async_trait;
use std::path::Path;

use super::types::{
    ClientError, ConnectOptions, Connection, CredentialError, Credentials, SendReceipt,
};

/// Factory for client handles (the external messaging library)
#[async_trait]
pub trait ClientConnector: Send + Sync {
    /// Latest protocol version the collaborator wants to speak, if it reports one
    async fn latest_version(&self) -> Result<Option<String>, ClientError> {
        Ok(None)
    }

    /// Open a client handle. The connection proceeds in the background and
    /// reports progress through `Connection::events`.
    async fn connect(
        &self,
        credentials: Credentials,
        options: ConnectOptions,
    ) -> Result<Connection, ClientError>;
}

/// A connected (or connecting) client handle
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Send a text message to a fully qualified address
    async fn send_text(&self, address: &str, text: &str) -> Result<SendReceipt, ClientError>;
}

/// Persistent storage for session credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load credentials from `dir`, creating the directory and empty
    /// credentials if nothing is stored yet
    async fn load_or_create(&self, dir: &Path) -> Result<Credentials, CredentialError>;

    /// Persist credentials into `dir`
    async fn save(&self, dir: &Path, credentials: &Credentials) -> Result<(), CredentialError>;
}
