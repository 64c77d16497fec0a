//! Messaging collaborator interface
//!
//! This module provides:
//! - `ClientConnector` / `MessagingClient` traits abstracting the protocol client
//! - `CredentialStore` trait and the file-backed `FileCredentialStore`
//! - `GatewayConnector`, which drives an Evolution-API-compatible gateway
//! - `GatewayInbound`, which feeds the gateway's webhook deliveries back in
//! - Event and error types shared with the session manager

mod credentials;
mod gateway;
mod service;
mod types;
mod webhook;

pub use credentials::FileCredentialStore;
pub use gateway::{GatewayClient, GatewayConnector, GatewayInbound};
pub use service::{ClientConnector, CredentialStore, MessagingClient};
pub use types::{
    ClientError, ClientEvent, ConnectOptions, Connection, ConnectionPhase, ConnectionUpdate,
    CredentialError, Credentials, DisconnectReason, LOGGED_OUT_CODE, SendReceipt,
};
