//! Pairlink Server Library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod client;
pub mod config;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use client::{ClientConnector, CredentialStore, FileCredentialStore, GatewayConnector};
pub use server::{AppState, app_router};
pub use session::manager::SessionManager;
