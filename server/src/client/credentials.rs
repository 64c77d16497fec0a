//! File-backed credential store

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::service::CredentialStore;
use super::types::{CredentialError, Credentials};

const CREDS_FILE: &str = "creds.json";

/// Stores credentials as `creds.json` inside the session directory
#[derive(Debug, Clone, Default)]
pub struct FileCredentialStore;

impl FileCredentialStore {
    pub fn new() -> Self {
        Self
    }

    fn creds_path(dir: &Path) -> PathBuf {
        dir.join(CREDS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load_or_create(&self, dir: &Path) -> Result<Credentials, CredentialError> {
        tokio::fs::create_dir_all(dir).await?;

        let path = Self::creds_path(dir);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let creds: Credentials = serde_json::from_slice(&bytes)?;
                debug!(
                    "Loaded credentials from {:?} (registered={})",
                    path, creds.registered
                );
                Ok(creds)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No credentials at {:?}, starting fresh", path);
                Ok(Credentials::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, dir: &Path, credentials: &Credentials) -> Result<(), CredentialError> {
        tokio::fs::create_dir_all(dir).await?;

        let json = serde_json::to_vec_pretty(credentials)?;
        let path = Self::creds_path(dir);
        let tmp = dir.join(format!("{}.tmp", CREDS_FILE));

        // Write-then-rename so a crash never leaves a truncated file behind
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Saved credentials to {:?}", path);
        Ok(())
    }
}
