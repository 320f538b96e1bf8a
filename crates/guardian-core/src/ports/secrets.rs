use async_trait::async_trait;
use std::path::PathBuf;

/// Fetch-by-id secret lookup. Any failure reads as an empty string.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, secret_id: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSecrets;

#[async_trait]
impl SecretStore for NoopSecrets {
    async fn fetch(&self, _secret_id: &str) -> String {
        String::new()
    }
}

/// Secrets read from environment variables named by the secret id
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch(&self, secret_id: &str) -> String {
        match std::env::var(secret_id) {
            Ok(value) => {
                tracing::info!("Fetched secret: {}", secret_id);
                value
            }
            Err(e) => {
                tracing::warn!("Failed to fetch secret {}: {}", secret_id, e);
                String::new()
            }
        }
    }
}

/// One file per secret id inside a directory; trailing whitespace is trimmed
#[derive(Debug, Clone)]
pub struct DirSecretStore {
    dir: PathBuf,
}

impl DirSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretStore for DirSecretStore {
    async fn fetch(&self, secret_id: &str) -> String {
        if secret_id.contains(['/', '\\']) || secret_id.contains("..") {
            tracing::warn!("Refusing secret id with path components: {}", secret_id);
            return String::new();
        }

        match tokio::fs::read_to_string(self.dir.join(secret_id)).await {
            Ok(value) => {
                tracing::info!("Fetched secret: {}", secret_id);
                value.trim_end().to_string()
            }
            Err(e) => {
                tracing::warn!("Failed to fetch secret {}: {}", secret_id, e);
                String::new()
            }
        }
    }
}
