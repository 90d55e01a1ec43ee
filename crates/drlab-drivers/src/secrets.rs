use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use drlab_core::{CredentialStore, DrResult, FailoverError, WriteResult};

/// Stored connection descriptor for the application database.
///
/// Matches the shape of the managed database-config secret: engine and
/// location fields plus credential passthrough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSecret {
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub username: String,
    pub password: String,
}

impl ConnectionSecret {
    /// Rewrites host/port from an endpoint of the form `host[:port]`.
    ///
    /// Credentials and engine fields are preserved; recovery does not
    /// change who the application connects as.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        match endpoint.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
                self.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.port = port;
                }
            }
            _ => {
                self.host = endpoint.to_string();
            }
        }
        self
    }
}

/// Rewrites the stored connection secret after database recovery.
///
/// Read-modify-write with an optimistic version check: the write carries
/// the version observed at read time and is rejected if the stored value
/// changed in between, so a concurrent rotation is never clobbered.
pub struct SecretRotator {
    store: Arc<dyn CredentialStore>,
}

impl SecretRotator {
    /// Builds a rotator over a credential store.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Points the stored connection descriptor at the new endpoint.
    ///
    /// Single attempt; `SecretWriteConflict` and `SecretStoreUnavailable`
    /// are retryable and handled by the orchestrator's retry policy.
    pub async fn rotate(&self, new_endpoint: &str, credential_ref: &str) -> DrResult<()> {
        let current = self.store.read_secret(credential_ref).await?;
        let descriptor: ConnectionSecret = serde_json::from_str(&current.value)?;
        let updated = descriptor.with_endpoint(new_endpoint);
        let value = serde_json::to_string(&updated)?;

        match self
            .store
            .write_secret(credential_ref, &value, current.version)
            .await?
        {
            WriteResult::Ok => {
                info!(
                    credential_ref,
                    host = updated.host.as_str(),
                    port = updated.port,
                    "connection secret rotated"
                );
                Ok(())
            }
            WriteResult::Conflict => Err(FailoverError::SecretWriteConflict {
                credential_ref: credential_ref.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCredentialStore;

    fn sample_secret() -> ConnectionSecret {
        ConnectionSecret {
            engine: "postgres".into(),
            host: "primary-db.example.com".into(),
            port: 5433,
            dbname: "drlab".into(),
            username: "app".into(),
            password: "s3cret".into(),
        }
    }

    #[tokio::test]
    async fn rotation_rewrites_host_and_keeps_credentials() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.seed(
            "dr-lab/database-config",
            &serde_json::to_string(&sample_secret()).unwrap(),
        );

        let rotator = SecretRotator::new(store.clone());
        rotator
            .rotate("secondary-db.example.com:5433", "dr-lab/database-config")
            .await
            .unwrap();

        let stored = store.current("dr-lab/database-config").unwrap();
        let secret: ConnectionSecret = serde_json::from_str(&stored).unwrap();
        assert_eq!(secret.host, "secondary-db.example.com");
        assert_eq!(secret.port, 5433);
        assert_eq!(secret.username, "app");
        assert_eq!(secret.password, "s3cret");
    }

    #[tokio::test]
    async fn concurrent_rotation_is_detected() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.seed(
            "dr-lab/database-config",
            &serde_json::to_string(&sample_secret()).unwrap(),
        );
        store.inject_conflict_once();

        let rotator = SecretRotator::new(store);
        let result = rotator
            .rotate("secondary-db.example.com", "dr-lab/database-config")
            .await;

        assert!(matches!(
            result,
            Err(FailoverError::SecretWriteConflict { .. })
        ));
    }

    #[test]
    fn endpoint_without_port_keeps_existing_port() {
        let secret = sample_secret().with_endpoint("secondary-db.example.com");
        assert_eq!(secret.host, "secondary-db.example.com");
        assert_eq!(secret.port, 5433);
    }

    #[test]
    fn non_numeric_port_is_treated_as_part_of_host() {
        let secret = sample_secret().with_endpoint("secondary-db.example.com:bad");
        assert_eq!(secret.host, "secondary-db.example.com:bad");
        assert_eq!(secret.port, 5433);
    }
}
