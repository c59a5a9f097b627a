use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::AuthError;
use crate::messenger::{Identity, Messenger};

/// Secret used to log in. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_empty(&self) -> bool {
        self.token.trim().is_empty()
    }

    /// Hex SHA-256 of the secret, safe to persist.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.token.as_bytes()))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Turns credentials into a verified identity and a client handle.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Asks the platform who these credentials belong to.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Builds a client handle for the credentials (no network round trip).
    fn connect(&self, credentials: &Credentials) -> Arc<dyn Messenger>;
}
