//! OS keychain storage for the privileged principal's secret.
//!
//! Entries are filed under one service name and keyed by the principal's
//! identifier. A missing entry is an ordinary answer, not an error.

use anyhow::{bail, Context, Result};
use keyring::{Entry, Error as KeyringError};
use tracing::debug;

const SERVICE_NAME: &str = "communityhub-admin";

#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Store under a different keychain service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, identifier: &str) -> Result<Entry> {
        if identifier.is_empty() {
            bail!("Identifier must not be empty");
        }
        Entry::new(&self.service, identifier).context("Failed to create keyring entry")
    }

    /// Save the secret for `identifier`, replacing any previous one.
    pub fn store(&self, identifier: &str, secret: &str) -> Result<()> {
        if secret.is_empty() {
            bail!("Secret must not be empty");
        }
        self.entry(identifier)?
            .set_password(secret)
            .context("Failed to store secret in keychain")
    }

    /// The stored secret, or `None` when nothing is stored for `identifier`.
    pub fn secret(&self, identifier: &str) -> Result<Option<String>> {
        match self.entry(identifier)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(KeyringError::NoEntry) => {
                debug!(identifier, "No keychain entry");
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to retrieve secret from keychain"),
        }
    }

    /// Remove the entry. Returns whether there was one.
    pub fn delete(&self, identifier: &str) -> Result<bool> {
        match self.entry(identifier)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(KeyringError::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete secret from keychain"),
        }
    }
}
