//! The privileged principal: one configured identity that signs in locally,
//! without the remote service.

use std::fmt;

use chrono::Utc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::{Config, ENV_ADMIN_SECRET};
use crate::models::{Profile, Session, ADMIN_ROLE};

use super::CredentialStore;

/// Session id given to the synthetic privileged session.
pub const PRIVILEGED_SESSION_ID: &str = "admin-user-id";

/// Display name used when none is configured.
const DEFAULT_DISPLAY_NAME: &str = "Administrator";

#[derive(Clone)]
pub struct PrivilegedPrincipal {
    identifier: String,
    secret: String,
    display_name: String,
}

impl fmt::Debug for PrivilegedPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivilegedPrincipal")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl PrivilegedPrincipal {
    /// Returns `None` when either the identifier or the secret is empty.
    pub fn new(identifier: &str, secret: &str, display_name: Option<&str>) -> Option<Self> {
        if identifier.is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self {
            identifier: identifier.to_string(),
            secret: secret.to_string(),
            display_name: display_name
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_DISPLAY_NAME)
                .to_string(),
        })
    }

    /// Resolve from configuration. The identifier comes from config (or its
    /// env override); the secret from `COMMUNITYHUB_ADMIN_SECRET` via `env`,
    /// falling back to the OS keychain entry for that identifier.
    pub fn from_config<E>(config: &Config, env: E) -> Option<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let keychain = CredentialStore::new();
        Self::resolve(config, env, |identifier| match keychain.secret(identifier) {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %e, "Keychain unavailable");
                None
            }
        })
    }

    /// `from_config` with the keychain lookup injected. An empty env value
    /// counts as unset.
    pub fn resolve<E, K>(config: &Config, env: E, keychain: K) -> Option<Self>
    where
        E: Fn(&str) -> Option<String>,
        K: FnOnce(&str) -> Option<String>,
    {
        let Some(identifier) = config.admin_identifier.as_deref().filter(|id| !id.is_empty())
        else {
            debug!("No privileged identifier configured");
            return None;
        };

        let secret = env(ENV_ADMIN_SECRET)
            .filter(|secret| !secret.is_empty())
            .or_else(|| keychain(identifier));
        let Some(secret) = secret else {
            warn!("Privileged identifier configured but no secret available");
            return None;
        };

        Self::new(identifier, &secret, config.admin_display_name.as_deref())
    }

    /// Exact match on both fields, compared in constant time.
    pub fn matches(&self, identifier: &str, secret: &str) -> bool {
        let identifier_ok = self.identifier.as_bytes().ct_eq(identifier.as_bytes());
        let secret_ok = self.secret.as_bytes().ct_eq(secret.as_bytes());
        (identifier_ok & secret_ok).into()
    }

    /// Build the local session and profile for this principal.
    pub fn synthesize(&self) -> (Session, Profile) {
        let now = Utc::now();
        let session = Session {
            id: PRIVILEGED_SESSION_ID.to_string(),
            email: self.identifier.clone(),
            role: ADMIN_ROLE.to_string(),
            created_at: now,
            email_confirmed_at: Some(now),
        };
        let profile = Profile {
            id: PRIVILEGED_SESSION_ID.to_string(),
            email: Some(self.identifier.clone()),
            full_name: Some(self.display_name.clone()),
            role: Some(ADMIN_ROLE.to_string()),
            created_at: Some(now),
        };
        (session, profile)
    }
}
