use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Session;

/// Token file name in cache directory
const TOKEN_FILE: &str = "session.json";

/// Buffer before expiry at which a refresh is attempted (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Remote session tokens as issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Session,
}

impl StoredToken {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Check if the token will expire soon and should be refreshed
    pub fn needs_refresh(&self) -> bool {
        let refresh_at = self.expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() >= refresh_at
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes().max(0)
    }
}

/// On-disk cache of the remote session, so an existing session survives restarts.
pub struct TokenCache {
    cache_dir: Option<PathBuf>,
    pub data: Option<StoredToken>,
}

impl TokenCache {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(cache_dir),
            data: None,
        }
    }

    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            cache_dir: None,
            data: None,
        }
    }

    /// Load the token from disk. Returns whether a token was found.
    /// Expired tokens are still loaded: their refresh token may be usable.
    pub fn load(&mut self) -> Result<bool> {
        let Some(path) = self.token_path() else {
            return Ok(false);
        };
        if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: StoredToken =
                serde_json::from_str(&contents).context("Failed to parse session file")?;
            self.data = Some(data);
            return Ok(true);
        }
        Ok(false)
    }

    /// Save token to disk
    pub fn save(&self) -> Result<()> {
        if let (Some(data), Some(path)) = (self.data.as_ref(), self.token_path()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear token data, in memory and on disk
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        if let Some(path) = self.token_path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Update cache with new data
    pub fn update(&mut self, data: StoredToken) {
        self.data = Some(data);
    }

    /// Get the bearer token if present
    pub fn access_token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.access_token.as_str())
    }

    fn token_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|d| d.join(TOKEN_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_in_minutes: i64) -> StoredToken {
        StoredToken {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + Duration::minutes(expires_in_minutes),
            user: Session {
                id: "u1".to_string(),
                email: "user@x.com".to_string(),
                role: "authenticated".to_string(),
                created_at: Utc::now(),
                email_confirmed_at: None,
            },
        }
    }

    #[test]
    fn test_expiry_and_refresh_window() {
        let fresh = token(60);
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh());
        assert!(fresh.minutes_until_expiry() >= 59);

        let due = token(3);
        assert!(!due.is_expired());
        assert!(due.needs_refresh());

        let expired = token(-1);
        assert!(expired.is_expired());
        assert_eq!(expired.minutes_until_expiry(), 0);
    }

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = TokenCache::new(dir.path().to_path_buf());
        assert!(!cache.load().expect("load empty"));

        cache.update(token(60));
        cache.save().expect("save");

        let mut reloaded = TokenCache::new(dir.path().to_path_buf());
        assert!(reloaded.load().expect("load"));
        assert_eq!(reloaded.access_token(), Some("access"));
        assert_eq!(reloaded.data.as_ref().map(|t| t.user.id.as_str()), Some("u1"));

        reloaded.clear().expect("clear");
        assert!(reloaded.data.is_none());
        assert!(!dir.path().join(TOKEN_FILE).exists());
    }

    #[test]
    fn test_in_memory_cache_never_writes() {
        let mut cache = TokenCache::in_memory();
        cache.update(token(60));
        cache.save().expect("save is a no-op");
        assert!(!cache.load().expect("load"));
        assert!(cache.data.is_some());
    }
}
