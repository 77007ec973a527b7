//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the data service endpoint, the anon API key, the last used
//! sign-in identifier, and the privileged principal's identifier.
//!
//! Configuration is stored at `~/.config/communityhub/config.json`.
//! Environment variables override the file (see `ENV_*` constants).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "communityhub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default bound on a single remote call made by the auth layer.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const ENV_SERVICE_URL: &str = "COMMUNITYHUB_URL";
pub const ENV_ANON_KEY: &str = "COMMUNITYHUB_ANON_KEY";
pub const ENV_ADMIN_EMAIL: &str = "COMMUNITYHUB_ADMIN_EMAIL";
pub const ENV_ADMIN_SECRET: &str = "COMMUNITYHUB_ADMIN_SECRET";
pub const ENV_ADMIN_NAME: &str = "COMMUNITYHUB_ADMIN_NAME";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub service_url: Option<String>,
    pub anon_key: Option<String>,
    pub last_identifier: Option<String>,
    pub admin_identifier: Option<String>,
    pub admin_display_name: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment-style overrides. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_SERVICE_URL) {
            self.service_url = Some(url);
        }
        if let Some(key) = get(ENV_ANON_KEY) {
            self.anon_key = Some(key);
        }
        if let Some(email) = get(ENV_ADMIN_EMAIL) {
            self.admin_identifier = Some(email);
        }
        if let Some(name) = get(ENV_ADMIN_NAME) {
            self.admin_display_name = Some(name);
        }
    }

    pub fn service_url(&self) -> Result<&str> {
        self.service_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .ok_or_else(|| anyhow::anyhow!("Service URL not configured (set {})", ENV_SERVICE_URL))
    }

    pub fn anon_key(&self) -> Result<&str> {
        self.anon_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Anon key not configured (set {})", ENV_ANON_KEY))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("absent.json")).expect("load");
        assert!(config.service_url.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = Config {
            service_url: Some("https://db.example.co/".to_string()),
            last_identifier: Some("user@x.com".to_string()),
            request_timeout_secs: Some(3),
            ..Default::default()
        };
        config.save_to(&path).expect("save");

        let loaded = Config::load_from(&path).expect("load");
        assert_eq!(loaded.service_url().expect("url"), "https://db.example.co");
        assert_eq!(loaded.last_identifier.as_deref(), Some("user@x.com"));
        assert_eq!(loaded.request_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_SERVICE_URL, "https://override.example.co"),
            (ENV_ANON_KEY, "anon"),
            (ENV_ADMIN_EMAIL, ""),
        ]);
        let mut config = Config {
            service_url: Some("https://file.example.co".to_string()),
            admin_identifier: Some("admin@example.com".to_string()),
            ..Default::default()
        };
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.service_url.as_deref(), Some("https://override.example.co"));
        assert_eq!(config.anon_key().expect("key"), "anon");
        // Empty override leaves the file value alone
        assert_eq!(config.admin_identifier.as_deref(), Some("admin@example.com"));
    }

    #[test]
    fn test_missing_service_url_is_an_error() {
        assert!(Config::default().service_url().is_err());
        assert!(Config::default().anon_key().is_err());
    }
}
