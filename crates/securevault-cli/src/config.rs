//! Application configuration.
//!
//! Values come from `config/securevault.toml` when present, then environment
//! variables (a `.env` file is loaded first through `dotenvy`). Anything left
//! unset falls back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use securevault_auth::SessionConfig;
use securevault_store::{BackendConfig, DEFAULT_API_URL, HealthConfig};

/// Default config file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/securevault.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Base URL of the vault REST API.
    pub url: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Hosted backend holding the PIN reference and attachment buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub inactivity_timeout_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_attempts: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the local credential database.
    pub data_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSection,
    pub backend: BackendSection,
    pub session: SessionSection,
    pub health: HealthSection,
    pub storage: StorageSection,
}

impl AppConfig {
    /// Load from `path` (or [`DEFAULT_CONFIG_PATH`]) and the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Self::default()
        };

        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!(path = %env_file.display(), "loaded .env");
        }
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("SECUREVAULT_API_URL") {
            self.api.url = url;
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = get("SUPABASE_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(dir) = get("SECUREVAULT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = get("SECUREVAULT_INACTIVITY_SECS") {
            self.session.inactivity_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("SECUREVAULT_INACTIVITY_SECS is not a number: {secs}"))?;
        }
        Ok(())
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            url: self.backend.url.clone(),
            anon_key: self.backend.anon_key.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            inactivity_timeout: Duration::from_secs(self.session.inactivity_timeout_secs.max(1)),
            ..SessionConfig::default()
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            poll_interval: Duration::from_secs(self.health.poll_interval_secs),
            max_attempts: self.health.max_attempts.max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.url, "http://localhost:3000");
        assert_eq!(config.session.inactivity_timeout_secs, 300);
        assert_eq!(config.health.max_attempts, 12);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert!(!config.backend_config().is_complete());
        assert_eq!(
            config.session_config().inactivity_timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            url = "http://vault.local:8080"

            [health]
            poll_interval_secs = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.api.url, "http://vault.local:8080");
        assert_eq!(config.health.poll_interval_secs, 2);
        assert_eq!(config.health.max_attempts, 12);
        assert_eq!(config.session.inactivity_timeout_secs, 300);
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::from_toml(
            r#"
            [backend]
            url = "https://file.example"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("SUPABASE_URL", "https://env.example"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SECUREVAULT_INACTIVITY_SECS", "60"),
            ("SECUREVAULT_DATA_DIR", "  "),
        ]);
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.backend.url.as_deref(), Some("https://env.example"));
        assert!(config.backend_config().is_complete());
        assert_eq!(config.session.inactivity_timeout_secs, 60);
        // Blank values are ignored.
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn bad_numeric_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|name| (name == "SECUREVAULT_INACTIVITY_SECS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SECUREVAULT_INACTIVITY_SECS"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(AppConfig::from_toml("[session]\ninactivity_timeout_secs = \"five\"").is_err());
    }
}
