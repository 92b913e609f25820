//! Aggregation provider configuration
//!
//! Config is resolved in three layers:
//! 1. Embedded defaults (`config/provider.toml`, compiled into the binary)
//! 2. Override file in the data dir (~/.local/share/bankline/config/provider.toml)
//! 3. Environment variables (`BRIDGE_*`)
//!
//! Client credentials only ever come from the override file or the environment.
//! A config without them fails `validate()` with `Error::Configuration`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/provider.toml");

pub const ENV_API_URL: &str = "BRIDGE_API_URL";
pub const ENV_CLIENT_ID: &str = "BRIDGE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "BRIDGE_CLIENT_SECRET";
pub const ENV_VERSION: &str = "BRIDGE_VERSION";
pub const ENV_CALLBACK_URL: &str = "BRIDGE_CALLBACK_URL";
pub const ENV_USER_EMAIL_DOMAIN: &str = "BRIDGE_USER_EMAIL_DOMAIN";

/// Settings needed to talk to the aggregation provider
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Value of the `Bridge-Version` header
    pub version: String,
    /// Where the hosted session sends the user back to
    pub callback_url: Option<String>,
    /// Domain for the synthetic contact e-mail sent with link sessions
    pub user_email_domain: String,
    pub page_size: u32,
    pub max_transactions_per_account: usize,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("version", &self.version)
            .field("callback_url", &self.callback_url)
            .field("user_email_domain", &self.user_email_domain)
            .field("page_size", &self.page_size)
            .field(
                "max_transactions_per_account",
                &self.max_transactions_per_account,
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bridgeapi.io".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            version: "2025-01-15".to_string(),
            callback_url: None,
            user_email_domain: "bankline.app".to_string(),
            page_size: 100,
            max_transactions_per_account: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Config pointing at `base_url` with the given credentials and default limits
    pub fn new(base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            ..Self::default()
        }
    }

    /// Load defaults, the data-dir override and the process environment, then validate
    pub fn from_env() -> Result<Self> {
        Self::load(default_config_path().as_deref(), |key| std::env::var(key).ok())
    }

    /// Load from an explicit override file (if it exists) plus an env lookup, then validate
    pub fn load<F>(override_path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = parse_config(DEFAULT_CONFIG)?;

        if let Some(path) = override_path.filter(|p| p.exists()) {
            debug!(path = %path.display(), "Loading provider config override");
            let content = fs::read_to_string(path)?;
            config.merge(toml::from_str(&content)?);
        }

        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Fail with `Error::Configuration` if required settings are missing
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "missing provider client id (set {})",
                ENV_CLIENT_ID
            )));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "missing provider client secret (set {})",
                ENV_CLIENT_SECRET
            )));
        }
        if self.page_size == 0 {
            return Err(Error::Configuration("page_size must be positive".into()));
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(id) = get(ENV_CLIENT_ID) {
            self.client_id = id;
        }
        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            self.client_secret = secret;
        }
        if let Some(version) = get(ENV_VERSION) {
            self.version = version;
        }
        if let Some(callback) = get(ENV_CALLBACK_URL) {
            self.callback_url = Some(callback);
        }
        if let Some(domain) = get(ENV_USER_EMAIL_DOMAIN) {
            self.user_email_domain = domain;
        }
    }

    fn merge(&mut self, raw: RawConfig) {
        if let Some(p) = raw.provider {
            if let Some(v) = p.base_url {
                self.base_url = v.trim_end_matches('/').to_string();
            }
            if let Some(v) = p.client_id {
                self.client_id = v;
            }
            if let Some(v) = p.client_secret {
                self.client_secret = v;
            }
            if let Some(v) = p.version {
                self.version = v;
            }
            if p.callback_url.is_some() {
                self.callback_url = p.callback_url;
            }
            if let Some(v) = p.user_email_domain {
                self.user_email_domain = v;
            }
            if let Some(v) = p.timeout_secs {
                self.timeout = Duration::from_secs(v);
            }
        }
        if let Some(s) = raw.sync {
            if let Some(v) = s.page_size {
                self.page_size = v;
            }
            if let Some(v) = s.max_transactions_per_account {
                self.max_transactions_per_account = v;
            }
        }
    }
}

/// Default location of the override file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("bankline").join("config").join("provider.toml"))
}

/// Parse a TOML document on top of the built-in defaults (no validation)
fn parse_config(content: &str) -> Result<ProviderConfig> {
    let raw: RawConfig = toml::from_str(content)?;
    let mut config = ProviderConfig::default();
    config.merge(raw);
    Ok(config)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    provider: Option<RawProvider>,
    sync: Option<RawSync>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProvider {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    version: Option<String>,
    callback_url: Option<String>,
    user_email_domain: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSync {
    page_size: Option<u32>,
    max_transactions_per_account: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.base_url, "https://api.bridgeapi.io");
        assert_eq!(config.version, "2025-01-15");
        assert_eq!(config.max_transactions_per_account, 500);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let result = ProviderConfig::load(None, env_from(&[]));
        assert!(matches!(result, Err(Error::Configuration(_))));

        let result = ProviderConfig::load(None, env_from(&[(ENV_CLIENT_ID, "id")]));
        match result {
            Err(Error::Configuration(msg)) => assert!(msg.contains(ENV_CLIENT_SECRET)),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides() {
        let config = ProviderConfig::load(
            None,
            env_from(&[
                (ENV_CLIENT_ID, "client"),
                (ENV_CLIENT_SECRET, "secret"),
                (ENV_API_URL, "http://localhost:9999/"),
                (ENV_CALLBACK_URL, "http://localhost:3000/api/bank/callback"),
            ]),
        )
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.client_id, "client");
        assert_eq!(
            config.callback_url.as_deref(),
            Some("http://localhost:3000/api/bank/callback")
        );
    }

    #[test]
    fn test_override_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provider.toml");
        std::fs::write(
            &path,
            r#"
[provider]
client_id = "from-file"
client_secret = "file-secret"
timeout_secs = 5

[sync]
max_transactions_per_account = 50
"#,
        )
        .unwrap();

        let config =
            ProviderConfig::load(Some(&path), env_from(&[(ENV_CLIENT_ID, "from-env")])).unwrap();
        assert_eq!(config.client_id, "from-env");
        assert_eq!(config.client_secret, "file-secret");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_transactions_per_account, 50);
        assert_eq!(config.page_size, 100);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::new("http://x", "id", "super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
    }
}
