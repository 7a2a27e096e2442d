//! Configuration loading.
//!
//! Settings come from `config.json` in the config directory, then
//! environment overrides. Login credentials are never part of the file;
//! see [`crate::app_server::Credentials`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

use crate::push_service::{RetryPolicy, ServiceEndpoint};

/// Public key blob of the application server, sent with `register`.
pub const DEFAULT_SERVER_KEY: &str =
    "BC08Fdr2JChSL0kr5imO99L6zZG6Rn0tBAWNTlrZfJtsDoeAvmJSa7CnUOHpNhd5zOk0YnRToEOT47YLet8Dpig=";

/// Configuration for the push agent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Push service host name.
    pub push_service_host: String,
    /// Sub-protocol sent as `Sec-WebSocket-Protocol`.
    pub subprotocol: String,
    /// Name of the version header sent with the upgrade request.
    pub version_header_name: String,
    /// Value of the version header.
    pub version_header_value: String,
    /// Retries after the first connect attempt.
    pub max_connect_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles per retry.
    pub retry_backoff_ms: u64,
    /// Application server key blob used when registering a channel.
    pub server_key: String,
    /// Application server the push endpoint is handed to.
    pub app_server: AppServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let endpoint = ServiceEndpoint::default();
        Self {
            push_service_host: endpoint.host,
            subprotocol: endpoint.subprotocol,
            version_header_name: endpoint.version_header_name,
            version_header_value: endpoint.version_header_value,
            max_connect_retries: 5,
            retry_backoff_ms: 1000,
            server_key: DEFAULT_SERVER_KEY.to_string(),
            app_server: AppServerConfig::default(),
        }
    }
}

/// Application server endpoints and fixed request headers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AppServerConfig {
    /// URL that receives the push endpoint registration.
    pub register_endpoint: String,
    /// Login form URL.
    pub login_url: String,
    /// `destApp` value of the registration body.
    pub dest_app: String,
    /// `Referer` header.
    pub referer: String,
    /// `x-request-with` header.
    pub request_with: String,
    /// `x-frontend-id` header.
    pub frontend_id: String,
}

impl Default for AppServerConfig {
    fn default() -> Self {
        Self {
            register_endpoint: "https://api.push.nicovideo.jp/v1/nicopush/webpush/endpoints.json"
                .to_string(),
            login_url: "https://account.nicovideo.jp/login/redirector?site=niconico".to_string(),
            dest_app: "nico_account_webpush".to_string(),
            referer: "https://account.nicovideo.jp/".to_string(),
            request_with: "https://account.nicovideo.jp/my/account".to_string(),
            frontend_id: "8".to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `PUSH_AGENT_CONFIG_DIR` wins; otherwise the platform config dir
    /// (Linux: `~/.config/push-agent`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("PUSH_AGENT_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("push-agent"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from_file(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Applies `PUSH_AGENT_*` overrides resolved through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("PUSH_AGENT_HOST") {
            self.push_service_host = host;
        }

        if let Some(server_key) = lookup("PUSH_AGENT_SERVER_KEY") {
            self.server_key = server_key;
        }

        if let Some(max_retries) = lookup("PUSH_AGENT_MAX_RETRIES") {
            match max_retries.parse::<u32>() {
                Ok(max) => self.max_connect_retries = max,
                Err(_) => log::warn!("Ignoring PUSH_AGENT_MAX_RETRIES={}", max_retries),
            }
        }

        if let Some(endpoint) = lookup("PUSH_AGENT_REGISTER_ENDPOINT") {
            self.app_server.register_endpoint = endpoint;
        }
    }

    /// Push service location and upgrade headers.
    pub fn service_endpoint(&self) -> ServiceEndpoint {
        ServiceEndpoint {
            host: self.push_service_host.clone(),
            subprotocol: self.subprotocol.clone(),
            version_header_name: self.version_header_name.clone(),
            version_header_value: self.version_header_value.clone(),
        }
    }

    /// Connect retry bound and backoff.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_connect_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.push_service_host, "push.services.mozilla.com");
        assert_eq!(config.version_header_name, "Ssc-WebSocket-Version");
        assert_eq!(config.max_connect_retries, 5);
        assert_eq!(config.app_server.dest_app, "nico_account_webpush");
        assert_eq!(config.app_server.frontend_id, "8");
        assert_eq!(config.retry_policy().max_attempts(), 6);
        assert_eq!(config.service_endpoint(), ServiceEndpoint::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"push_service_host": "push.example.test", "app_server": {"frontend_id": "9"}}"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.push_service_host, "push.example.test");
        assert_eq!(config.service_endpoint().url(), "wss://push.example.test/");
        assert_eq!(config.app_server.frontend_id, "9");
        assert_eq!(config.app_server.dest_app, "nico_account_webpush");
        assert_eq!(config.subprotocol, "push-notification");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup(&[
            ("PUSH_AGENT_HOST", "push.other.test"),
            ("PUSH_AGENT_SERVER_KEY", "BOTHER"),
            ("PUSH_AGENT_MAX_RETRIES", "2"),
            ("PUSH_AGENT_REGISTER_ENDPOINT", "http://127.0.0.1:1/endpoints"),
        ]));
        assert_eq!(config.push_service_host, "push.other.test");
        assert_eq!(config.server_key, "BOTHER");
        assert_eq!(config.retry_policy().max_attempts(), 3);
        assert_eq!(config.app_server.register_endpoint, "http://127.0.0.1:1/endpoints");
    }

    #[test]
    fn test_unparseable_retry_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup(&[("PUSH_AGENT_MAX_RETRIES", "many")]));
        assert_eq!(config.max_connect_retries, 5);
    }
}
