//! Configuration management for prdgen
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//!
//! The relay endpoint and the chat client are both configured here, which
//! replaces two habits of the original system: endpoints are injected at
//! startup instead of being re-derived from runtime environment sniffing,
//! and the upstream credential lives only in the server-side configuration
//! instead of being compiled into client-reachable code.

use crate::error::{PrdgenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure for prdgen
///
/// This structure holds all configuration needed by the relay endpoint
/// (`serve`) and the chat client (`chat`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relay endpoint server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream workflow API settings (server side only)
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Relay settings used by the chat client
    #[serde(default)]
    pub relay: RelayClientConfig,

    /// Chat session settings
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Relay endpoint server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the relay endpoint binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Upstream workflow API configuration
///
/// The credential configured here is attached to every upstream call and is
/// never exposed to relay callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream chat workflow API (no trailing slash)
    #[serde(default = "default_upstream_base")]
    pub base_url: String,

    /// Bearer credential for the upstream API
    #[serde(default)]
    pub api_key: String,

    /// Workflow identifier used by the highest-priority candidate endpoint
    #[serde(default)]
    pub workflow_id: String,

    /// Prefix for the per-request upstream `user` field
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
}

fn default_upstream_base() -> String {
    "http://teach.excelmaster.ai/v1".to_string()
}

fn default_user_prefix() -> String {
    "user".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base(),
            api_key: String::new(),
            workflow_id: String::new(),
            user_prefix: default_user_prefix(),
        }
    }
}

/// Relay settings for the chat client
///
/// The endpoint and header set fully describe which relay to talk to; a
/// hosted relay that fronts its functions with a gateway can be reached by
/// adding its `authorization`/`apikey` headers here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayClientConfig {
    /// Full URL of the relay generate route
    #[serde(default = "default_relay_endpoint")]
    pub endpoint: String,

    /// Extra headers sent with every relay request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_relay_endpoint() -> String {
    "http://127.0.0.1:8787/api/generate".to_string()
}

impl Default for RelayClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_relay_endpoint(),
            headers: HashMap::new(),
        }
    }
}

/// Chat session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Directory where exported documents are written
    #[serde(default = "default_export_dir")]
    pub export_dir: String,

    /// Maximum length of a derived session title, in characters
    #[serde(default = "default_title_len")]
    pub title_max_chars: usize,
}

fn default_export_dir() -> String {
    "exports".to_string()
}

fn default_title_len() -> usize {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            title_max_chars: default_title_len(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PrdgenError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| PrdgenError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind) = std::env::var("PRDGEN_BIND") {
            self.server.bind = bind;
        }

        if let Ok(base_url) = std::env::var("PRDGEN_UPSTREAM_BASE_URL") {
            self.upstream.base_url = base_url;
        }

        if let Ok(api_key) = std::env::var("PRDGEN_UPSTREAM_API_KEY") {
            self.upstream.api_key = api_key;
        }

        if let Ok(workflow_id) = std::env::var("PRDGEN_WORKFLOW_ID") {
            self.upstream.workflow_id = workflow_id;
        }

        if let Ok(endpoint) = std::env::var("PRDGEN_RELAY_ENDPOINT") {
            self.relay.endpoint = endpoint;
        }

        if let Ok(export_dir) = std::env::var("PRDGEN_EXPORT_DIR") {
            self.chat.export_dir = export_dir;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        use crate::cli::Commands;

        match &cli.command {
            Commands::Serve { bind } => {
                if let Some(bind) = bind {
                    self.server.bind = bind.clone();
                }
            }
            Commands::Chat { endpoint } => {
                if let Some(endpoint) = endpoint {
                    self.relay.endpoint = endpoint.clone();
                }
            }
            Commands::Export { .. } => {}
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the bind address, relay endpoint, or upstream base
    /// URL are malformed
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                PrdgenError::Config(format!("Invalid bind address {}: {}", self.server.bind, e))
            })?;

        url::Url::parse(&self.relay.endpoint).map_err(|e| {
            PrdgenError::Config(format!(
                "Invalid relay endpoint {}: {}",
                self.relay.endpoint, e
            ))
        })?;

        url::Url::parse(&self.upstream.base_url).map_err(|e| {
            PrdgenError::Config(format!(
                "Invalid upstream base URL {}: {}",
                self.upstream.base_url, e
            ))
        })?;

        if self.upstream.base_url.ends_with('/') {
            return Err(PrdgenError::Config(
                "Upstream base URL must not end with a slash".to_string(),
            )
            .into());
        }

        if self.chat.title_max_chars == 0 {
            return Err(
                PrdgenError::Config("title_max_chars must be at least 1".to_string()).into(),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};

    fn cli_with(command: Commands) -> Cli {
        Cli {
            config: None,
            verbose: false,
            command,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.relay.endpoint, "http://127.0.0.1:8787/api/generate");
        assert_eq!(config.upstream.base_url, "http://teach.excelmaster.ai/v1");
        assert_eq!(config.upstream.user_prefix, "user");
        assert_eq!(config.chat.title_max_chars, 30);
        assert!(config.relay.headers.is_empty());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
server:
  bind: "0.0.0.0:9000"
upstream:
  base_url: "https://dify.example.com/v1"
  api_key: "app-secret"
  workflow_id: "wf-123"
relay:
  endpoint: "https://relay.example.com/api/generate"
  headers:
    authorization: "Bearer anon-key"
    apikey: "anon-key"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.upstream.api_key, "app-secret");
        assert_eq!(config.upstream.workflow_id, "wf-123");
        assert_eq!(
            config.relay.headers.get("apikey"),
            Some(&"anon-key".to_string())
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "upstream:\n  api_key: \"k\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.upstream.api_key, "k");
    }

    #[test]
    fn test_validate_rejects_bad_bind() {
        let config = Config {
            server: ServerConfig {
                bind: "not-an-addr".to_string(),
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = Config::default();
        config.relay.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_trailing_slash_base() {
        let mut config = Config::default();
        config.upstream.base_url = "http://dify.example.com/v1/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_title_len() {
        let mut config = Config::default();
        config.chat.title_max_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_override_serve_bind() {
        let mut config = Config::default();
        let cli = cli_with(Commands::Serve {
            bind: Some("127.0.0.1:9999".to_string()),
        });
        config.apply_cli_overrides(&cli);
        assert_eq!(config.server.bind, "127.0.0.1:9999");
    }

    #[test]
    fn test_cli_override_chat_endpoint() {
        let mut config = Config::default();
        let cli = cli_with(Commands::Chat {
            endpoint: Some("http://10.0.0.1:8787/api/generate".to_string()),
        });
        config.apply_cli_overrides(&cli);
        assert_eq!(config.relay.endpoint, "http://10.0.0.1:8787/api/generate");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cli = cli_with(Commands::Serve { bind: None });
        let config = Config::load("definitely-missing.yaml", &cli).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }
}
