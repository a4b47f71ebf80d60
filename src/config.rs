//! Configuration types for the gateway orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway process and provisioning settings.
    pub gateway: GatewayConfig,
    /// Chat client settings.
    pub chat: ChatConfig,
    /// Upstream provider credentials, keyed by provider name (e.g. "openai").
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Gateway process and provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Explicit gateway base URL. Empty = derived from `port`.
    pub base_url: String,
    /// Port the gateway listens on.
    pub port: u16,
    /// Optional admin/management port.
    pub admin_port: Option<u16>,
    /// Release tag to install: "latest" or a concrete tag like "v0.4.2".
    pub version: String,
    /// Release feed base URL (GitHub releases API shape).
    pub release_feed: String,
    /// Install the gateway automatically when `start` finds no binary.
    pub auto_install: bool,
    /// Explicit binary path override. None = managed dir, then PATH.
    pub binary_path: Option<PathBuf>,
    /// Managed install directory override. None = the default data dir.
    pub install_dir: Option<PathBuf>,
    /// Work mode forwarded to the gateway (the gateway owns the vocabulary).
    pub work_mode: String,
    /// Log level forwarded to the gateway.
    pub log_level: String,
    /// Model routing rules forwarded to the gateway. Empty = gateway default.
    pub model_routes: String,
    /// Grace interval after spawn before liveness is sampled, in milliseconds.
    pub start_grace_ms: u64,
    /// Health probe timeout in seconds.
    pub health_timeout_secs: u64,
    /// Asset download deadline in seconds.
    pub download_timeout_secs: u64,
    /// PII firewall settings forwarded to the gateway.
    pub pii_firewall: PiiFirewallConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            port: 8080,
            admin_port: None,
            version: "latest".to_owned(),
            release_feed: "https://api.github.com/repos/tokligence/tokligence-gateway/releases"
                .to_owned(),
            auto_install: true,
            binary_path: None,
            install_dir: None,
            work_mode: "proxy".to_owned(),
            log_level: "info".to_owned(),
            model_routes: String::new(),
            start_grace_ms: 1_500,
            health_timeout_secs: 3,
            download_timeout_secs: 300,
            pii_firewall: PiiFirewallConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Effective base URL for the gateway HTTP surface: the explicit
    /// `base_url` when set, otherwise derived from `port`.
    #[must_use]
    pub fn effective_base_url(&self) -> String {
        if self.base_url.is_empty() {
            format!("http://127.0.0.1:{}", self.port)
        } else {
            self.base_url.trim_end_matches('/').to_owned()
        }
    }

    /// Health probe timeout as a [`Duration`].
    #[must_use]
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Download deadline as a [`Duration`].
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Grace interval after spawn as a [`Duration`].
    #[must_use]
    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }
}

/// PII firewall toggles forwarded to the gateway environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiFirewallConfig {
    /// Enable the firewall.
    pub enabled: bool,
    /// Firewall mode (e.g. "mask", "block").
    pub mode: String,
}

impl Default for PiiFirewallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "mask".to_owned(),
        }
    }
}

/// Credentials for one upstream provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key injected into the gateway environment as `<NAME>_API_KEY`.
    pub api_key: String,
}

/// Chat client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Request streamed responses.
    pub stream: bool,
    /// System prompt seeded at index 0 of every conversation.
    pub system_prompt: String,
    /// Bearer token for the gateway. Empty = no Authorization header.
    pub api_key: String,
    /// Per-request wall-clock deadline in seconds.
    pub request_timeout_secs: u64,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            stream: true,
            system_prompt: "You are a helpful assistant.".to_owned(),
            api_key: String::new(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

impl ChatConfig {
    /// Per-request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::GatewayError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::GatewayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (`<config_dir>/config.toml`).
    #[must_use]
    pub fn default_path() -> PathBuf {
        crate::paths::config_file()
    }

    /// Names of providers with a non-empty API key, in stable order.
    #[must_use]
    pub fn configured_providers(&self) -> Vec<String> {
        self.providers
            .iter()
            .filter(|(_, p)| !p.api_key.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}
