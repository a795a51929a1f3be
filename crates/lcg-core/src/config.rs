//! Configuration system for the gateway.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LCG_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lcg/config.toml
//!   3. ~/.config/lcg/config.toml
//!
//! Size limits and presence timings live in [`crate::wire`]; they are part of
//! the protocol and are not configurable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LcgConfig {
    pub node: NodeConfig,
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Fully-qualified domain name clients use to reach this gateway.
    /// Also the key of this node's presence record.
    pub fqdn: String,
    /// ISO 3166-1 alpha-2 country code advertised for routing.
    pub country_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the gateway socket listener binds to.
    pub listen_addr: String,
    /// TCP port for control node connections.
    pub gateway_port: u16,
    /// Port of the local status endpoint (always bound on 127.0.0.1).
    pub status_port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            fqdn: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            country_code: "DE".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            gateway_port: 8580,
            status_port: 8581,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lcg")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LcgConfig {
    /// Load config: env vars → file → defaults, then validate.
    ///
    /// Defaults are used only when no config file exists. A file that cannot
    /// be read or parsed, a malformed override, or a failed validation is an
    /// error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path(), |key| std::env::var(key).ok())
    }

    /// Load from `path`, reading overrides through `env`.
    pub fn load_from<F>(path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            LcgConfig::default()
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LCG_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LcgConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject unusable node identity. Normalises the country code to upper case.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.node.fqdn = self.node.fqdn.trim().to_string();
        if self.node.fqdn.is_empty() {
            return Err(ConfigError::Invalid {
                field: "node.fqdn",
                reason: "must not be empty".to_string(),
            });
        }

        let code = self.node.country_code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Invalid {
                field: "node.country_code",
                reason: format!("expected two ASCII letters, got {:?}", self.node.country_code),
            });
        }
        self.node.country_code = code;
        Ok(())
    }

    /// Apply LCG_* env var overrides.
    fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("LCG_NODE__FQDN") {
            self.node.fqdn = v;
        }
        if let Some(v) = env("LCG_NODE__COUNTRY_CODE") {
            self.node.country_code = v;
        }
        if let Some(v) = env("LCG_NETWORK__LISTEN_ADDR") {
            self.network.listen_addr = v;
        }
        if let Some(v) = env("LCG_NETWORK__GATEWAY_PORT") {
            self.network.gateway_port = parse_port("network.gateway_port", &v)?;
        }
        if let Some(v) = env("LCG_NETWORK__STATUS_PORT") {
            self.network.status_port = parse_port("network.status_port", &v)?;
        }
        Ok(())
    }
}

fn parse_port(field: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("expected a port number, got {:?}", value),
    })
}
