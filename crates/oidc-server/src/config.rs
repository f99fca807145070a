//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for the token service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Token issuer (`iss`). Falls back to the public URL when unset.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Token audience (`aud`)
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Token configuration
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Signing key configuration
    #[serde(default)]
    pub signing: SigningConfig,

    /// Where the token endpoint is mounted
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Log filter configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Resource owners seeded at startup for the password grant
    #[serde(default = "default_users")]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// PEM file holding the RSA signing key (PKCS#8 or PKCS#1).
    /// If not set, a development key is generated at startup (tokens won't survive restarts)
    pub private_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Prefix for the OpenID Connect endpoints; the token endpoint is `{base_path}/token`
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl EndpointConfig {
    /// Full path of the token endpoint, tolerating a trailing `/` on the base
    pub fn token_path(&self) -> String {
        let base = self.base_path.trim_end_matches('/');
        if base.is_empty() || base.starts_with('/') {
            format!("{}/token", base)
        } else {
            format!("/{}/token", base)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives; `RUST_LOG` takes precedence
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    /// Subject identifier; defaults to the username
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Upper bound on `access_token_lifetime_secs` (one year)
pub const MAX_ACCESS_TOKEN_LIFETIME_SECS: u64 = 365 * 24 * 60 * 60;

fn default_audience() -> String {
    "resource_server".to_string()
}

fn default_access_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_base_path() -> String {
    "/connect".to_string()
}

fn default_log_filter() -> String {
    "oidc_server=info,tower_http=debug".to_string()
}

fn default_users() -> Vec<UserConfig> {
    vec![UserConfig {
        username: "alice".to_string(),
        password: "alice-password".to_string(),
        subject: None,
        display_name: Some("Alice".to_string()),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: default_audience(),
            tokens: TokenConfig::default(),
            signing: SigningConfig::default(),
            endpoint: EndpointConfig::default(),
            logging: LoggingConfig::default(),
            users: default_users(),
        }
    }
}

/// Where the loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file existed; defaults were written to this path
    DefaultsWritten(PathBuf),
}

impl Config {
    /// Load configuration from the config directory.
    ///
    /// Runs before logging is initialised, so the caller reports the source.
    pub fn load(config_path: &str) -> Result<(Self, ConfigSource)> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            config
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", config_file))?;
            Ok((config, ConfigSource::File(config_file)))
        } else {
            let config = Config::default();

            // Create config directory if it doesn't exist
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;

            Ok((config, ConfigSource::DefaultsWritten(config_file)))
        }
    }

    /// Reject values that cannot produce a usable token
    pub fn validate(&self) -> Result<()> {
        let lifetime = self.tokens.access_token_lifetime_secs;
        if lifetime == 0 || lifetime > MAX_ACCESS_TOKEN_LIFETIME_SECS {
            bail!(
                "tokens.access_token_lifetime_secs must be between 1 and {}, got {}",
                MAX_ACCESS_TOKEN_LIFETIME_SECS,
                lifetime
            );
        }
        Ok(())
    }

    /// Issuer claim, using the public URL if none is configured
    pub fn issuer_or(&self, public_url: &str) -> String {
        self.issuer
            .clone()
            .unwrap_or_else(|| public_url.to_string())
    }
}
