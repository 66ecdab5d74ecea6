use crate::error::{AppError, AppResult};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::{Arc, RwLock};

/// Default secret lifetime in minutes (one day).
pub const DEFAULT_SECRET_EXPIRY_MINUTES: i64 = 24 * 60;

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8065
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

/// Plugin settings recognised by the secret lifecycle engine.
///
/// `secret_expiry_time` is in minutes and must be positive; it is the only
/// option that affects core behaviour. `allow_copy_to_clipboard` is forwarded
/// verbatim to reveal responses as a client hint.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    #[serde(default = "default_secret_expiry_time")]
    pub secret_expiry_time: i64,
    #[serde(default = "default_allow_copy")]
    pub allow_copy_to_clipboard: bool,
}

fn default_secret_expiry_time() -> i64 {
    DEFAULT_SECRET_EXPIRY_MINUTES
}

fn default_allow_copy() -> bool {
    true
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            secret_expiry_time: default_secret_expiry_time(),
            allow_copy_to_clipboard: default_allow_copy(),
        }
    }
}

impl PluginConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.secret_expiry_time <= 0 {
            return Err(AppError::invalid_input(format!(
                "secret_expiry_time must be a positive number of minutes, got {}",
                self.secret_expiry_time
            )));
        }
        Ok(())
    }

    /// Secret lifetime in milliseconds.
    pub fn expiry_millis(&self) -> i64 {
        self.secret_expiry_time * 60_000
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub plugin: PluginConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: SECRETDROP_)
            // e.g., SECRETDROP_PLUGIN__SECRET_EXPIRY_TIME, SECRETDROP_WEB__PORT
            .add_source(
                Environment::with_prefix("SECRETDROP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

/// Snapshot-swappable holder for the active [`PluginConfig`].
///
/// The host can push a new configuration at any time; readers take a cheap
/// `Arc` clone of the current snapshot and never observe a half-written
/// update. Readers never block readers.
#[derive(Debug)]
pub struct ConfigHolder {
    inner: RwLock<Arc<PluginConfig>>,
}

impl ConfigHolder {
    pub fn new(config: PluginConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(config)),
        }
    }

    /// Current configuration snapshot.
    pub fn current(&self) -> Arc<PluginConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically replace the active configuration.
    pub fn replace(&self, config: PluginConfig) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(config);
    }
}

impl Default for ConfigHolder {
    fn default() -> Self {
        Self::new(PluginConfig::default())
    }
}
