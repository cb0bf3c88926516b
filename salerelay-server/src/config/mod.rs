//! Configuration module for salerelay-server.
//!
//! Handles loading configuration from an optional TOML file and applying
//! CLI/environment overrides on top of it.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{AuthConfig, RelayConfig, ServerConfig};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Values given on the command line or through the environment. They take
/// precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub listen: Option<SocketAddr>,
    pub live_listen: Option<SocketAddr>,
    pub shared_live: bool,
    pub ingress_secret: Option<String>,
    pub subscriber_token: Option<String>,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub auth: AuthConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    overrides: CliOverrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, overrides: CliOverrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file (a missing file means all defaults)
    /// 2. Apply CLI/environment overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let mut file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No config file at {:?}, using defaults",
                    self.config_path
                );
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        self.apply_overrides(&mut file_config);
        self.validate(&file_config)?;

        Ok(self.build_loaded_config(file_config))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn apply_overrides(&self, config: &mut FileConfig) {
        let overrides = &self.overrides;
        if let Some(listen) = overrides.listen {
            config.server.listen = listen;
        }
        if let Some(live_listen) = overrides.live_listen {
            config.server.live_listen = live_listen;
        }
        if overrides.shared_live {
            config.server.shared_live = true;
        }
        if let Some(secret) = &overrides.ingress_secret {
            config.auth.ingress_secret = Some(secret.clone());
        }
        if let Some(token) = &overrides.subscriber_token {
            config.auth.subscriber_token = Some(token.clone());
        }
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.relay.subscriber_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "relay.subscriber_buffer must be at least 1".to_owned(),
            ));
        }
        if !config.server.shared_live && config.server.live_listen == config.server.listen {
            return Err(ConfigError::ValidationError(format!(
                "server.live_listen {} equals server.listen; set server.shared_live to serve both on one port",
                config.server.listen
            )));
        }
        if config.auth.ingress_secret.as_deref() == Some("") {
            return Err(ConfigError::ValidationError(
                "auth.ingress_secret must not be empty".to_owned(),
            ));
        }
        if config.auth.subscriber_token.as_deref() == Some("") {
            return Err(ConfigError::ValidationError(
                "auth.subscriber_token must not be empty".to_owned(),
            ));
        }
        Ok(())
    }

    fn build_loaded_config(&self, file_config: FileConfig) -> LoadedConfig {
        let server = file_config.server;
        LoadedConfig {
            server: ServerConfig {
                listen: server.listen,
                live_listen: (!server.shared_live).then_some(server.live_listen),
            },
            relay: RelayConfig {
                policy: file_config.relay.policy,
                subscriber_buffer: file_config.relay.subscriber_buffer,
            },
            auth: AuthConfig::new(
                file_config.auth.ingress_secret,
                file_config.auth.subscriber_token,
            ),
        }
    }
}
