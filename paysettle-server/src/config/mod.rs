//! Configuration module for paysettle-server.
//!
//! Handles loading configuration from the TOML file, CLI arguments and
//! environment variables. The result is immutable for the process lifetime.

pub mod file;

use crate::config::file::FileConfig;
use paysettle_core::config::{
    ConfigurationError, GatewayConfig, MerchantConfig, SettlementConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("settlement configuration error: {0}")]
    Settlement(#[from] ConfigurationError),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// HTTP-facing settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Always ends with `/` so relative joins keep any path prefix.
    pub public_base_url: Url,
    pub trust_forwarded_for: bool,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub settlement: SettlementConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        parse_config(&config_content, self.listen_override)
    }
}

/// Parse a TOML document into the validated runtime configuration.
pub fn parse_config(
    content: &str,
    listen_override: Option<SocketAddr>,
) -> Result<LoadedConfig, ConfigError> {
    let mut file_config: FileConfig = toml::from_str(content)?;

    if let Some(listen) = listen_override {
        file_config.server.listen = listen;
    }

    let loaded = build_loaded_config(file_config)?;
    loaded.settlement.validate()?;
    Ok(loaded)
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let mut public_base_url = Url::parse(&file_config.server.public_base_url).map_err(|e| {
        ConfigError::ValidationError(format!("server.public_base_url: {e}"))
    })?;
    if public_base_url.cannot_be_a_base()
        || !matches!(public_base_url.scheme(), "http" | "https")
    {
        return Err(ConfigError::ValidationError(
            "server.public_base_url must be an absolute http(s) URL".into(),
        ));
    }
    if !public_base_url.path().ends_with('/') {
        let path = format!("{}/", public_base_url.path());
        public_base_url.set_path(&path);
    }

    let merchant = file_config.merchant;
    let gateway = file_config.gateway;

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
            public_base_url,
            trust_forwarded_for: gateway.trust_forwarded_for,
        },
        settlement: SettlementConfig {
            merchant: MerchantConfig {
                merchant_id: merchant.merchant_id,
                merchant_key: merchant.merchant_key,
                passphrase: merchant.passphrase.filter(|p| !p.is_empty()),
                service_secret: merchant.service_secret.into_bytes().into_boxed_slice(),
                reference_prefix: merchant.reference_prefix,
                item_name: merchant.item_name,
            },
            gateway: GatewayConfig {
                process_url: gateway.process_url,
                space_encoding: gateway.space_encoding,
                allowed_source_ranges: gateway.allowed_source_ranges,
            },
        },
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
