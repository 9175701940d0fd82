//! TOML file configuration structures.
//!
//! These structs directly map to the `paysettle-config.toml` file format.

use ipnet::IpNet;
use paysettle_sdk::gateway::SpaceEncoding;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub merchant: MerchantConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// Externally reachable root of this server. Callback URLs handed to the
    /// gateway are built from it.
    pub public_base_url: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Merchant section: gateway credentials and the Service API secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub merchant_key: String,
    /// Salt passphrase set in the gateway dashboard, if any.
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Shared secret for signing Service API requests.
    pub service_secret: String,
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    #[serde(default = "default_item_name")]
    pub item_name: String,
}

fn default_reference_prefix() -> String {
    "PS".to_string()
}

fn default_item_name() -> String {
    "Order".to_string()
}

/// Hosted gateway section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_process_url")]
    pub process_url: String,
    #[serde(default)]
    pub space_encoding: SpaceEncoding,
    /// CIDR ranges notifications may come from. Empty accepts any source.
    #[serde(default)]
    pub allowed_source_ranges: Vec<IpNet>,
    /// Take the notification source from the last `X-Forwarded-For` entry.
    /// Only enable behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_process_url() -> String {
    "https://www.payfast.co.za/eng/process".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            process_url: default_process_url(),
            space_encoding: SpaceEncoding::default(),
            allowed_source_ranges: Vec::new(),
            trust_forwarded_for: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"
public_base_url = "https://pay.example.com"

[merchant]
merchant_id = "10000100"
merchant_key = "46f0cd694581a"
passphrase = "jt7NOE43FZPn"
service_secret = "secret123"
reference_prefix = "SHOP"
item_name = "Marketplace order"

[gateway]
process_url = "https://sandbox.payfast.co.za/eng/process"
space_encoding = "percent"
allowed_source_ranges = ["197.97.145.144/28", "41.74.179.192/27"]
trust_forwarded_for = true
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.merchant.passphrase.as_deref(), Some("jt7NOE43FZPn"));
        assert_eq!(config.gateway.space_encoding, SpaceEncoding::Percent);
        assert_eq!(config.gateway.allowed_source_ranges.len(), 2);
        assert!(config.gateway.trust_forwarded_for);
    }

    #[test]
    fn test_defaults() {
        let toml_str = r#"
[server]
public_base_url = "https://pay.example.com"

[merchant]
merchant_id = "10000100"
merchant_key = "46f0cd694581a"
service_secret = "secret123"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert!(config.merchant.passphrase.is_none());
        assert_eq!(config.merchant.reference_prefix, "PS");
        assert_eq!(config.gateway.space_encoding, SpaceEncoding::Plus);
        assert!(config.gateway.allowed_source_ranges.is_empty());
        assert!(!config.gateway.trust_forwarded_for);
    }
}
