//! Hosted gateway settings.

use super::ConfigurationError;
use ipnet::IpNet;
use paysettle_sdk::gateway::SpaceEncoding;
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Where the buyer's browser posts the signed form.
    pub process_url: String,
    /// Value encoding the gateway uses when it computes signatures.
    pub space_encoding: SpaceEncoding,
    /// Networks ITNs may originate from. Empty disables the check.
    pub allowed_source_ranges: Vec<IpNet>,
}

impl GatewayConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigurationError> {
        let url = url::Url::parse(&self.process_url)
            .map_err(|e| ConfigurationError::InvalidGateway(format!("process_url: {e}")))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConfigurationError::InvalidGateway(format!(
                "process_url must be http(s), got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Whether an ITN from `source` passes the network allow-list.
    ///
    /// An unknown source only passes when no allow-list is configured.
    pub fn is_source_allowed(&self, source: Option<IpAddr>) -> bool {
        if self.allowed_source_ranges.is_empty() {
            return true;
        }
        let Some(ip) = source else {
            return false;
        };
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        self.allowed_source_ranges.iter().any(|net| net.contains(&ip))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::testing::sandbox_config;

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let config = sandbox_config().gateway;
        assert!(config.is_source_allowed(None));
        assert!(config.is_source_allowed(Some("203.0.113.9".parse().unwrap())));
    }

    #[test]
    fn test_allow_list_ranges() {
        let mut config = sandbox_config().gateway;
        config.allowed_source_ranges = vec![
            "197.97.145.144/28".parse().unwrap(),
            "41.74.179.192/27".parse().unwrap(),
        ];
        assert!(config.is_source_allowed(Some("197.97.145.150".parse().unwrap())));
        assert!(config.is_source_allowed(Some("::ffff:41.74.179.200".parse().unwrap())));
        assert!(!config.is_source_allowed(Some("197.97.145.160".parse().unwrap())));
        assert!(!config.is_source_allowed(None));
    }

    #[test]
    fn test_process_url_must_parse() {
        let mut config = sandbox_config();
        config.gateway.process_url = "not a url".into();
        assert!(config.validate().is_err());
    }
}
