//! Validated runtime configuration for the settlement components.
//!
//! Loaded once at startup by the server crate and shared read-only; the
//! initiator and the reconciler receive it explicitly at construction.

mod gateway;
mod merchant;

pub use gateway::GatewayConfig;
pub use merchant::MerchantConfig;

use paysettle_sdk::gateway::GatewaySigner;

/// Missing or unusable merchant/gateway settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("merchant credential `{0}` is not configured")]
    MissingCredential(&'static str),
    #[error("invalid gateway setting: {0}")]
    InvalidGateway(String),
}

/// Everything the initiator and reconciler need, immutable after startup.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub merchant: MerchantConfig,
    pub gateway: GatewayConfig,
}

impl SettlementConfig {
    /// Fail fast on configuration that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.merchant.ensure_credentials()?;
        self.gateway.validate()
    }

    /// Signer over the merchant passphrase and the gateway's encoding.
    pub fn signer(&self) -> GatewaySigner {
        GatewaySigner::new(self.merchant.passphrase.clone(), self.gateway.space_encoding)
    }
}
