//! Merchant configuration.

use super::ConfigurationError;

/// Merchant identity at the gateway plus the secrets this server holds.
#[derive(Clone)]
pub struct MerchantConfig {
    /// Gateway-issued merchant id.
    pub merchant_id: String,
    /// Gateway-issued merchant key.
    pub merchant_key: String,
    /// Salt passphrase appended to the signed string. Some gateway modes run
    /// without one.
    pub passphrase: Option<String>,
    /// HMAC key shared with the storefront backend for the Service API.
    pub service_secret: Box<[u8]>,
    /// Leading segment of generated payment references.
    pub reference_prefix: String,
    /// `item_name` shown to the buyer on the gateway page.
    pub item_name: String,
}

impl std::fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_key", &"***")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("reference_prefix", &self.reference_prefix)
            .field("item_name", &self.item_name)
            .finish_non_exhaustive()
    }
}

impl MerchantConfig {
    /// Get the secret key bytes for Service API HMAC signing.
    pub fn service_secret_bytes(&self) -> &[u8] {
        &self.service_secret
    }

    pub fn ensure_credentials(&self) -> Result<(), ConfigurationError> {
        if self.merchant_id.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential("merchant_id"));
        }
        if self.merchant_key.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential("merchant_key"));
        }
        if self.service_secret.is_empty() {
            return Err(ConfigurationError::MissingCredential("service_secret"));
        }
        if self.reference_prefix.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential("reference_prefix"));
        }
        Ok(())
    }
}
