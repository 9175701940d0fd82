//! Instant Transaction Notification (ITN) payload.
//!
//! The gateway POSTs an `application/x-www-form-urlencoded` body to the
//! `notify_url`. It echoes the request fields and adds the settlement outcome.
//! Field names follow the gateway's published ITN variables.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

pub const FIELD_PAYMENT_REFERENCE: &str = "m_payment_id";
pub const FIELD_GATEWAY_PAYMENT_ID: &str = "pf_payment_id";
pub const FIELD_PAYMENT_STATUS: &str = "payment_status";
pub const FIELD_AMOUNT_GROSS: &str = "amount_gross";
pub const FIELD_MERCHANT_ID: &str = "merchant_id";

/// Outcome code reported in `payment_status`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GatewayPaymentStatus {
    Complete,
    Failed,
    Cancelled,
    Pending,
    Other(String),
}

impl From<&str> for GatewayPaymentStatus {
    fn from(value: &str) -> Self {
        match value {
            "COMPLETE" => Self::Complete,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "PENDING" => Self::Pending,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for GatewayPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayPaymentStatus::Complete => write!(f, "COMPLETE"),
            GatewayPaymentStatus::Failed => write!(f, "FAILED"),
            GatewayPaymentStatus::Cancelled => write!(f, "CANCELLED"),
            GatewayPaymentStatus::Pending => write!(f, "PENDING"),
            GatewayPaymentStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItnError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
}

/// The typed subset of an ITN the settlement logic acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItnNotification {
    pub payment_reference: String,
    pub gateway_payment_id: Option<String>,
    pub payment_status: GatewayPaymentStatus,
    pub amount_gross: Decimal,
    pub merchant_id: Option<String>,
}

impl ItnNotification {
    /// Extract the typed fields from the raw form body.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ItnError> {
        let required = |name: &'static str| {
            params
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or(ItnError::MissingField(name))
        };
        let optional = |name: &str| {
            params
                .get(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let amount = required(FIELD_AMOUNT_GROSS)?;
        let amount_gross =
            Decimal::from_str(amount).map_err(|_| ItnError::InvalidAmount(amount.to_owned()))?;

        Ok(Self {
            payment_reference: required(FIELD_PAYMENT_REFERENCE)?.to_owned(),
            gateway_payment_id: optional(FIELD_GATEWAY_PAYMENT_ID),
            payment_status: required(FIELD_PAYMENT_STATUS)?.into(),
            amount_gross,
            merchant_id: optional(FIELD_MERCHANT_ID),
        })
    }
}
