use crate::signature::Signature;
use serde::{Deserialize, Serialize};

/// Request payload for listing recent reconciliation anomalies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListAnomaliesRequest {
    /// Maximum rows to return; the server applies a default and a cap.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Signature for ListAnomaliesRequest {}

/// A notification the server acknowledged but could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyResponse {
    pub id: i64,
    /// e.g. `amount_mismatch`, `unknown_reference`
    pub kind: String,
    pub payment_reference: Option<String>,
    pub detail: String,
    /// Unix timestamp of when the anomaly was recorded.
    pub created_at: i64,
}
