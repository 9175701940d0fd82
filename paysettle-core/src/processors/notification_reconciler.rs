//! NotificationReconciler processor.
//!
//! Applies an Instant Transaction Notification to the ledger:
//! - verifies the gateway signature over every received field
//! - checks the source address against the configured allow-list
//! - matches the payment reference and the exact gross amount
//! - compare-and-sets `awaiting_settlement` to the reported outcome
//!
//! The gateway redelivers notifications it did not see acknowledged, so every
//! signed notification is acknowledged once it has been dealt with, including
//! duplicates and notifications parked as anomalies. Only store failures are
//! surfaced as errors so the gateway tries again later.

use crate::config::SettlementConfig;
use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::entities::reconciliation_anomalies::{AnomalyKind, NewAnomaly};
use crate::ledger::{LedgerError, OrderLedger};
use paysettle_sdk::objects::{GatewayPaymentStatus, ItnNotification};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Failures the gateway should retry.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The order moved to a non-final state nobody expected; retrying later
    /// may find it settled.
    #[error("order {payment_reference} is {actual}, expected awaiting_settlement")]
    StateConflict {
        payment_reference: String,
        actual: OrderStatus,
    },
}

/// How a notification was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    /// This notification moved the order to a terminal status.
    Settled(OrderRecord),
    /// The order had already reached this outcome; nothing changed.
    AlreadySettled(OrderStatus),
    /// The gateway reported the payment as still in progress.
    Acknowledged,
    /// Signed but not applicable; recorded for manual review.
    Anomaly(AnomalyKind),
    /// Not trusted; no ledger action and no acknowledgement.
    Rejected(AnomalyKind),
}

impl ReconcileResult {
    /// Whether the gateway should receive a success acknowledgement.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, ReconcileResult::Rejected(_))
    }
}

/// Minimum spacing, in seconds, between audit rows for rejected
/// notifications. Rejections in between are only logged.
const REJECTION_RECORD_INTERVAL_SECS: i64 = 60;

pub struct NotificationReconciler {
    config: Arc<SettlementConfig>,
    ledger: Arc<dyn OrderLedger>,
    /// Unix second of the last recorded rejection.
    last_rejection_recorded: AtomicI64,
}

impl NotificationReconciler {
    pub fn new(config: Arc<SettlementConfig>, ledger: Arc<dyn OrderLedger>) -> Self {
        Self {
            config,
            ledger,
            last_rejection_recorded: AtomicI64::new(i64::MIN),
        }
    }

    /// Handle one notification.
    ///
    /// `params` is the full decoded form body, `provided` the signature the
    /// gateway sent with it and `source` the peer address when known.
    #[tracing::instrument(skip_all, err, name = "ITN")]
    pub async fn handle(
        &self,
        params: &HashMap<String, String>,
        provided: &str,
        source: Option<IpAddr>,
    ) -> Result<ReconcileResult, ReconcileError> {
        if !self.config.signer().verify(params, provided) {
            warn!(source = ?source, "ITN signature mismatch");
            self.record_rejection(NewAnomaly::new(
                AnomalyKind::SignatureMismatch,
                None,
                format!("signature mismatch from {source:?}"),
            ))
            .await;
            return Ok(ReconcileResult::Rejected(AnomalyKind::SignatureMismatch));
        }

        if !self.config.gateway.is_source_allowed(source) {
            warn!(source = ?source, "ITN from address outside allow-list");
            self.record_rejection(NewAnomaly::new(
                AnomalyKind::SourceNotAllowed,
                None,
                format!("source {source:?} not in allowed ranges"),
            ))
            .await;
            return Ok(ReconcileResult::Rejected(AnomalyKind::SourceNotAllowed));
        }

        let itn = match ItnNotification::from_params(params) {
            Ok(itn) => itn,
            Err(e) => {
                let reference = params
                    .get(paysettle_sdk::objects::itn::FIELD_PAYMENT_REFERENCE)
                    .map(String::as_str);
                return self
                    .park(AnomalyKind::MalformedNotification, reference, e.to_string())
                    .await;
            }
        };
        let reference = itn.payment_reference.as_str();

        if let Some(merchant_id) = itn
            .merchant_id
            .as_ref()
            .filter(|id| **id != self.config.merchant.merchant_id)
        {
            return self
                .park(
                    AnomalyKind::MerchantMismatch,
                    Some(reference),
                    format!("notification for merchant {merchant_id}"),
                )
                .await;
        }

        let order = match self.ledger.find_by_payment_reference(reference).await {
            Ok(order) => order,
            Err(LedgerError::NotFound) => {
                return self
                    .park(
                        AnomalyKind::UnknownReference,
                        Some(reference),
                        "no order with this payment reference",
                    )
                    .await;
            }
            Err(e) => {
                error!(payment_reference = %reference, error = %e, "Order lookup failed");
                return Err(e.into());
            }
        };

        if itn.amount_gross != order.total_amount {
            return self
                .park(
                    AnomalyKind::AmountMismatch,
                    Some(reference),
                    format!(
                        "gateway reported {}, order total is {}",
                        itn.amount_gross, order.total_amount
                    ),
                )
                .await;
        }

        let target = match &itn.payment_status {
            GatewayPaymentStatus::Complete => OrderStatus::Paid,
            GatewayPaymentStatus::Failed | GatewayPaymentStatus::Cancelled => OrderStatus::Failed,
            GatewayPaymentStatus::Pending => {
                debug!(payment_reference = %reference, "Gateway reports payment pending");
                return Ok(ReconcileResult::Acknowledged);
            }
            GatewayPaymentStatus::Other(code) => {
                return self
                    .park(
                        AnomalyKind::UnknownOutcome,
                        Some(reference),
                        format!("unknown payment_status `{code}`"),
                    )
                    .await;
            }
        };

        self.settle(&order, target, &itn).await
    }

    async fn settle(
        &self,
        order: &OrderRecord,
        target: OrderStatus,
        itn: &ItnNotification,
    ) -> Result<ReconcileResult, ReconcileError> {
        let reference = order.payment_reference.as_str();
        match self
            .ledger
            .transition(order.order_id, OrderStatus::AwaitingSettlement, target)
            .await
        {
            Ok(settled) => {
                info!(
                    payment_reference = %reference,
                    gateway_payment_id = ?itn.gateway_payment_id,
                    status = %settled.status,
                    "Order settled"
                );
                Ok(ReconcileResult::Settled(settled))
            }
            Err(LedgerError::Conflict { actual, .. }) if actual == target => {
                debug!(payment_reference = %reference, status = %actual, "Duplicate ITN");
                Ok(ReconcileResult::AlreadySettled(actual))
            }
            Err(LedgerError::Conflict { actual, .. }) if actual.is_terminal() => {
                self.park(
                    AnomalyKind::UnexpectedState,
                    Some(reference),
                    format!("gateway reported {}, order is already {actual}", itn.payment_status),
                )
                .await
            }
            Err(LedgerError::Conflict { actual, .. }) => {
                warn!(
                    payment_reference = %reference,
                    status = %actual,
                    "ITN for unsettleable order"
                );
                Err(ReconcileError::StateConflict {
                    payment_reference: reference.to_owned(),
                    actual,
                })
            }
            Err(e) => {
                error!(payment_reference = %reference, error = %e, "Settlement transition failed");
                Err(e.into())
            }
        }
    }

    /// Record an anomaly for a signed notification and acknowledge it.
    async fn park(
        &self,
        kind: AnomalyKind,
        reference: Option<&str>,
        detail: impl Into<String>,
    ) -> Result<ReconcileResult, ReconcileError> {
        let anomaly = NewAnomaly::new(kind, reference, detail);
        warn!(
            kind = %kind,
            payment_reference = ?reference,
            detail = %anomaly.detail,
            "Reconciliation anomaly"
        );
        self.ledger.record_anomaly(anomaly).await?;
        Ok(ReconcileResult::Anomaly(kind))
    }

    /// Rejected notifications are unauthenticated, so at most one audit row
    /// is written per interval no matter how many arrive.
    async fn record_rejection(&self, anomaly: NewAnomaly) {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let last = self.last_rejection_recorded.load(Ordering::Relaxed);
        if now.saturating_sub(last) < REJECTION_RECORD_INTERVAL_SECS
            || self
                .last_rejection_recorded
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
        {
            debug!(kind = %anomaly.kind, "Rejection audit row throttled");
            return;
        }
        if let Err(e) = self.ledger.record_anomaly(anomaly).await {
            error!(error = %e, "Failed to record reconciliation anomaly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::testing::sandbox_config;
    use crate::ledger::MemoryLedger;
    use crate::ledger::testing::sample_order;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        reconciler: Arc<NotificationReconciler>,
    }

    fn harness() -> Harness {
        harness_with(sandbox_config())
    }

    fn harness_with(config: SettlementConfig) -> Harness {
        let ledger = Arc::new(MemoryLedger::new("SHOP"));
        let reconciler = Arc::new(NotificationReconciler::new(
            Arc::new(config),
            ledger.clone(),
        ));
        Harness { ledger, reconciler }
    }

    impl Harness {
        async fn awaiting_order(&self) -> OrderRecord {
            let order = self.ledger.create(sample_order()).await.unwrap();
            self.ledger
                .transition(
                    order.order_id,
                    OrderStatus::Pending,
                    OrderStatus::AwaitingSettlement,
                )
                .await
                .unwrap()
        }
    }

    fn itn(reference: &str, status: &str, amount: &str) -> HashMap<String, String> {
        [
            ("m_payment_id", reference),
            ("pf_payment_id", "1089250"),
            ("payment_status", status),
            ("item_name", "Marketplace order"),
            ("amount_gross", amount),
            ("amount_fee", "-27.60"),
            ("amount_net", "1172.40"),
            ("name_first", "Jane"),
            ("email_address", "jane@example.com"),
            ("merchant_id", "10000100"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
    }

    fn signed(params: &HashMap<String, String>) -> String {
        sandbox_config().signer().sign(params)
    }

    #[tokio::test]
    async fn test_complete_settles_order_as_paid() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");

        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        let ReconcileResult::Settled(settled) = result else {
            panic!("expected settlement, got {result:?}");
        };
        assert_eq!(settled.status, OrderStatus::Paid);
        assert!(settled.settled_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_notification_is_a_noop() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        let code = signed(&params);

        h.reconciler.handle(&params, &code, None).await.unwrap();
        let settled_at = h.ledger.get(order.order_id).await.unwrap().settled_at;

        let again = h.reconciler.handle(&params, &code, None).await.unwrap();
        assert_eq!(again, ReconcileResult::AlreadySettled(OrderStatus::Paid));
        assert!(again.is_acknowledged());
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().settled_at,
            settled_at
        );
    }

    #[tokio::test]
    async fn test_failed_and_cancelled_map_to_failed() {
        for status in ["FAILED", "CANCELLED"] {
            let h = harness();
            let order = h.awaiting_order().await;
            let params = itn(&order.payment_reference, status, "1200.00");
            h.reconciler
                .handle(&params, &signed(&params), None)
                .await
                .unwrap();
            assert_eq!(
                h.ledger.get(order.order_id).await.unwrap().status,
                OrderStatus::Failed
            );
        }
    }

    #[tokio::test]
    async fn test_pending_is_acknowledged_without_transition() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "PENDING", "1200.00");
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::Acknowledged);
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::AwaitingSettlement
        );
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_parked() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "COMPLETE", "1199.99");

        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::Anomaly(AnomalyKind::AmountMismatch));
        assert!(result.is_acknowledged());
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::AwaitingSettlement
        );

        let anomalies = h.ledger.recent_anomalies(10).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::AmountMismatch);
        assert_eq!(
            anomalies[0].payment_reference.as_deref(),
            Some(order.payment_reference.as_str())
        );
    }

    #[tokio::test]
    async fn test_tampered_notification_is_rejected() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        let code = signed(&params);

        let mut tampered = params.clone();
        tampered.insert("amount_gross".into(), "1.00".into());
        let result = h.reconciler.handle(&tampered, &code, None).await.unwrap();
        assert_eq!(
            result,
            ReconcileResult::Rejected(AnomalyKind::SignatureMismatch)
        );
        assert!(!result.is_acknowledged());
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::AwaitingSettlement
        );
    }

    #[tokio::test]
    async fn test_rejection_audit_rows_are_throttled() {
        let h = harness();
        let params = itn("SHOP-0-ghost-00000000", "COMPLETE", "1200.00");
        for _ in 0..50 {
            let result = h
                .reconciler
                .handle(&params, "00000000000000000000000000000000", None)
                .await
                .unwrap();
            assert_eq!(
                result,
                ReconcileResult::Rejected(AnomalyKind::SignatureMismatch)
            );
        }
        let anomalies = h.ledger.recent_anomalies(100).await.unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_parked() {
        let h = harness();
        let params = itn("SHOP-0-ghost-00000000", "COMPLETE", "1200.00");
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(
            result,
            ReconcileResult::Anomaly(AnomalyKind::UnknownReference)
        );
    }

    #[tokio::test]
    async fn test_foreign_merchant_is_parked() {
        let h = harness();
        let order = h.awaiting_order().await;
        let mut params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        params.insert("merchant_id".into(), "99999999".into());
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(
            result,
            ReconcileResult::Anomaly(AnomalyKind::MerchantMismatch)
        );
    }

    #[tokio::test]
    async fn test_unknown_outcome_is_parked() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "REFUNDED", "1200.00");
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::Anomaly(AnomalyKind::UnknownOutcome));
    }

    #[tokio::test]
    async fn test_source_allow_list() {
        let mut config = sandbox_config();
        config.gateway.allowed_source_ranges = vec!["197.97.145.144/28".parse().unwrap()];
        let h = harness_with(config);
        let order = h.awaiting_order().await;
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        let code = signed(&params);

        let outside = h
            .reconciler
            .handle(&params, &code, Some("203.0.113.5".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(
            outside,
            ReconcileResult::Rejected(AnomalyKind::SourceNotAllowed)
        );

        let inside = h
            .reconciler
            .handle(&params, &code, Some("197.97.145.145".parse().unwrap()))
            .await
            .unwrap();
        assert!(matches!(inside, ReconcileResult::Settled(_)));
    }

    #[tokio::test]
    async fn test_complete_after_cancellation_is_parked() {
        let h = harness();
        let order = h.awaiting_order().await;
        h.ledger
            .transition(
                order.order_id,
                OrderStatus::AwaitingSettlement,
                OrderStatus::Cancelled,
            )
            .await
            .unwrap();
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert_eq!(result, ReconcileResult::Anomaly(AnomalyKind::UnexpectedState));
    }

    #[tokio::test]
    async fn test_notification_before_initiation_is_retried() {
        let h = harness();
        let order = h.ledger.create(sample_order()).await.unwrap();
        let params = itn(&order.payment_reference, "COMPLETE", "1200.00");
        let result = h.reconciler.handle(&params, &signed(&params), None).await;
        assert!(matches!(
            result,
            Err(ReconcileError::StateConflict {
                actual: OrderStatus::Pending,
                ..
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_settle_once() {
        let h = harness();
        let order = h.awaiting_order().await;
        let params = Arc::new(itn(&order.payment_reference, "COMPLETE", "1200.00"));
        let code = Arc::new(signed(&params));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let reconciler = h.reconciler.clone();
                let params = params.clone();
                let code = code.clone();
                tokio::spawn(async move { reconciler.handle(&params, &code, None).await })
            })
            .collect();

        let mut settled = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ReconcileResult::Settled(_) => settled += 1,
                ReconcileResult::AlreadySettled(OrderStatus::Paid) => {}
                other => panic!("unexpected result {other:?}"),
            }
        }
        assert_eq!(settled, 1);
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_checkout_to_settlement() {
        use crate::processors::PaymentInitiator;
        use paysettle_sdk::objects::CallbackUrls;

        let h = harness();
        let initiator = PaymentInitiator::new(Arc::new(sandbox_config()), h.ledger.clone());
        let order = h.ledger.create(sample_order()).await.unwrap();
        assert_eq!(order.total_amount.to_string(), "1200.00");

        let initiated = initiator
            .initiate(
                &order,
                &CallbackUrls {
                    return_url: "https://shop.test/return".into(),
                    cancel_url: "https://shop.test/cancel".into(),
                    notify_url: "https://shop.test/itn".into(),
                },
            )
            .await
            .unwrap();
        let amount = initiated.redirect.field("amount").unwrap().to_owned();
        assert_eq!(amount, "1200.00");

        let params = itn(&order.payment_reference, "COMPLETE", &amount);
        let result = h
            .reconciler
            .handle(&params, &signed(&params), None)
            .await
            .unwrap();
        assert!(matches!(result, ReconcileResult::Settled(_)));
        assert_eq!(
            h.ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::Paid
        );
    }
}
