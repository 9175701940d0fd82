use super::{LedgerError, NewOrder, OrderLedger, check_transition};
use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::entities::reconciliation_anomalies::{NewAnomaly, ReconciliationAnomaly};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process ledger behind a single mutex.
///
/// Holding the lock across the read-compare-write makes every transition
/// atomic, mirroring the guarded `UPDATE` of [`super::PgOrderLedger`]. Used
/// by tests and by the server's `--ephemeral` mode. Nothing survives a
/// restart. Only the newest [`ANOMALY_CAPACITY`] anomalies are kept.
pub struct MemoryLedger {
    reference_prefix: String,
    state: Mutex<MemoryState>,
}

pub const ANOMALY_CAPACITY: usize = 10_000;

#[derive(Default)]
struct MemoryState {
    orders: HashMap<Uuid, OrderRecord>,
    by_reference: HashMap<String, Uuid>,
    anomalies: VecDeque<ReconciliationAnomaly>,
    last_anomaly_id: i64,
}

impl MemoryLedger {
    pub fn new(reference_prefix: impl Into<String>) -> Self {
        Self {
            reference_prefix: reference_prefix.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }
}

#[async_trait]
impl OrderLedger for MemoryLedger {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, LedgerError> {
        let record = order.into_record(&self.reference_prefix)?;
        let mut state = self.state.lock().await;
        if state.by_reference.contains_key(&record.payment_reference) {
            return Err(LedgerError::Validation(format!(
                "payment reference {} already used",
                record.payment_reference
            )));
        }
        state
            .by_reference
            .insert(record.payment_reference.clone(), record.order_id);
        state.orders.insert(record.order_id, record.clone());
        tracing::info!(
            order_id = %record.order_id,
            payment_reference = %record.payment_reference,
            total_amount = %record.total_amount,
            "Order created"
        );
        Ok(record)
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from_expected: OrderStatus,
        to: OrderStatus,
    ) -> Result<OrderRecord, LedgerError> {
        check_transition(from_expected, to)?;
        let mut state = self.state.lock().await;
        let record = state.orders.get_mut(&order_id).ok_or(LedgerError::NotFound)?;
        if record.status != from_expected {
            return Err(LedgerError::Conflict {
                expected: from_expected,
                actual: record.status,
            });
        }
        record.status = to;
        if to.is_terminal() {
            record.settled_at = Some(time::OffsetDateTime::now_utc());
        }
        Ok(record.clone())
    }

    async fn get(&self, order_id: Uuid) -> Result<OrderRecord, LedgerError> {
        let state = self.state.lock().await;
        state.orders.get(&order_id).cloned().ok_or(LedgerError::NotFound)
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<OrderRecord, LedgerError> {
        let state = self.state.lock().await;
        state
            .by_reference
            .get(reference)
            .and_then(|id| state.orders.get(id))
            .cloned()
            .ok_or(LedgerError::NotFound)
    }

    async fn record_anomaly(&self, anomaly: NewAnomaly) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        state.last_anomaly_id += 1;
        let id = state.last_anomaly_id;
        if state.anomalies.len() == ANOMALY_CAPACITY {
            state.anomalies.pop_front();
        }
        state.anomalies.push_back(ReconciliationAnomaly {
            id,
            kind: anomaly.kind,
            payment_reference: anomaly.payment_reference,
            detail: anomaly.detail,
            created_at: time::OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn recent_anomalies(
        &self,
        limit: u32,
    ) -> Result<Vec<ReconciliationAnomaly>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .anomalies
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing::sample_order;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_and_lookup_by_reference() {
        let ledger = MemoryLedger::new("SHOP");
        let order = ledger.create(sample_order()).await.unwrap();
        let found = ledger
            .find_by_payment_reference(&order.payment_reference)
            .await
            .unwrap();
        assert_eq!(found, order);
        assert!(matches!(
            ledger.find_by_payment_reference("SHOP-0-nobody-00000000").await,
            Err(LedgerError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let ledger = MemoryLedger::new("SHOP");
        let order = ledger.create(sample_order()).await.unwrap();

        let moved = ledger
            .transition(order.order_id, OrderStatus::Pending, OrderStatus::AwaitingSettlement)
            .await
            .unwrap();
        assert_eq!(moved.status, OrderStatus::AwaitingSettlement);
        assert!(moved.settled_at.is_none());

        let again = ledger
            .transition(order.order_id, OrderStatus::Pending, OrderStatus::AwaitingSettlement)
            .await;
        assert!(matches!(
            again,
            Err(LedgerError::Conflict {
                actual: OrderStatus::AwaitingSettlement,
                ..
            })
        ));

        let paid = ledger
            .transition(order.order_id, OrderStatus::AwaitingSettlement, OrderStatus::Paid)
            .await
            .unwrap();
        assert!(paid.settled_at.is_some());
        assert_eq!(paid.total_amount, order.total_amount);
    }

    #[tokio::test]
    async fn test_illegal_edge_rejected_before_store() {
        let ledger = MemoryLedger::new("SHOP");
        let order = ledger.create(sample_order()).await.unwrap();
        assert!(matches!(
            ledger
                .transition(order.order_id, OrderStatus::Pending, OrderStatus::Paid)
                .await,
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert_eq!(
            ledger.get(order.order_id).await.unwrap().status,
            OrderStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let ledger = MemoryLedger::new("SHOP");
        assert!(matches!(
            ledger
                .transition(Uuid::now_v7(), OrderStatus::Pending, OrderStatus::Cancelled)
                .await,
            Err(LedgerError::NotFound)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_have_one_winner() {
        let ledger = Arc::new(MemoryLedger::new("SHOP"));
        let order = ledger.create(sample_order()).await.unwrap();
        ledger
            .transition(order.order_id, OrderStatus::Pending, OrderStatus::AwaitingSettlement)
            .await
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .transition(
                            order.order_id,
                            OrderStatus::AwaitingSettlement,
                            OrderStatus::Paid,
                        )
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(LedgerError::Conflict { actual, .. }) => assert_eq!(actual, OrderStatus::Paid),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_recent_anomalies_newest_first() {
        let ledger = MemoryLedger::new("SHOP");
        for detail in ["first", "second", "third"] {
            ledger
                .record_anomaly(NewAnomaly::new(
                    crate::entities::reconciliation_anomalies::AnomalyKind::UnknownReference,
                    None,
                    detail,
                ))
                .await
                .unwrap();
        }
        let recent = ledger.recent_anomalies(2).await.unwrap();
        let details: Vec<_> = recent.iter().map(|a| a.detail.as_str()).collect();
        assert_eq!(details, ["third", "second"]);
    }

    #[tokio::test]
    async fn test_anomalies_are_bounded() {
        let ledger = MemoryLedger::new("SHOP");
        for i in 0..ANOMALY_CAPACITY + 5 {
            ledger
                .record_anomaly(NewAnomaly::new(
                    crate::entities::reconciliation_anomalies::AnomalyKind::UnknownReference,
                    None,
                    i.to_string(),
                ))
                .await
                .unwrap();
        }
        let all = ledger.recent_anomalies(u32::MAX).await.unwrap();
        assert_eq!(all.len(), ANOMALY_CAPACITY);
        assert_eq!(all[0].id, (ANOMALY_CAPACITY + 5) as i64);
        assert_eq!(all.last().unwrap().detail, "5");
    }
}
