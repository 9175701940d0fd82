use super::{LedgerError, NewOrder, OrderLedger, check_transition};
use crate::entities::OrderStatus;
use crate::entities::order_records::{
    CompareAndSetOrderStatus, GetOrderRecordById, GetOrderRecordByPaymentReference,
    InsertOrderRecord, OrderRecord,
};
use crate::entities::reconciliation_anomalies::{
    InsertReconciliationAnomaly, ListReconciliationAnomalies, NewAnomaly, ReconciliationAnomaly,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed ledger. Transitions are a single guarded `UPDATE`, so
/// the row lock taken by Postgres is what serializes concurrent callers.
#[derive(Debug, Clone)]
pub struct PgOrderLedger {
    processor: DatabaseProcessor,
    reference_prefix: String,
}

impl PgOrderLedger {
    pub fn new(pool: PgPool, reference_prefix: impl Into<String>) -> Self {
        Self {
            processor: DatabaseProcessor { pool },
            reference_prefix: reference_prefix.into(),
        }
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, LedgerError> {
        let record = order.into_record(&self.reference_prefix)?;
        let record = self.processor.process(InsertOrderRecord { record }).await?;
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
        let updated = self
            .processor
            .process(CompareAndSetOrderStatus {
                order_id,
                expected: from_expected,
                new: to,
            })
            .await?;
        if let Some(record) = updated {
            return Ok(record);
        }

        match self.processor.process(GetOrderRecordById { order_id }).await? {
            Some(current) => Err(LedgerError::Conflict {
                expected: from_expected,
                actual: current.status,
            }),
            None => Err(LedgerError::NotFound),
        }
    }

    async fn get(&self, order_id: Uuid) -> Result<OrderRecord, LedgerError> {
        self.processor
            .process(GetOrderRecordById { order_id })
            .await?
            .ok_or(LedgerError::NotFound)
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<OrderRecord, LedgerError> {
        self.processor
            .process(GetOrderRecordByPaymentReference {
                payment_reference: reference.to_owned(),
            })
            .await?
            .ok_or(LedgerError::NotFound)
    }

    async fn record_anomaly(&self, anomaly: NewAnomaly) -> Result<(), LedgerError> {
        self.processor
            .process(InsertReconciliationAnomaly { anomaly })
            .await?;
        Ok(())
    }

    async fn recent_anomalies(
        &self,
        limit: u32,
    ) -> Result<Vec<ReconciliationAnomaly>, LedgerError> {
        let anomalies = self
            .processor
            .process(ListReconciliationAnomalies {
                limit: i64::from(limit),
            })
            .await?;
        Ok(anomalies)
    }
}
