//! The order ledger: persisted orders and their status state machine.
//!
//! Every status change is a compare-and-set against the stored status, so
//! concurrent notifications or duplicate initiations for the same order
//! serialize in the store and exactly one of them wins.

mod memory;
mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgOrderLedger;

use crate::entities::OrderStatus;
use crate::entities::order_records::OrderRecord;
use crate::entities::reconciliation_anomalies::{NewAnomaly, ReconciliationAnomaly};
use async_trait::async_trait;
use paysettle_sdk::objects::{BuyerContact, CreateOrderRequest, LineItem};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

/// Longest buyer id fragment embedded in a payment reference.
const REFERENCE_BUYER_MAX: usize = 32;

/// Currency minor units; amounts with more decimals cannot be settled
/// exactly through the gateway.
const MAX_AMOUNT_SCALE: u32 = 2;

/// Largest value a `NUMERIC(18,2)` column holds.
const MAX_AMOUNT: Decimal = Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 2);

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("order not found")]
    NotFound,
    #[error("status conflict: expected {expected}, found {actual}")]
    Conflict {
        expected: OrderStatus,
        actual: OrderStatus,
    },
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Checkout data handed over by the storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub buyer_id: String,
    pub line_items: Vec<LineItem>,
    pub buyer_contact: BuyerContact,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
}

impl From<CreateOrderRequest> for NewOrder {
    fn from(req: CreateOrderRequest) -> Self {
        Self {
            buyer_id: req.buyer_id,
            line_items: req.line_items,
            buyer_contact: req.buyer_contact,
            subtotal: req.subtotal,
            shipping_cost: req.shipping_cost,
            tax_amount: req.tax_amount,
        }
    }
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.buyer_id.trim().is_empty() {
            return Err(LedgerError::Validation("buyer_id is empty".into()));
        }
        if self.line_items.is_empty() {
            return Err(LedgerError::Validation("line item snapshot is empty".into()));
        }
        for (name, amount) in [
            ("subtotal", self.subtotal),
            ("shipping_cost", self.shipping_cost),
            ("tax_amount", self.tax_amount),
        ] {
            if amount < Decimal::ZERO {
                return Err(LedgerError::Validation(format!("{name} is negative")));
            }
            if amount > MAX_AMOUNT {
                return Err(LedgerError::Validation(format!("{name} is out of range")));
            }
            if amount.normalize().scale() > MAX_AMOUNT_SCALE {
                return Err(LedgerError::Validation(format!(
                    "{name} has more than {MAX_AMOUNT_SCALE} decimal places"
                )));
            }
        }
        if let Some(item) = self.line_items.iter().find(|i| i.quantity == 0) {
            return Err(LedgerError::Validation(format!(
                "line item {} has zero quantity",
                item.product_id
            )));
        }
        self.total_amount().map(|_| ())
    }

    /// Subtotal plus shipping plus tax, bounded by what the store can hold.
    pub fn total_amount(&self) -> Result<Decimal, LedgerError> {
        self.subtotal
            .checked_add(self.shipping_cost)
            .and_then(|sum| sum.checked_add(self.tax_amount))
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| LedgerError::Validation("total amount is out of range".into()))
    }

    /// Validate and turn into a `pending` record with a fresh id and
    /// payment reference.
    pub fn into_record(self, reference_prefix: &str) -> Result<OrderRecord, LedgerError> {
        self.validate()?;
        let now = time::OffsetDateTime::now_utc();
        let total_amount = self.total_amount()?;
        Ok(OrderRecord {
            order_id: Uuid::now_v7(),
            payment_reference: generate_payment_reference(reference_prefix, &self.buyer_id, now),
            buyer_id: self.buyer_id,
            line_items: Json(self.line_items),
            buyer_contact: Json(self.buyer_contact),
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax_amount: self.tax_amount,
            total_amount,
            status: OrderStatus::Pending,
            created_at: now,
            settled_at: None,
        })
    }
}

/// `{prefix}-{unix_millis}-{buyer}-{random}`; the random tail keeps two
/// attempts by the same buyer in the same millisecond apart.
pub fn generate_payment_reference(
    prefix: &str,
    buyer_id: &str,
    now: time::OffsetDateTime,
) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let buyer: String = buyer_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(REFERENCE_BUYER_MAX)
        .collect();
    format!("{prefix}-{millis}-{buyer}-{:08x}", rand::random::<u32>())
}

/// Reject edges the state machine does not have before touching the store.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<(), LedgerError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition { from, to })
    }
}

/// Persistence seam for orders and reconciliation audit rows.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Validate, compute the total, assign a payment reference and persist
    /// as `pending`.
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, LedgerError>;

    /// Atomically move `order_id` from `from_expected` to `to`.
    ///
    /// Fails with [`LedgerError::Conflict`] when the stored status is not
    /// `from_expected`.
    async fn transition(
        &self,
        order_id: Uuid,
        from_expected: OrderStatus,
        to: OrderStatus,
    ) -> Result<OrderRecord, LedgerError>;

    async fn get(&self, order_id: Uuid) -> Result<OrderRecord, LedgerError>;

    async fn find_by_payment_reference(&self, reference: &str) -> Result<OrderRecord, LedgerError>;

    async fn record_anomaly(&self, anomaly: NewAnomaly) -> Result<(), LedgerError>;

    async fn recent_anomalies(&self, limit: u32) -> Result<Vec<ReconciliationAnomaly>, LedgerError>;
}


#[cfg(test)]
mod tests {
    use super::testing::{dec, sample_order};
    use super::*;

    #[test]
    fn test_total_is_sum_of_components() {
        let record = sample_order().into_record("SHOP").unwrap();
        assert_eq!(record.total_amount, dec("1200.00"));
        assert_eq!(record.status, OrderStatus::Pending);
        assert!(record.settled_at.is_none());
        assert!(record.payment_reference.starts_with("SHOP-"));
        assert!(record.payment_reference.contains("-user_42-"));
    }

    #[test]
    fn test_validation_errors() {
        let mut order = sample_order();
        order.shipping_cost = dec("-0.01");
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.line_items.clear();
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.tax_amount = dec("0.001");
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.buyer_id = " ".into();
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.tax_amount = dec("0.000");
        assert!(order.validate().is_ok());
    }

    #[test]
    fn test_oversized_amounts_are_rejected() {
        let mut order = sample_order();
        order.subtotal = Decimal::MAX;
        order.shipping_cost = Decimal::MAX;
        assert!(matches!(order.into_record("SHOP"), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.subtotal = dec("9999999999999999.99");
        assert_eq!(MAX_AMOUNT, order.subtotal);
        order.shipping_cost = dec("0.00");
        order.tax_amount = dec("0.00");
        assert!(order.validate().is_ok());

        order.tax_amount = dec("0.01");
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));

        let mut order = sample_order();
        order.shipping_cost = dec("10000000000000000.00");
        assert!(matches!(order.validate(), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_references_are_unique_per_attempt() {
        let now = time::OffsetDateTime::now_utc();
        let a = generate_payment_reference("SHOP", "buyer", now);
        let b = generate_payment_reference("SHOP", "buyer", now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_check_transition() {
        assert!(check_transition(OrderStatus::AwaitingSettlement, OrderStatus::Paid).is_ok());
        assert!(matches!(
            check_transition(OrderStatus::Paid, OrderStatus::Failed),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }
}
