use crate::entities::OrderStatus;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use paysettle_sdk::objects::{BuyerContact, LineItem, OrderResponse};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

/// The persisted order. Monetary fields and the line item snapshot are
/// written once at creation and never updated.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderRecord {
    pub order_id: Uuid,
    pub payment_reference: String,
    pub buyer_id: String,
    pub line_items: Json<Vec<LineItem>>,
    pub buyer_contact: Json<BuyerContact>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: time::OffsetDateTime,
    pub settled_at: Option<time::OffsetDateTime>,
}

impl OrderRecord {
    pub fn to_response(&self) -> OrderResponse {
        OrderResponse {
            order_id: self.order_id,
            payment_reference: self.payment_reference.clone(),
            buyer_id: self.buyer_id.clone(),
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax_amount: self.tax_amount,
            total_amount: self.total_amount,
            status: self.status.into(),
            created_at: self.created_at.unix_timestamp(),
            settled_at: self.settled_at.map(|t| t.unix_timestamp()),
        }
    }
}

const ORDER_COLUMNS: &str = "order_id, payment_reference, buyer_id, line_items, buyer_contact, \
    subtotal, shipping_cost, tax_amount, total_amount, status, created_at, settled_at";

#[derive(Debug, Clone)]
/// Insert a fully built order record.
pub struct InsertOrderRecord {
    pub record: OrderRecord,
}

impl Processor<InsertOrderRecord> for DatabaseProcessor {
    type Output = OrderRecord;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertOrderRecord")]
    async fn process(&self, insert: InsertOrderRecord) -> Result<OrderRecord, sqlx::Error> {
        let r = insert.record;
        let record = sqlx::query_as::<_, OrderRecord>(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(r.order_id)
        .bind(r.payment_reference)
        .bind(r.buyer_id)
        .bind(r.line_items)
        .bind(r.buyer_contact)
        .bind(r.subtotal)
        .bind(r.shipping_cost)
        .bind(r.tax_amount)
        .bind(r.total_amount)
        .bind(r.status)
        .bind(r.created_at)
        .bind(r.settled_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderRecordById {
    pub order_id: Uuid,
}

impl Processor<GetOrderRecordById> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderRecordById")]
    async fn process(&self, query: GetOrderRecordById) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"
        ))
        .bind(query.order_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetOrderRecordByPaymentReference {
    pub payment_reference: String,
}

impl Processor<GetOrderRecordByPaymentReference> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderRecordByPaymentReference")]
    async fn process(
        &self,
        query: GetOrderRecordByPaymentReference,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        sqlx::query_as::<_, OrderRecord>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1"
        ))
        .bind(query.payment_reference)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Move an order from `expected` to `new` in one guarded statement.
///
/// Returns `None` when the row does not exist or its status is no longer
/// `expected`; the caller re-reads to tell the two apart. `settled_at` is
/// stamped when `new` is terminal.
pub struct CompareAndSetOrderStatus {
    pub order_id: Uuid,
    pub expected: OrderStatus,
    pub new: OrderStatus,
}

impl Processor<CompareAndSetOrderStatus> for DatabaseProcessor {
    type Output = Option<OrderRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompareAndSetOrderStatus")]
    async fn process(
        &self,
        cmd: CompareAndSetOrderStatus,
    ) -> Result<Option<OrderRecord>, sqlx::Error> {
        let settled_at = cmd
            .new
            .is_terminal()
            .then(time::OffsetDateTime::now_utc);
        sqlx::query_as::<_, OrderRecord>(&format!(
            "UPDATE orders \
             SET status = $3, settled_at = COALESCE($4, settled_at) \
             WHERE order_id = $1 AND status = $2 \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(cmd.order_id)
        .bind(cmd.expected)
        .bind(cmd.new)
        .bind(settled_at)
        .fetch_optional(&self.pool)
        .await
    }
}
