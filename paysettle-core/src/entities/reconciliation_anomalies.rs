use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;

/// Why a notification could not be applied to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "anomaly_kind")]
pub enum AnomalyKind {
    SignatureMismatch,
    SourceNotAllowed,
    MalformedNotification,
    MerchantMismatch,
    UnknownReference,
    AmountMismatch,
    UnknownOutcome,
    UnexpectedState,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyKind::SignatureMismatch => "signature_mismatch",
            AnomalyKind::SourceNotAllowed => "source_not_allowed",
            AnomalyKind::MalformedNotification => "malformed_notification",
            AnomalyKind::MerchantMismatch => "merchant_mismatch",
            AnomalyKind::UnknownReference => "unknown_reference",
            AnomalyKind::AmountMismatch => "amount_mismatch",
            AnomalyKind::UnknownOutcome => "unknown_outcome",
            AnomalyKind::UnexpectedState => "unexpected_state",
        };
        f.write_str(s)
    }
}

/// An audit row kept for manual review.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ReconciliationAnomaly {
    pub id: i64,
    pub kind: AnomalyKind,
    pub payment_reference: Option<String>,
    pub detail: String,
    pub created_at: time::OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnomaly {
    pub kind: AnomalyKind,
    pub payment_reference: Option<String>,
    pub detail: String,
}

impl NewAnomaly {
    pub fn new(
        kind: AnomalyKind,
        payment_reference: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            payment_reference: payment_reference.map(str::to_owned),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertReconciliationAnomaly {
    pub anomaly: NewAnomaly,
}

impl Processor<InsertReconciliationAnomaly> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertReconciliationAnomaly")]
    async fn process(&self, insert: InsertReconciliationAnomaly) -> Result<i64, sqlx::Error> {
        let NewAnomaly {
            kind,
            payment_reference,
            detail,
        } = insert.anomaly;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reconciliation_anomalies (kind, payment_reference, detail)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(kind)
        .bind(payment_reference)
        .bind(detail)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }
}

#[derive(Debug, Clone)]
/// Most recent anomalies first.
pub struct ListReconciliationAnomalies {
    pub limit: i64,
}

impl Processor<ListReconciliationAnomalies> for DatabaseProcessor {
    type Output = Vec<ReconciliationAnomaly>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListReconciliationAnomalies")]
    async fn process(
        &self,
        query: ListReconciliationAnomalies,
    ) -> Result<Vec<ReconciliationAnomaly>, sqlx::Error> {
        sqlx::query_as::<_, ReconciliationAnomaly>(
            r#"
            SELECT id, kind, payment_reference, detail, created_at
            FROM reconciliation_anomalies
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}
