pub mod order_records;
pub mod reconciliation_anomalies;

use paysettle_sdk::objects::OrderStatus as SdkOrderStatus;

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `paysettle_sdk::objects::OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "order_status")]
pub enum OrderStatus {
    Pending,
    AwaitingSettlement,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    /// `paid`, `failed` and `cancelled` are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine has an edge from `self` to `to`.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, AwaitingSettlement)
                | (AwaitingSettlement, Paid)
                | (AwaitingSettlement, Failed)
                | (Pending, Cancelled)
                | (AwaitingSettlement, Cancelled)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&SdkOrderStatus::from(*self), f)
    }
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Pending => SdkOrderStatus::Pending,
            OrderStatus::AwaitingSettlement => SdkOrderStatus::AwaitingSettlement,
            OrderStatus::Paid => SdkOrderStatus::Paid,
            OrderStatus::Failed => SdkOrderStatus::Failed,
            OrderStatus::Cancelled => SdkOrderStatus::Cancelled,
        }
    }
}

impl From<SdkOrderStatus> for OrderStatus {
    fn from(value: SdkOrderStatus) -> Self {
        match value {
            SdkOrderStatus::Pending => OrderStatus::Pending,
            SdkOrderStatus::AwaitingSettlement => OrderStatus::AwaitingSettlement,
            SdkOrderStatus::Paid => OrderStatus::Paid,
            SdkOrderStatus::Failed => OrderStatus::Failed,
            SdkOrderStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}
