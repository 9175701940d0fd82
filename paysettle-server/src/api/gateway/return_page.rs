use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
};
use paysettle_core::entities::OrderStatus;
use paysettle_sdk::objects::format_amount;
use serde::Deserialize;

use super::{BuyerPageError, page};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct ReturnQuery {
    #[serde(rename = "ref")]
    payment_reference: String,
}

/// `GET /return?ref=…` — informational page after the hosted payment page.
///
/// The browser redirect proves nothing; only the notification settles the
/// order, so this page reports whatever the ledger says right now.
pub(super) async fn return_page(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Result<impl IntoResponse, BuyerPageError> {
    let order = state
        .ledger
        .find_by_payment_reference(&query.payment_reference)
        .await?;

    let amount = format_amount(order.total_amount);
    let (title, message) = match order.status {
        OrderStatus::Paid => (
            "Payment received",
            format!("Thank you. Your payment of {amount} has been confirmed."),
        ),
        OrderStatus::Failed => (
            "Payment failed",
            "The gateway reported that the payment did not go through.".to_string(),
        ),
        OrderStatus::Cancelled => (
            "Order cancelled",
            "This order was cancelled.".to_string(),
        ),
        OrderStatus::Pending | OrderStatus::AwaitingSettlement => (
            "Payment processing",
            format!(
                "We are waiting for the gateway to confirm your payment of {amount}. \
                 You can refresh this page."
            ),
        ),
    };
    Ok(Html(page::message_page(title, &message)))
}
