use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse},
};
use paysettle_core::entities::OrderStatus;
use paysettle_core::ledger::LedgerError;
use paysettle_sdk::signature::verify_reference;
use serde::Deserialize;

use super::{BuyerPageError, page};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct CancelQuery {
    #[serde(rename = "ref")]
    payment_reference: String,
    token: String,
}

/// `GET /cancel?ref=…&token=…` — the buyer backed out on the gateway page.
///
/// Cancels an order that has not settled yet. A settlement that already
/// happened wins over the cancellation.
pub(super) async fn cancel_payment(
    State(state): State<AppState>,
    Query(query): Query<CancelQuery>,
) -> Result<impl IntoResponse, BuyerPageError> {
    verify_reference(
        &query.payment_reference,
        &query.token,
        state.settlement.merchant.service_secret_bytes(),
    )
    .map_err(|_| BuyerPageError::InvalidToken)?;

    let order = state
        .ledger
        .find_by_payment_reference(&query.payment_reference)
        .await?;

    let status = if order.status.is_terminal() {
        order.status
    } else {
        match state
            .ledger
            .transition(order.order_id, order.status, OrderStatus::Cancelled)
            .await
        {
            Ok(cancelled) => {
                tracing::info!(
                    payment_reference = %cancelled.payment_reference,
                    "Order cancelled by buyer"
                );
                cancelled.status
            }
            Err(LedgerError::Conflict { actual, .. }) => actual,
            Err(e) => return Err(e.into()),
        }
    };

    let message = match status {
        OrderStatus::Cancelled => "Your order was cancelled. No payment was taken.",
        OrderStatus::Paid => "This order was already paid and cannot be cancelled.",
        _ => "This order can no longer be cancelled.",
    };
    Ok(Html(page::message_page("Order cancellation", message)))
}
