use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse},
};

use super::{BuyerPageError, page};
use crate::state::AppState;

/// `GET /pay/{payment_reference}` — send the buyer to the gateway.
///
/// Initiates a pending order, or re-renders the same signed form for one
/// already awaiting settlement (page reload, back button).
pub(super) async fn payment_page(
    State(state): State<AppState>,
    Path(payment_reference): Path<String>,
) -> Result<impl IntoResponse, BuyerPageError> {
    let order = state
        .ledger
        .find_by_payment_reference(&payment_reference)
        .await?;
    let callbacks = state.callbacks(&order.payment_reference)?;
    let initiated = state.initiator.initiate_or_resume(&order, &callbacks).await?;
    Ok(Html(page::redirect_page(&initiated.redirect)))
}
