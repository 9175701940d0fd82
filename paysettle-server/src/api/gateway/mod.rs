//! Gateway-facing handlers.
//!
//! These endpoints are reached by the buyer's browser on its way to and back
//! from the hosted payment page, and by the gateway itself for settlement
//! notifications.
//!
//! # Endpoints
//!
//! - `GET  /pay/{payment_reference}` – auto-submitting form to the gateway
//! - `POST /itn`                     – Instant Transaction Notification
//! - `GET  /return?ref=…`            – buyer lands here after paying
//! - `GET  /cancel?ref=…&token=…`    – buyer abandoned the payment

use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use paysettle_core::ledger::LedgerError;
use paysettle_core::processors::InitiateError;

use crate::state::AppState;

mod cancel;
mod itn;
mod page;
mod pay;
mod return_page;

/// Build the gateway router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pay/{payment_reference}", get(pay::payment_page))
        .route("/itn", post(itn::receive_notification))
        .route("/return", get(return_page::return_page))
        .route("/cancel", get(cancel::cancel_payment))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors rendered to the buyer's browser as an HTML page.
#[derive(Debug)]
enum BuyerPageError {
    NotFound,
    /// The order cannot be paid (already settled or cancelled).
    NotPayable(String),
    InvalidToken,
    Internal(String),
}

impl From<LedgerError> for BuyerPageError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound => Self::NotFound,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<InitiateError> for BuyerPageError {
    fn from(e: InitiateError) -> Self {
        match e {
            InitiateError::InvalidState(status) => Self::NotPayable(status.to_string()),
            InitiateError::Ledger(e) => e.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<url::ParseError> for BuyerPageError {
    fn from(e: url::ParseError) -> Self {
        Self::Internal(format!("callback url: {e}"))
    }
}

impl IntoResponse for BuyerPageError {
    fn into_response(self) -> Response {
        let (status, title, message) = match self {
            BuyerPageError::NotFound => (
                StatusCode::NOT_FOUND,
                "Order not found",
                "We could not find a payment with this reference.".to_string(),
            ),
            BuyerPageError::NotPayable(status) => (
                StatusCode::CONFLICT,
                "Payment unavailable",
                format!("This order is {status} and cannot be paid again."),
            ),
            BuyerPageError::InvalidToken => (
                StatusCode::FORBIDDEN,
                "Link not valid",
                "This cancellation link is not valid.".to_string(),
            ),
            BuyerPageError::Internal(e) => {
                tracing::error!(error = %e, "Gateway page error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong",
                    "Please try again in a moment.".to_string(),
                )
            }
        };
        (status, Html(page::message_page(title, &message))).into_response()
    }
}
