//! Service API handlers.
//!
//! These endpoints are called by the storefront backend and require
//! a signed body verified via the `Paysettle-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /orders`        – record a new pending order
//! - `POST /orders/status` – get an existing order
//! - `POST /checkout`      – record an order and initiate its payment
//! - `POST /anomalies`     – recent notifications parked for review

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use paysettle_core::entities::reconciliation_anomalies::ReconciliationAnomaly;
use paysettle_core::ledger::{LedgerError, NewOrder};
use paysettle_core::processors::InitiateError;
use paysettle_sdk::objects::{
    AnomalyResponse, CheckoutResponse, CreateOrderRequest, GetOrderRequest, ListAnomaliesRequest,
};

use crate::api::extractors::SignedBody;
use crate::state::AppState;

const DEFAULT_ANOMALY_LIMIT: u32 = 50;
const MAX_ANOMALY_LIMIT: u32 = 500;

/// Build the Service API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/status", post(get_order_status))
        .route("/checkout", post(checkout))
        .route("/anomalies", post(list_anomalies))
}

/// `POST /orders` — record a new pending order.
async fn create_order(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let record = state.ledger.create(NewOrder::from(payload)).await?;
    Ok((StatusCode::CREATED, Json(record.to_response())))
}

/// `POST /orders/status` — get an existing order.
async fn get_order_status(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<GetOrderRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let record = state.ledger.get(payload.order_id).await?;
    Ok(Json(record.to_response()))
}

/// `POST /checkout` — record an order and sign its gateway redirect.
///
/// The order is `awaiting_settlement` by the time the response is sent.
async fn checkout(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let record = state.ledger.create(NewOrder::from(payload)).await?;
    let callbacks = state
        .callbacks(&record.payment_reference)
        .map_err(ServiceApiError::Url)?;
    let redirect_page_url = state
        .pay_page_url(&record.payment_reference)
        .map_err(ServiceApiError::Url)?;

    let initiated = state.initiator.initiate(&record, &callbacks).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order: initiated.order.to_response(),
            redirect: initiated.redirect,
            redirect_page_url: redirect_page_url.into(),
        }),
    ))
}

/// `POST /anomalies` — most recent reconciliation anomalies, newest first.
async fn list_anomalies(
    State(state): State<AppState>,
    SignedBody(payload): SignedBody<ListAnomaliesRequest>,
) -> Result<impl IntoResponse, ServiceApiError> {
    let limit = payload
        .limit
        .unwrap_or(DEFAULT_ANOMALY_LIMIT)
        .min(MAX_ANOMALY_LIMIT);
    let anomalies = state.ledger.recent_anomalies(limit).await?;
    Ok(Json(
        anomalies.iter().map(to_anomaly_response).collect::<Vec<_>>(),
    ))
}

fn to_anomaly_response(anomaly: &ReconciliationAnomaly) -> AnomalyResponse {
    AnomalyResponse {
        id: anomaly.id,
        kind: anomaly.kind.to_string(),
        payment_reference: anomaly.payment_reference.clone(),
        detail: anomaly.detail.clone(),
        created_at: anomaly.created_at.unix_timestamp(),
    }
}

/// Errors that can occur in Service API handlers.
#[derive(Debug)]
enum ServiceApiError {
    Ledger(LedgerError),
    Initiate(InitiateError),
    /// A callback URL could not be built from `public_base_url`.
    Url(url::ParseError),
}

impl From<LedgerError> for ServiceApiError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<InitiateError> for ServiceApiError {
    fn from(e: InitiateError) -> Self {
        match e {
            InitiateError::Ledger(e) => Self::Ledger(e),
            other => Self::Initiate(other),
        }
    }
}

impl IntoResponse for ServiceApiError {
    fn into_response(self) -> Response {
        match self {
            ServiceApiError::Ledger(LedgerError::Validation(message)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, message).into_response()
            }
            ServiceApiError::Ledger(LedgerError::NotFound) => {
                (StatusCode::NOT_FOUND, "order not found").into_response()
            }
            ServiceApiError::Ledger(
                e @ (LedgerError::Conflict { .. } | LedgerError::InvalidTransition { .. }),
            ) => (StatusCode::CONFLICT, e.to_string()).into_response(),
            ServiceApiError::Initiate(e @ InitiateError::InvalidState(_)) => {
                (StatusCode::CONFLICT, e.to_string()).into_response()
            }
            ServiceApiError::Ledger(e) => {
                tracing::error!(error = %e, "Service API ledger error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ServiceApiError::Initiate(e) => {
                tracing::error!(error = %e, "Service API payment initiation error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ServiceApiError::Url(e) => {
                tracing::error!(error = %e, "Failed to build callback URL");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
