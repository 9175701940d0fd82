use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use paysettle_core::processors::ReconcileResult;
use paysettle_sdk::gateway::SIGNATURE_FIELD;
use std::collections::HashMap;

use crate::api::extractors::PeerAddr;
use crate::state::AppState;

/// `POST /itn` — apply a gateway settlement notification.
///
/// `200 OK` tells the gateway to stop redelivering. Untrusted notifications
/// get `400`; store failures get `500` so the gateway retries.
pub(super) async fn receive_notification(
    State(state): State<AppState>,
    PeerAddr(source): PeerAddr,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let Some(provided) = params.get(SIGNATURE_FIELD) else {
        tracing::warn!(source = ?source, "ITN without signature");
        return (StatusCode::BAD_REQUEST, "missing signature").into_response();
    };

    match state.reconciler.handle(&params, provided, source).await {
        Ok(ReconcileResult::Rejected(kind)) => {
            (StatusCode::BAD_REQUEST, kind.to_string()).into_response()
        }
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ITN processing failed, gateway will retry");
            (StatusCode::INTERNAL_SERVER_ERROR, "retry").into_response()
        }
    }
}
