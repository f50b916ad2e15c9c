use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use kerbside_shared::models::{Payment, PaymentMethod};

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

#[derive(Debug, Deserialize)]
struct RecordPaymentRequest {
    session_id: Uuid,
    method: PaymentMethod,
    /// Raw network response blob; accepted but not verified (simulated
    /// gateway)
    gateway_response: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(record_payment))
        .route("/v1/sessions/{id}/payments", get(session_payments))
}

/// The amount is always computed server-side from the session's elapsed time
/// and any coupon already on the session.
async fn record_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    let session = state.sessions.get_session(req.session_id).await?;
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;
    if session.user_id != user_id {
        return Err(AppError::AuthorizationError(
            "session belongs to another user".to_string(),
        ));
    }

    let amount = state.fees.calculate_fee(req.session_id, None).await?;
    let gateway_response = req.gateway_response.unwrap_or_default();

    let payment = match req.method {
        PaymentMethod::Mpesa => {
            state
                .recorder
                .record_mpesa_payment(req.session_id, amount, &gateway_response)
                .await?
        }
        PaymentMethod::Paypal => {
            state
                .recorder
                .record_paypal_payment(req.session_id, amount, &gateway_response)
                .await?
        }
    };

    Ok(Json(payment))
}

async fn session_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let session = state.sessions.get_session(id).await?;
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;
    if session.user_id != user_id {
        return Err(AppError::AuthorizationError(
            "session belongs to another user".to_string(),
        ));
    }

    Ok(Json(state.recorder.payments_for_session(id).await?))
}
