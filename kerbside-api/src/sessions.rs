use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kerbside_billing::CouponValidation;
use kerbside_core::repository::CouponRepository;
use kerbside_shared::models::{Coupon, Session};

use crate::{error::AppError, middleware::auth::CustomerClaims, state::AppState};

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    facility_id: Uuid,
    spot_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeeQuery {
    coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
struct FeeResponse {
    session_id: Uuid,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ApplyCouponRequest {
    code: String,
}

#[derive(Debug, Serialize)]
struct CouponOutcome {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon: Option<Coupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<CouponValidation> for CouponOutcome {
    fn from(validation: CouponValidation) -> Self {
        match validation {
            CouponValidation::Valid(coupon) => CouponOutcome {
                valid: true,
                coupon: Some(coupon),
                reason: None,
            },
            CouponValidation::Invalid(reason) => CouponOutcome {
                valid: false,
                coupon: None,
                reason: Some(reason.to_string()),
            },
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions", post(start_session).get(session_history))
        .route("/v1/sessions/active", get(active_sessions))
        .route("/v1/sessions/{id}/end", post(end_session))
        .route("/v1/sessions/{id}/fee", get(session_fee))
        .route("/v1/sessions/{id}/coupon", post(apply_coupon))
}

/// The session must belong to the caller; spot labels are advisory only
async fn owned_session(
    state: &AppState,
    claims: &CustomerClaims,
    session_id: Uuid,
) -> Result<Session, AppError> {
    let session = state.sessions.get_session(session_id).await?;
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;
    if session.user_id != user_id {
        return Err(AppError::AuthorizationError(
            "session belongs to another user".to_string(),
        ));
    }
    Ok(session)
}

async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<Session>, AppError> {
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;

    let session = state
        .sessions
        .start_session(user_id, req.facility_id, req.spot_label)
        .await?;
    Ok(Json(session))
}

async fn end_session(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    owned_session(&state, &claims, id).await?;
    let session = state.sessions.end_session(id).await?;
    Ok(Json(session))
}

async fn active_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<Session>>, AppError> {
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;
    Ok(Json(state.sessions.active_sessions(user_id).await?))
}

async fn session_history(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
) -> Result<Json<Vec<Session>>, AppError> {
    let user_id = claims
        .user_id()
        .map_err(|_| AppError::AuthenticationError("bad subject claim".to_string()))?;
    Ok(Json(state.sessions.session_history(user_id).await?))
}

/// Quote the fee owed right now. An optional coupon code is resolved to its
/// id here; validity and facility scope are the fee engine's business.
async fn session_fee(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
    Query(query): Query<FeeQuery>,
) -> Result<Json<FeeResponse>, AppError> {
    owned_session(&state, &claims, id).await?;

    let coupon_id = match query.coupon_code.as_deref() {
        Some(code) => state
            .store
            .coupons
            .get_by_code(code)
            .await?
            .map(|coupon| coupon.id),
        None => None,
    };

    let amount = state.fees.calculate_fee(id, coupon_id).await?;
    Ok(Json(FeeResponse {
        session_id: id,
        amount,
    }))
}

async fn apply_coupon(
    State(state): State<AppState>,
    Extension(claims): Extension<CustomerClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<CouponOutcome>, AppError> {
    owned_session(&state, &claims, id).await?;
    let outcome = state.coupons.apply_to_session(id, &req.code).await?;
    Ok(Json(outcome.into()))
}
