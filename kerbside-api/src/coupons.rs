use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kerbside_billing::CouponValidation;
use kerbside_shared::models::Coupon;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    code: String,
    facility_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon: Option<Coupon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/coupons/validate", get(validate_coupon))
}

async fn validate_coupon(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> Result<Json<ValidateResponse>, AppError> {
    let response = match state
        .coupons
        .validate_coupon(&query.code, query.facility_id)
        .await?
    {
        CouponValidation::Valid(coupon) => ValidateResponse {
            valid: true,
            coupon: Some(coupon),
            reason: None,
        },
        CouponValidation::Invalid(reason) => ValidateResponse {
            valid: false,
            coupon: None,
            reason: Some(reason.to_string()),
        },
    };

    Ok(Json(response))
}
