use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kerbside_core::repository::{CouponRepository, SessionRepository};
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::Coupon;

/// Outcome of validating a coupon code
#[derive(Debug, Clone)]
pub enum CouponValidation {
    Valid(Coupon),
    Invalid(&'static str),
}

pub const REASON_NOT_FOUND: &str = "not found";
pub const REASON_EXPIRED: &str = "expired";
pub const REASON_WRONG_FACILITY: &str = "not applicable for this facility";

/// Coupon lookup, validation and application. Validation is the strict
/// surface (it names a reason); fee calculation degrades silently instead.
#[derive(Clone)]
pub struct CouponEngine {
    coupons: Arc<dyn CouponRepository>,
    sessions: Arc<dyn SessionRepository>,
}

impl CouponEngine {
    pub fn new(coupons: Arc<dyn CouponRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self { coupons, sessions }
    }

    /// Look up a coupon by exact code and check expiry and facility scope.
    /// A facility-restricted coupon only fails the check when a facility id
    /// is supplied and differs.
    pub async fn validate_coupon(
        &self,
        code: &str,
        facility_id: Option<Uuid>,
    ) -> CoreResult<CouponValidation> {
        let Some(coupon) = self.coupons.get_by_code(code).await? else {
            return Ok(CouponValidation::Invalid(REASON_NOT_FOUND));
        };

        if coupon.is_expired_at(Utc::now()) {
            return Ok(CouponValidation::Invalid(REASON_EXPIRED));
        }

        if let (Some(restriction), Some(facility_id)) = (coupon.facility_id, facility_id) {
            if restriction != facility_id {
                return Ok(CouponValidation::Invalid(REASON_WRONG_FACILITY));
            }
        }

        Ok(CouponValidation::Valid(coupon))
    }

    /// Validate a code against the session's facility and persist the coupon
    /// on the session when it passes. Returns the validation outcome either
    /// way; an invalid code changes nothing.
    pub async fn apply_to_session(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> CoreResult<CouponValidation> {
        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("session", session_id))?;

        let outcome = self
            .validate_coupon(code, Some(session.facility_id))
            .await?;

        if let CouponValidation::Valid(coupon) = &outcome {
            self.sessions
                .set_applied_coupon(session_id, Some(coupon.id))
                .await?;
            tracing::info!(%session_id, coupon_id = %coupon.id, "coupon applied to session");
        }

        Ok(outcome)
    }

    /// Discount an amount by an already-known coupon id. Degrades to the
    /// original amount when the coupon is missing or expired; never fails on
    /// coupon grounds.
    pub async fn apply_coupon_discount(&self, amount: f64, coupon_id: Uuid) -> CoreResult<f64> {
        let Some(coupon) = self.coupons.get(coupon_id).await? else {
            return Ok(amount);
        };
        if coupon.is_expired_at(Utc::now()) {
            return Ok(amount);
        }

        Ok(amount * (1.0 - coupon.discount_percentage as f64 / 100.0))
    }

    pub async fn create_coupon(
        &self,
        code: String,
        discount_percentage: i32,
        expires_at: DateTime<Utc>,
        facility_id: Option<Uuid>,
    ) -> CoreResult<Coupon> {
        if !(0..=100).contains(&discount_percentage) {
            return Err(CoreError::Validation(format!(
                "discount percentage out of range: {discount_percentage}"
            )));
        }

        let coupon = Coupon::new(code, discount_percentage, expires_at, facility_id);
        self.coupons.create(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete_coupon(&self, coupon_id: Uuid) -> CoreResult<()> {
        self.coupons.delete(coupon_id).await
    }

    pub async fn list_valid_coupons(&self) -> CoreResult<Vec<Coupon>> {
        self.coupons.list_valid(Utc::now()).await
    }

    pub async fn list_coupons_for_facility(&self, facility_id: Uuid) -> CoreResult<Vec<Coupon>> {
        self.coupons.list_by_facility(facility_id).await
    }
}
