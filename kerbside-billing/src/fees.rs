use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use kerbside_core::repository::{CouponRepository, FacilityRepository, SessionRepository};
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::Session;

const MILLIS_PER_HOUR: f64 = 1000.0 * 60.0 * 60.0;

/// Computes elapsed-time billing with coupon discounts applied in one place.
///
/// This is the single fee entry point; callers never discount on their own,
/// so a coupon can neither be applied twice nor silently skipped.
#[derive(Clone)]
pub struct FeeEngine {
    sessions: Arc<dyn SessionRepository>,
    facilities: Arc<dyn FacilityRepository>,
    coupons: Arc<dyn CouponRepository>,
}

impl FeeEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        facilities: Arc<dyn FacilityRepository>,
        coupons: Arc<dyn CouponRepository>,
    ) -> Self {
        Self {
            sessions,
            facilities,
            coupons,
        }
    }

    /// Fee owed for a session: duration in fractional hours times the
    /// facility's hourly rate, minus the coupon discount when one applies.
    ///
    /// The effective coupon is the explicit `coupon_id` when supplied, else
    /// the one stored on the session. A missing coupon, an expiry at or
    /// before now, or a facility restriction that does not match the
    /// session's facility all degrade to the undiscounted fee; no error is
    /// surfaced for them.
    pub async fn calculate_fee(&self, session_id: Uuid, coupon_id: Option<Uuid>) -> CoreResult<f64> {
        let session = self.session(session_id).await?;
        self.fee_for_session(&session, coupon_id, Utc::now()).await
    }

    pub(crate) async fn session(&self, session_id: Uuid) -> CoreResult<Session> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("session", session_id))
    }

    /// Same computation against a caller-supplied clock; the ticker calls
    /// this once a second with a session it already holds.
    pub(crate) async fn fee_for_session(
        &self,
        session: &Session,
        coupon_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> CoreResult<f64> {
        let facility = self
            .facilities
            .get(session.facility_id)
            .await?
            .ok_or_else(|| CoreError::not_found("facility", session.facility_id))?;

        let exit_time = session.exit_time.unwrap_or(now);
        let duration_hours =
            (exit_time - session.entry_time).num_milliseconds() as f64 / MILLIS_PER_HOUR;
        let base_fee = duration_hours * facility.hourly_rate;

        let Some(coupon_id) = coupon_id.or(session.applied_coupon_id) else {
            return Ok(base_fee);
        };
        let Some(coupon) = self.coupons.get(coupon_id).await? else {
            return Ok(base_fee);
        };
        if coupon.is_expired_at(now) {
            return Ok(base_fee);
        }
        if coupon.facility_id.is_some_and(|id| id != session.facility_id) {
            return Ok(base_fee);
        }

        Ok(base_fee * (1.0 - coupon.discount_percentage as f64 / 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kerbside_shared::models::{Coupon, Facility, FacilityCategory, PaymentStatus};
    use kerbside_store::Store;

    const EPS: f64 = 1e-9;

    async fn setup() -> (Store, FeeEngine) {
        let store = Store::in_memory().await.unwrap();
        let engine = FeeEngine::new(
            store.sessions.clone(),
            store.facilities.clone(),
            store.coupons.clone(),
        );
        (store, engine)
    }

    async fn seed_facility(store: &Store, hourly_rate: f64) -> Facility {
        let facility = Facility::new(
            "Harbour Park".to_string(),
            FacilityCategory::Park,
            "2 Quay Street".to_string(),
            80,
            hourly_rate,
            0.0,
            0.0,
        );
        store.facilities.create(&facility).await.unwrap();
        facility
    }

    async fn seed_session(
        store: &Store,
        facility_id: Uuid,
        entry_time: DateTime<Utc>,
        exit_time: Option<DateTime<Utc>>,
    ) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            facility_id,
            entry_time,
            exit_time,
            payment_status: PaymentStatus::Pending,
            applied_coupon_id: None,
            spot_label: None,
        };
        store.sessions.create(&session).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_base_fee_for_ninety_minutes_at_ten() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(3);
        let exit = entry + Duration::milliseconds(5_400_000);
        let session = seed_session(&store, facility.id, entry, Some(exit)).await;

        let fee = engine.calculate_fee(session.id, None).await.unwrap();
        assert!((fee - 15.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_valid_unrestricted_coupon_discounts() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(3);
        let exit = entry + Duration::milliseconds(5_400_000);
        let session = seed_session(&store, facility.id, entry, Some(exit)).await;

        let coupon = Coupon::new(
            "SAVE20".to_string(),
            20,
            Utc::now() + Duration::days(1),
            None,
        );
        store.coupons.create(&coupon).await.unwrap();

        let fee = engine
            .calculate_fee(session.id, Some(coupon.id))
            .await
            .unwrap();
        assert!((fee - 12.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_expired_coupon_is_ignored_without_error() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(3);
        let exit = entry + Duration::milliseconds(5_400_000);
        let session = seed_session(&store, facility.id, entry, Some(exit)).await;

        let coupon = Coupon::new(
            "LATE20".to_string(),
            20,
            Utc::now() - Duration::hours(1),
            None,
        );
        store.coupons.create(&coupon).await.unwrap();

        let fee = engine
            .calculate_fee(session.id, Some(coupon.id))
            .await
            .unwrap();
        assert!((fee - 15.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_coupon_for_other_facility_is_ignored() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(2);
        let session = seed_session(&store, facility.id, entry, Some(entry + Duration::hours(1))).await;

        let coupon = Coupon::new(
            "ELSEWHERE".to_string(),
            50,
            Utc::now() + Duration::days(1),
            Some(Uuid::new_v4()),
        );
        store.coupons.create(&coupon).await.unwrap();

        let fee = engine
            .calculate_fee(session.id, Some(coupon.id))
            .await
            .unwrap();
        assert!((fee - 10.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_fee_is_monotonic_in_duration() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 7.5).await;

        let entry = Utc::now() - Duration::hours(6);
        let session = seed_session(&store, facility.id, entry, Some(entry + Duration::hours(1))).await;
        let fee_one_hour = engine.calculate_fee(session.id, None).await.unwrap();

        store
            .sessions
            .set_exit_time(session.id, entry + Duration::hours(2))
            .await
            .unwrap();
        let fee_two_hours = engine.calculate_fee(session.id, None).await.unwrap();

        assert!(fee_two_hours >= fee_one_hour);
    }

    #[tokio::test]
    async fn test_coupon_application_is_idempotent_in_effect() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(3);
        let session = seed_session(&store, facility.id, entry, Some(entry + Duration::hours(2))).await;

        let coupon = Coupon::new(
            "TWICE".to_string(),
            25,
            Utc::now() + Duration::days(1),
            None,
        );
        store.coupons.create(&coupon).await.unwrap();

        let first = engine
            .calculate_fee(session.id, Some(coupon.id))
            .await
            .unwrap();
        let second = engine
            .calculate_fee(session.id, Some(coupon.id))
            .await
            .unwrap();
        assert!((first - second).abs() < EPS);
    }

    #[tokio::test]
    async fn test_session_coupon_used_when_none_supplied() {
        let (store, engine) = setup().await;
        let facility = seed_facility(&store, 10.0).await;

        let entry = Utc::now() - Duration::hours(2);
        let session = seed_session(&store, facility.id, entry, Some(entry + Duration::hours(1))).await;

        let coupon = Coupon::new(
            "ONFILE".to_string(),
            10,
            Utc::now() + Duration::days(1),
            None,
        );
        store.coupons.create(&coupon).await.unwrap();
        store
            .sessions
            .set_applied_coupon(session.id, Some(coupon.id))
            .await
            .unwrap();

        let fee = engine.calculate_fee(session.id, None).await.unwrap();
        assert!((fee - 9.0).abs() < EPS);
    }

    #[tokio::test]
    async fn test_missing_session_or_facility_is_not_found() {
        let (store, engine) = setup().await;

        let err = engine
            .calculate_fee(Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "session", .. }));

        // Session pointing at a facility that was deleted.
        let session = seed_session(&store, Uuid::new_v4(), Utc::now(), None).await;
        let err = engine.calculate_fee(session.id, None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { kind: "facility", .. }));
    }
}
