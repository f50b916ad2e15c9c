use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use uuid::Uuid;

use kerbside_shared::events::OccupancyUpdate;
use kerbside_shared::models::{
    Coupon, Facility, FacilityCategory, OccupancyStatus, Payment, PaymentStatus, SavedPaymentMethod,
    Session, User,
};

use crate::CoreResult;

/// Repository trait for facility records (administrative CRUD)
#[async_trait]
pub trait FacilityRepository: Send + Sync {
    async fn create(&self, facility: &Facility) -> CoreResult<()>;

    /// `Ok(None)` on a missing id; callers that require presence map it to
    /// `CoreError::NotFound`
    async fn get(&self, id: Uuid) -> CoreResult<Option<Facility>>;

    async fn list(&self) -> CoreResult<Vec<Facility>>;

    async fn list_by_category(&self, category: FacilityCategory) -> CoreResult<Vec<Facility>>;

    async fn update(&self, facility: &Facility) -> CoreResult<()>;

    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

/// Repository trait for the live occupancy record, one per facility id.
///
/// Two write paths with different concurrency rules: `put` is the local
/// session-driven path and is compare-and-swap guarded; `overwrite` is the
/// remote-wins path used by the sync bridge and applies unconditionally.
#[async_trait]
pub trait OccupancyRepository: Send + Sync {
    async fn get(&self, facility_id: Uuid) -> CoreResult<Option<OccupancyStatus>>;

    /// Insert when `expected_version` is `None`; otherwise update only if the
    /// stored version still matches, failing with `CoreError::Conflict` when
    /// another writer got there first. Returns the stored record with its new
    /// version.
    async fn put(
        &self,
        status: &OccupancyStatus,
        expected_version: Option<i64>,
    ) -> CoreResult<OccupancyStatus>;

    /// Unconditional upsert stamping `last_updated` from the remote payload
    async fn overwrite(&self, update: &OccupancyUpdate) -> CoreResult<()>;

    /// Continuous read: current value (when present) followed by every
    /// subsequent committed write for the facility
    async fn observe(&self, facility_id: Uuid) -> BoxStream<'static, OccupancyStatus>;

    /// Continuous read over all facilities
    async fn observe_all(&self) -> BoxStream<'static, OccupancyStatus>;
}

/// Repository trait for parking sessions. Sessions are never deleted in the
/// normal flow; mutations are field-level.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Session>>;

    /// Fails with `NotFound` when the session does not exist
    async fn set_exit_time(&self, id: Uuid, exit_time: DateTime<Utc>) -> CoreResult<Session>;

    async fn set_applied_coupon(&self, id: Uuid, coupon_id: Option<Uuid>) -> CoreResult<Session>;

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> CoreResult<()>;

    async fn list_by_user(&self, user_id: Uuid) -> CoreResult<Vec<Session>>;

    /// Active means the exit timestamp is absent
    async fn list_active_by_user(&self, user_id: Uuid) -> CoreResult<Vec<Session>>;

    /// Continuous read of the user's active sessions, re-emitted on every
    /// session write affecting that user
    async fn observe_active_by_user(&self, user_id: Uuid) -> BoxStream<'static, Vec<Session>>;
}

/// Repository trait for payment records (insert-only; a failed attempt is a
/// new record)
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: &Payment) -> CoreResult<()>;

    async fn list_by_session(&self, session_id: Uuid) -> CoreResult<Vec<Payment>>;
}

/// Repository trait for discount coupons
#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn create(&self, coupon: &Coupon) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<Coupon>>;

    /// Case-sensitive exact match on the code
    async fn get_by_code(&self, code: &str) -> CoreResult<Option<Coupon>>;

    async fn list_valid(&self, now: DateTime<Utc>) -> CoreResult<Vec<Coupon>>;

    async fn list_by_facility(&self, facility_id: Uuid) -> CoreResult<Vec<Coupon>>;

    async fn delete(&self, id: Uuid) -> CoreResult<()>;
}

/// Repository trait for users and their saved payment methods
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User, password_hash: &str) -> CoreResult<()>;

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> CoreResult<Option<User>>;

    /// Credential lookup for sign-in: user id and stored password hash
    async fn credentials_by_email(&self, email: &str) -> CoreResult<Option<(Uuid, String)>>;

    async fn update(&self, user: &User) -> CoreResult<()>;

    /// Inserting a default method clears the default flag on every other
    /// method of the same user (at most one default per user)
    async fn add_payment_method(&self, method: &SavedPaymentMethod) -> CoreResult<()>;

    async fn list_payment_methods(&self, user_id: Uuid) -> CoreResult<Vec<SavedPaymentMethod>>;

    async fn set_default_method(&self, user_id: Uuid, method_id: Uuid) -> CoreResult<()>;

    async fn remove_payment_method(&self, method_id: Uuid) -> CoreResult<()>;
}

/// A remote push that has not been acknowledged yet
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub update: OccupancyUpdate,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// Durable log of occupancy pushes awaiting remote acknowledgement.
/// Written before the push is attempted; rows are deleted on ack and left
/// behind for replay on failure.
#[async_trait]
pub trait OccupancyOutbox: Send + Sync {
    async fn enqueue(&self, update: &OccupancyUpdate) -> CoreResult<i64>;

    async fn list_pending(&self, limit: i64) -> CoreResult<Vec<OutboxEntry>>;

    async fn mark_attempt(&self, id: i64) -> CoreResult<()>;

    async fn delete(&self, id: i64) -> CoreResult<()>;
}
