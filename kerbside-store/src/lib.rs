pub mod app_config;
pub mod coupon_repo;
pub mod database;
pub mod facility_repo;
pub mod identity;
pub mod notifier;
pub mod occupancy_repo;
pub mod outbox;
pub mod payment_repo;
pub mod session_repo;
pub mod user_repo;

use std::sync::Arc;

pub use database::DbClient;
pub use identity::StoreIdentityProvider;
pub use notifier::{Change, ChangeNotifier};

use kerbside_core::repository::{
    CouponRepository, FacilityRepository, OccupancyOutbox, OccupancyRepository, PaymentRepository,
    SessionRepository, UserRepository,
};

/// All repositories over one database, sharing one change notifier so that
/// every observer sees every committed write.
#[derive(Clone)]
pub struct Store {
    pub facilities: Arc<dyn FacilityRepository>,
    pub occupancy: Arc<dyn OccupancyRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub users: Arc<dyn UserRepository>,
    pub outbox: Arc<dyn OccupancyOutbox>,
}

impl Store {
    pub fn new(db: &DbClient) -> Self {
        let notifier = ChangeNotifier::new();
        Self {
            facilities: Arc::new(facility_repo::StoreFacilityRepository::new(db.pool.clone())),
            occupancy: Arc::new(occupancy_repo::StoreOccupancyRepository::new(
                db.pool.clone(),
                notifier.clone(),
            )),
            sessions: Arc::new(session_repo::StoreSessionRepository::new(
                db.pool.clone(),
                notifier.clone(),
            )),
            payments: Arc::new(payment_repo::StorePaymentRepository::new(db.pool.clone())),
            coupons: Arc::new(coupon_repo::StoreCouponRepository::new(db.pool.clone())),
            users: Arc::new(user_repo::StoreUserRepository::new(db.pool.clone())),
            outbox: Arc::new(outbox::StoreOccupancyOutbox::new(db.pool.clone())),
        }
    }

    /// Migrated in-memory store for tests and embedded demo runs
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let db = DbClient::new_in_memory().await?;
        db.migrate()
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;
        Ok(Self::new(&db))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::{Pool, Sqlite};

    use crate::database::DbClient;

    pub async fn memory_pool() -> Pool<Sqlite> {
        let db = DbClient::new_in_memory().await.expect("in-memory database");
        db.migrate().await.expect("migrations");
        db.pool
    }
}
