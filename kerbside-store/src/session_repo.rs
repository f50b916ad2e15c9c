use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use sqlx::{Pool, Sqlite};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use kerbside_core::repository::SessionRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::{PaymentStatus, Session};

use crate::notifier::{Change, ChangeNotifier};

pub struct StoreSessionRepository {
    pool: Pool<Sqlite>,
    notifier: ChangeNotifier,
}

impl StoreSessionRepository {
    pub fn new(pool: Pool<Sqlite>, notifier: ChangeNotifier) -> Self {
        Self { pool, notifier }
    }

    async fn require(&self, id: Uuid) -> CoreResult<Session> {
        fetch_session(&self.pool, id)
            .await?
            .ok_or_else(|| CoreError::not_found("session", id))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    facility_id: String,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
    payment_status: String,
    applied_coupon_id: Option<String>,
    spot_label: Option<String>,
}

impl SessionRow {
    fn into_model(self) -> CoreResult<Session> {
        Ok(Session {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            user_id: Uuid::parse_str(&self.user_id).map_err(CoreError::storage)?,
            facility_id: Uuid::parse_str(&self.facility_id).map_err(CoreError::storage)?,
            entry_time: self.entry_time,
            exit_time: self.exit_time,
            payment_status: PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
                CoreError::Storage(format!("bad payment status: {}", self.payment_status))
            })?,
            applied_coupon_id: self
                .applied_coupon_id
                .map(|id| Uuid::parse_str(&id).map_err(CoreError::storage))
                .transpose()?,
            spot_label: self.spot_label,
        })
    }
}

const SELECT_SESSION: &str = "SELECT id, user_id, facility_id, entry_time, exit_time, \
     payment_status, applied_coupon_id, spot_label FROM sessions";

async fn fetch_session(pool: &Pool<Sqlite>, id: Uuid) -> CoreResult<Option<Session>> {
    let row = sqlx::query_as::<_, SessionRow>(&format!("{SELECT_SESSION} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(CoreError::storage)?;

    row.map(SessionRow::into_model).transpose()
}

async fn fetch_active_by_user(pool: &Pool<Sqlite>, user_id: Uuid) -> CoreResult<Vec<Session>> {
    let rows = sqlx::query_as::<_, SessionRow>(&format!(
        "{SELECT_SESSION} WHERE user_id = ? AND exit_time IS NULL ORDER BY entry_time DESC"
    ))
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await
    .map_err(CoreError::storage)?;

    rows.into_iter().map(SessionRow::into_model).collect()
}

#[async_trait]
impl SessionRepository for StoreSessionRepository {
    async fn create(&self, session: &Session) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, facility_id, entry_time, exit_time, \
             payment_status, applied_coupon_id, spot_label) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.user_id.to_string())
        .bind(session.facility_id.to_string())
        .bind(session.entry_time)
        .bind(session.exit_time)
        .bind(session.payment_status.as_str())
        .bind(session.applied_coupon_id.map(|id| id.to_string()))
        .bind(&session.spot_label)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        self.notifier.notify(Change::SessionsOf(session.user_id));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Session>> {
        fetch_session(&self.pool, id).await
    }

    async fn set_exit_time(&self, id: Uuid, exit_time: DateTime<Utc>) -> CoreResult<Session> {
        let result = sqlx::query("UPDATE sessions SET exit_time = ? WHERE id = ?")
            .bind(exit_time)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("session", id));
        }

        let session = self.require(id).await?;
        self.notifier.notify(Change::SessionsOf(session.user_id));
        Ok(session)
    }

    async fn set_applied_coupon(&self, id: Uuid, coupon_id: Option<Uuid>) -> CoreResult<Session> {
        let result = sqlx::query("UPDATE sessions SET applied_coupon_id = ? WHERE id = ?")
            .bind(coupon_id.map(|c| c.to_string()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("session", id));
        }

        let session = self.require(id).await?;
        self.notifier.notify(Change::SessionsOf(session.user_id));
        Ok(session)
    }

    async fn set_payment_status(&self, id: Uuid, status: PaymentStatus) -> CoreResult<()> {
        let result = sqlx::query("UPDATE sessions SET payment_status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("session", id));
        }

        let session = self.require(id).await?;
        self.notifier.notify(Change::SessionsOf(session.user_id));
        Ok(())
    }

    async fn list_by_user(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "{SELECT_SESSION} WHERE user_id = ? ORDER BY entry_time DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(SessionRow::into_model).collect()
    }

    async fn list_active_by_user(&self, user_id: Uuid) -> CoreResult<Vec<Session>> {
        fetch_active_by_user(&self.pool, user_id).await
    }

    async fn observe_active_by_user(&self, user_id: Uuid) -> BoxStream<'static, Vec<Session>> {
        let rx = self.notifier.subscribe();
        let initial = fetch_active_by_user(&self.pool, user_id).await.ok();

        let pool = self.pool.clone();
        let updates = BroadcastStream::new(rx).filter_map(move |change| {
            let pool = pool.clone();
            async move {
                match change {
                    Ok(Change::SessionsOf(id)) if id == user_id => {
                        fetch_active_by_user(&pool, user_id).await.ok()
                    }
                    _ => None,
                }
            }
        });

        stream::iter(initial).chain(updates).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;

    #[tokio::test]
    async fn test_create_and_active_filter() {
        let pool = memory_pool().await;
        let repo = StoreSessionRepository::new(pool, ChangeNotifier::new());

        let user_id = Uuid::new_v4();
        let facility_id = Uuid::new_v4();

        let first = Session::start(user_id, facility_id, Some("B2-17".to_string()));
        let second = Session::start(user_id, facility_id, None);
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        assert_eq!(repo.list_active_by_user(user_id).await.unwrap().len(), 2);

        repo.set_exit_time(first.id, Utc::now()).await.unwrap();

        let active = repo.list_active_by_user(user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        // Ended sessions stay queryable.
        assert_eq!(repo.list_by_user(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_end_missing_session_is_not_found() {
        let pool = memory_pool().await;
        let repo = StoreSessionRepository::new(pool, ChangeNotifier::new());

        let err = repo
            .set_exit_time(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_applied_coupon_roundtrip() {
        let pool = memory_pool().await;
        let repo = StoreSessionRepository::new(pool, ChangeNotifier::new());

        let session = Session::start(Uuid::new_v4(), Uuid::new_v4(), None);
        repo.create(&session).await.unwrap();

        let coupon_id = Uuid::new_v4();
        let updated = repo
            .set_applied_coupon(session.id, Some(coupon_id))
            .await
            .unwrap();
        assert_eq!(updated.applied_coupon_id, Some(coupon_id));

        let cleared = repo.set_applied_coupon(session.id, None).await.unwrap();
        assert_eq!(cleared.applied_coupon_id, None);
    }

    #[tokio::test]
    async fn test_observe_active_sees_session_end() {
        let pool = memory_pool().await;
        let repo = StoreSessionRepository::new(pool, ChangeNotifier::new());

        let user_id = Uuid::new_v4();
        let session = Session::start(user_id, Uuid::new_v4(), None);
        repo.create(&session).await.unwrap();

        let mut stream = repo.observe_active_by_user(user_id).await;
        assert_eq!(stream.next().await.unwrap().len(), 1);

        repo.set_exit_time(session.id, Utc::now()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().len(), 0);
    }
}
