use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use kerbside_core::repository::CouponRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::Coupon;

pub struct StoreCouponRepository {
    pool: Pool<Sqlite>,
}

impl StoreCouponRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: String,
    code: String,
    discount_percentage: i32,
    expires_at: DateTime<Utc>,
    facility_id: Option<String>,
}

impl CouponRow {
    fn into_model(self) -> CoreResult<Coupon> {
        Ok(Coupon {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            code: self.code,
            discount_percentage: self.discount_percentage,
            expires_at: self.expires_at,
            facility_id: self
                .facility_id
                .map(|id| Uuid::parse_str(&id).map_err(CoreError::storage))
                .transpose()?,
        })
    }
}

const SELECT_COUPON: &str =
    "SELECT id, code, discount_percentage, expires_at, facility_id FROM coupons";

#[async_trait]
impl CouponRepository for StoreCouponRepository {
    async fn create(&self, coupon: &Coupon) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO coupons (id, code, discount_percentage, expires_at, facility_id) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(coupon.id.to_string())
        .bind(&coupon.code)
        .bind(coupon.discount_percentage)
        .bind(coupon.expires_at)
        .bind(coupon.facility_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => Err(
                CoreError::Validation(format!("coupon code already exists: {}", coupon.code)),
            ),
            Err(e) => Err(CoreError::storage(e)),
        }
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        row.map(CouponRow::into_model).transpose()
    }

    async fn get_by_code(&self, code: &str) -> CoreResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} WHERE code = ?"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        row.map(CouponRow::into_model).transpose()
    }

    async fn list_valid(&self, now: DateTime<Utc>) -> CoreResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "{SELECT_COUPON} WHERE expires_at > ? ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(CouponRow::into_model).collect()
    }

    async fn list_by_facility(&self, facility_id: Uuid) -> CoreResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "{SELECT_COUPON} WHERE facility_id = ? OR facility_id IS NULL ORDER BY expires_at"
        ))
        .bind(facility_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(CouponRow::into_model).collect()
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM coupons WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_code_lookup_is_case_sensitive() {
        let pool = memory_pool().await;
        let repo = StoreCouponRepository::new(pool);

        let coupon = Coupon::new(
            "SAVE10".to_string(),
            10,
            Utc::now() + Duration::days(7),
            None,
        );
        repo.create(&coupon).await.unwrap();

        assert!(repo.get_by_code("SAVE10").await.unwrap().is_some());
        assert!(repo.get_by_code("save10").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let pool = memory_pool().await;
        let repo = StoreCouponRepository::new(pool);

        let expiry = Utc::now() + Duration::days(7);
        repo.create(&Coupon::new("WEEKEND".to_string(), 15, expiry, None))
            .await
            .unwrap();
        let err = repo
            .create(&Coupon::new("WEEKEND".to_string(), 20, expiry, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_valid_excludes_expired() {
        let pool = memory_pool().await;
        let repo = StoreCouponRepository::new(pool);

        repo.create(&Coupon::new(
            "FRESH".to_string(),
            10,
            Utc::now() + Duration::days(1),
            None,
        ))
        .await
        .unwrap();
        repo.create(&Coupon::new(
            "STALE".to_string(),
            10,
            Utc::now() - Duration::days(1),
            None,
        ))
        .await
        .unwrap();

        let valid = repo.list_valid(Utc::now()).await.unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].code, "FRESH");
    }

    #[tokio::test]
    async fn test_list_by_facility_includes_unrestricted() {
        let pool = memory_pool().await;
        let repo = StoreCouponRepository::new(pool);

        let facility_id = Uuid::new_v4();
        let expiry = Utc::now() + Duration::days(1);
        repo.create(&Coupon::new("HERE".to_string(), 10, expiry, Some(facility_id)))
            .await
            .unwrap();
        repo.create(&Coupon::new(
            "ELSEWHERE".to_string(),
            10,
            expiry,
            Some(Uuid::new_v4()),
        ))
        .await
        .unwrap();
        repo.create(&Coupon::new("ANYWHERE".to_string(), 10, expiry, None))
            .await
            .unwrap();

        let codes: Vec<String> = repo
            .list_by_facility(facility_id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes.len(), 2);
        assert!(codes.contains(&"HERE".to_string()));
        assert!(codes.contains(&"ANYWHERE".to_string()));
    }
}
