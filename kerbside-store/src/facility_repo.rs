use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use kerbside_core::repository::FacilityRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::{Facility, FacilityCategory};

pub struct StoreFacilityRepository {
    pool: Pool<Sqlite>,
}

impl StoreFacilityRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FacilityRow {
    id: String,
    name: String,
    category: String,
    address: String,
    total_spots: i32,
    hourly_rate: f64,
    latitude: f64,
    longitude: f64,
}

impl FacilityRow {
    fn into_model(self) -> CoreResult<Facility> {
        Ok(Facility {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            name: self.name,
            category: FacilityCategory::parse(&self.category)
                .ok_or_else(|| CoreError::Storage(format!("bad category: {}", self.category)))?,
            address: self.address,
            total_spots: self.total_spots,
            hourly_rate: self.hourly_rate,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

const SELECT_FACILITY: &str =
    "SELECT id, name, category, address, total_spots, hourly_rate, latitude, longitude FROM facilities";

#[async_trait]
impl FacilityRepository for StoreFacilityRepository {
    async fn create(&self, facility: &Facility) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO facilities (id, name, category, address, total_spots, hourly_rate, latitude, longitude) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(facility.id.to_string())
        .bind(&facility.name)
        .bind(facility.category.as_str())
        .bind(&facility.address)
        .bind(facility.total_spots)
        .bind(facility.hourly_rate)
        .bind(facility.latitude)
        .bind(facility.longitude)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Facility>> {
        let row = sqlx::query_as::<_, FacilityRow>(&format!("{SELECT_FACILITY} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        row.map(FacilityRow::into_model).transpose()
    }

    async fn list(&self) -> CoreResult<Vec<Facility>> {
        let rows = sqlx::query_as::<_, FacilityRow>(&format!("{SELECT_FACILITY} ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        rows.into_iter().map(FacilityRow::into_model).collect()
    }

    async fn list_by_category(&self, category: FacilityCategory) -> CoreResult<Vec<Facility>> {
        let rows = sqlx::query_as::<_, FacilityRow>(&format!(
            "{SELECT_FACILITY} WHERE category = ? ORDER BY name"
        ))
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(FacilityRow::into_model).collect()
    }

    async fn update(&self, facility: &Facility) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE facilities SET name = ?, category = ?, address = ?, total_spots = ?, \
             hourly_rate = ?, latitude = ?, longitude = ? WHERE id = ?",
        )
        .bind(&facility.name)
        .bind(facility.category.as_str())
        .bind(&facility.address)
        .bind(facility.total_spots)
        .bind(facility.hourly_rate)
        .bind(facility.latitude)
        .bind(facility.longitude)
        .bind(facility.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("facility", facility.id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM facilities WHERE id = ?")
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

    fn sample_facility(category: FacilityCategory) -> Facility {
        Facility::new(
            "Westgate Mall Parking".to_string(),
            category,
            "1 Mall Road".to_string(),
            120,
            2.5,
            -1.2674,
            36.8108,
        )
    }

    #[tokio::test]
    async fn test_facility_crud() {
        let pool = memory_pool().await;
        let repo = StoreFacilityRepository::new(pool);

        let mut facility = sample_facility(FacilityCategory::Mall);
        repo.create(&facility).await.unwrap();

        let fetched = repo.get(facility.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Westgate Mall Parking");
        assert_eq!(fetched.category, FacilityCategory::Mall);
        assert_eq!(fetched.total_spots, 120);

        facility.hourly_rate = 3.0;
        repo.update(&facility).await.unwrap();
        let fetched = repo.get(facility.id).await.unwrap().unwrap();
        assert!((fetched.hourly_rate - 3.0).abs() < f64::EPSILON);

        repo.delete(facility.id).await.unwrap();
        assert!(repo.get(facility.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_category() {
        let pool = memory_pool().await;
        let repo = StoreFacilityRepository::new(pool);

        repo.create(&sample_facility(FacilityCategory::Mall))
            .await
            .unwrap();
        repo.create(&sample_facility(FacilityCategory::Hospital))
            .await
            .unwrap();

        let malls = repo.list_by_category(FacilityCategory::Mall).await.unwrap();
        assert_eq!(malls.len(), 1);
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_none_not_default() {
        let pool = memory_pool().await;
        let repo = StoreFacilityRepository::new(pool);

        assert!(repo.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let pool = memory_pool().await;
        let repo = StoreFacilityRepository::new(pool);

        let err = repo
            .update(&sample_facility(FacilityCategory::Park))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
