use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use sqlx::{Pool, Sqlite};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use kerbside_core::repository::OccupancyRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::events::OccupancyUpdate;
use kerbside_shared::models::OccupancyStatus;

use crate::notifier::{Change, ChangeNotifier};

pub struct StoreOccupancyRepository {
    pool: Pool<Sqlite>,
    notifier: ChangeNotifier,
}

impl StoreOccupancyRepository {
    pub fn new(pool: Pool<Sqlite>, notifier: ChangeNotifier) -> Self {
        Self { pool, notifier }
    }
}

#[derive(sqlx::FromRow)]
struct OccupancyRow {
    facility_id: String,
    available_spots: i32,
    last_updated: DateTime<Utc>,
    version: i64,
}

impl OccupancyRow {
    fn into_model(self) -> CoreResult<OccupancyStatus> {
        Ok(OccupancyStatus {
            facility_id: Uuid::parse_str(&self.facility_id).map_err(CoreError::storage)?,
            available_spots: self.available_spots,
            last_updated: self.last_updated,
            version: self.version,
        })
    }
}

async fn fetch_status(
    pool: &Pool<Sqlite>,
    facility_id: Uuid,
) -> CoreResult<Option<OccupancyStatus>> {
    let row = sqlx::query_as::<_, OccupancyRow>(
        "SELECT facility_id, available_spots, last_updated, version \
         FROM occupancy_statuses WHERE facility_id = ?",
    )
    .bind(facility_id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(CoreError::storage)?;

    row.map(OccupancyRow::into_model).transpose()
}

#[async_trait]
impl OccupancyRepository for StoreOccupancyRepository {
    async fn get(&self, facility_id: Uuid) -> CoreResult<Option<OccupancyStatus>> {
        fetch_status(&self.pool, facility_id).await
    }

    async fn put(
        &self,
        status: &OccupancyStatus,
        expected_version: Option<i64>,
    ) -> CoreResult<OccupancyStatus> {
        let new_version = match expected_version {
            None => {
                let result = sqlx::query(
                    "INSERT INTO occupancy_statuses (facility_id, available_spots, last_updated, version) \
                     VALUES (?, ?, ?, 1)",
                )
                .bind(status.facility_id.to_string())
                .bind(status.available_spots)
                .bind(status.last_updated)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => 1,
                    Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                        return Err(CoreError::Conflict(format!(
                            "occupancy for {} already exists",
                            status.facility_id
                        )));
                    }
                    Err(e) => return Err(CoreError::storage(e)),
                }
            }
            Some(version) => {
                let result = sqlx::query(
                    "UPDATE occupancy_statuses \
                     SET available_spots = ?, last_updated = ?, version = version + 1 \
                     WHERE facility_id = ? AND version = ?",
                )
                .bind(status.available_spots)
                .bind(status.last_updated)
                .bind(status.facility_id.to_string())
                .bind(version)
                .execute(&self.pool)
                .await
                .map_err(CoreError::storage)?;

                if result.rows_affected() == 0 {
                    return Err(CoreError::Conflict(format!(
                        "occupancy for {} changed since read (expected version {})",
                        status.facility_id, version
                    )));
                }
                version + 1
            }
        };

        self.notifier.notify(Change::Occupancy(status.facility_id));

        Ok(OccupancyStatus {
            version: new_version,
            ..status.clone()
        })
    }

    async fn overwrite(&self, update: &OccupancyUpdate) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO occupancy_statuses (facility_id, available_spots, last_updated, version) \
             VALUES (?, ?, ?, 1) \
             ON CONFLICT(facility_id) DO UPDATE SET \
                 available_spots = excluded.available_spots, \
                 last_updated = excluded.last_updated, \
                 version = occupancy_statuses.version + 1",
        )
        .bind(update.facility_id.to_string())
        .bind(update.available_spots)
        .bind(update.last_updated)
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        self.notifier.notify(Change::Occupancy(update.facility_id));
        Ok(())
    }

    async fn observe(&self, facility_id: Uuid) -> BoxStream<'static, OccupancyStatus> {
        let rx = self.notifier.subscribe();
        let initial = fetch_status(&self.pool, facility_id).await.ok().flatten();

        let pool = self.pool.clone();
        let updates = BroadcastStream::new(rx).filter_map(move |change| {
            let pool = pool.clone();
            async move {
                match change {
                    Ok(Change::Occupancy(id)) if id == facility_id => {
                        fetch_status(&pool, facility_id).await.ok().flatten()
                    }
                    // Lagged receivers resynchronize on the next notification.
                    _ => None,
                }
            }
        });

        stream::iter(initial).chain(updates).boxed()
    }

    async fn observe_all(&self) -> BoxStream<'static, OccupancyStatus> {
        let rx = self.notifier.subscribe();

        let initial = sqlx::query_as::<_, OccupancyRow>(
            "SELECT facility_id, available_spots, last_updated, version FROM occupancy_statuses",
        )
        .fetch_all(&self.pool)
        .await
        .unwrap_or_default()
        .into_iter()
        .filter_map(|row| row.into_model().ok())
        .collect::<Vec<_>>();

        let pool = self.pool.clone();
        let updates = BroadcastStream::new(rx).filter_map(move |change| {
            let pool = pool.clone();
            async move {
                match change {
                    Ok(Change::Occupancy(id)) => fetch_status(&pool, id).await.ok().flatten(),
                    _ => None,
                }
            }
        });

        stream::iter(initial).chain(updates).boxed()
    }
}
