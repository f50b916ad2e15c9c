use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use kerbside_core::repository::{OccupancyOutbox, OutboxEntry};
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::events::OccupancyUpdate;

pub struct StoreOccupancyOutbox {
    pool: Pool<Sqlite>,
}

impl StoreOccupancyOutbox {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    payload: String,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl OutboxRow {
    fn into_entry(self) -> CoreResult<OutboxEntry> {
        let update: OccupancyUpdate =
            serde_json::from_str(&self.payload).map_err(CoreError::storage)?;
        Ok(OutboxEntry {
            id: self.id,
            update,
            attempts: self.attempts,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl OccupancyOutbox for StoreOccupancyOutbox {
    async fn enqueue(&self, update: &OccupancyUpdate) -> CoreResult<i64> {
        let payload = serde_json::to_string(update).map_err(CoreError::storage)?;

        let result = sqlx::query(
            "INSERT INTO occupancy_outbox (facility_id, payload, created_at) VALUES (?, ?, ?)",
        )
        .bind(update.facility_id.to_string())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        Ok(result.last_insert_rowid())
    }

    async fn list_pending(&self, limit: i64) -> CoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT id, payload, attempts, created_at FROM occupancy_outbox \
             ORDER BY id LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(OutboxRow::into_entry).collect()
    }

    async fn mark_attempt(&self, id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE occupancy_outbox SET attempts = attempts + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> CoreResult<()> {
        sqlx::query("DELETE FROM occupancy_outbox WHERE id = ?")
            .bind(id)
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
    use uuid::Uuid;

    #[tokio::test]
    async fn test_enqueue_list_delete() {
        let pool = memory_pool().await;
        let outbox = StoreOccupancyOutbox::new(pool);

        let update = OccupancyUpdate {
            facility_id: Uuid::new_v4(),
            available_spots: 7,
            last_updated: Utc::now(),
        };

        let id = outbox.enqueue(&update).await.unwrap();
        outbox.mark_attempt(id).await.unwrap();

        let pending = outbox.list_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].update.available_spots, 7);

        outbox.delete(id).await.unwrap();
        assert!(outbox.list_pending(10).await.unwrap().is_empty());
    }
}
