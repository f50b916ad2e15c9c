use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use kerbside_core::repository::PaymentRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::{Payment, PaymentMethod, PaymentStatus};

pub struct StorePaymentRepository {
    pool: Pool<Sqlite>,
}

impl StorePaymentRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    session_id: String,
    amount: f64,
    method: String,
    transaction_ref: String,
    timestamp: DateTime<Utc>,
    status: String,
}

impl PaymentRow {
    fn into_model(self) -> CoreResult<Payment> {
        Ok(Payment {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            session_id: Uuid::parse_str(&self.session_id).map_err(CoreError::storage)?,
            amount: self.amount,
            method: PaymentMethod::parse(&self.method)
                .ok_or_else(|| CoreError::Storage(format!("bad payment method: {}", self.method)))?,
            transaction_ref: self.transaction_ref,
            timestamp: self.timestamp,
            status: PaymentStatus::parse(&self.status)
                .ok_or_else(|| CoreError::Storage(format!("bad payment status: {}", self.status)))?,
        })
    }
}

#[async_trait]
impl PaymentRepository for StorePaymentRepository {
    async fn create(&self, payment: &Payment) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO payments (id, session_id, amount, method, transaction_ref, timestamp, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.id.to_string())
        .bind(payment.session_id.to_string())
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(&payment.transaction_ref)
        .bind(payment.timestamp)
        .bind(payment.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        Ok(())
    }

    async fn list_by_session(&self, session_id: Uuid) -> CoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, session_id, amount, method, transaction_ref, timestamp, status \
             FROM payments WHERE session_id = ? ORDER BY timestamp DESC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(PaymentRow::into_model).collect()
    }
}
