use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use kerbside_core::repository::UserRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::{PaymentMethod, SavedPaymentMethod, User};

pub struct StoreUserRepository {
    pool: Pool<Sqlite>,
}

impl StoreUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    phone: String,
}

impl UserRow {
    fn into_model(self) -> CoreResult<User> {
        Ok(User {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            name: self.name,
            email: self.email,
            phone: self.phone,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SavedMethodRow {
    id: String,
    user_id: String,
    method: String,
    is_default: bool,
    last_four: Option<String>,
    nickname: Option<String>,
}

impl SavedMethodRow {
    fn into_model(self) -> CoreResult<SavedPaymentMethod> {
        Ok(SavedPaymentMethod {
            id: Uuid::parse_str(&self.id).map_err(CoreError::storage)?,
            user_id: Uuid::parse_str(&self.user_id).map_err(CoreError::storage)?,
            method: PaymentMethod::parse(&self.method)
                .ok_or_else(|| CoreError::Storage(format!("bad payment method: {}", self.method)))?,
            is_default: self.is_default,
            last_four: self.last_four,
            nickname: self.nickname,
        })
    }
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    async fn create(&self, user: &User, password_hash: &str) -> CoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, phone, password_hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(password_hash)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => Err(
                CoreError::Validation(format!("email already registered: {}", user.email)),
            ),
            Err(e) => Err(CoreError::storage(e)),
        }
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, phone FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        row.map(UserRow::into_model).transpose()
    }

    async fn get_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, phone FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        row.map(UserRow::into_model).transpose()
    }

    async fn credentials_by_email(&self, email: &str) -> CoreResult<Option<(Uuid, String)>> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(CoreError::storage)?;

        row.map(|(id, hash)| {
            Uuid::parse_str(&id)
                .map(|id| (id, hash))
                .map_err(CoreError::storage)
        })
        .transpose()
    }

    async fn update(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query("UPDATE users SET name = ?, email = ?, phone = ? WHERE id = ?")
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("user", user.id));
        }
        Ok(())
    }

    async fn add_payment_method(&self, method: &SavedPaymentMethod) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;

        if method.is_default {
            sqlx::query("UPDATE saved_payment_methods SET is_default = 0 WHERE user_id = ?")
                .bind(method.user_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(CoreError::storage)?;
        }

        sqlx::query(
            "INSERT INTO saved_payment_methods (id, user_id, method, is_default, last_four, nickname) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(method.id.to_string())
        .bind(method.user_id.to_string())
        .bind(method.method.as_str())
        .bind(method.is_default)
        .bind(&method.last_four)
        .bind(&method.nickname)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::storage)?;

        tx.commit().await.map_err(CoreError::storage)?;
        Ok(())
    }

    async fn list_payment_methods(&self, user_id: Uuid) -> CoreResult<Vec<SavedPaymentMethod>> {
        let rows = sqlx::query_as::<_, SavedMethodRow>(
            "SELECT id, user_id, method, is_default, last_four, nickname \
             FROM saved_payment_methods WHERE user_id = ? ORDER BY is_default DESC, id",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::storage)?;

        rows.into_iter().map(SavedMethodRow::into_model).collect()
    }

    async fn set_default_method(&self, user_id: Uuid, method_id: Uuid) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(CoreError::storage)?;

        sqlx::query("UPDATE saved_payment_methods SET is_default = 0 WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(CoreError::storage)?;

        let result = sqlx::query(
            "UPDATE saved_payment_methods SET is_default = 1 WHERE id = ? AND user_id = ?",
        )
        .bind(method_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(CoreError::storage)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("saved payment method", method_id));
        }

        tx.commit().await.map_err(CoreError::storage)?;
        Ok(())
    }

    async fn remove_payment_method(&self, method_id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM saved_payment_methods WHERE id = ?")
            .bind(method_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(CoreError::storage)?;
        Ok(())
    }
}
