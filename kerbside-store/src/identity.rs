use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use kerbside_core::identity::{IdentityProvider, NewUserProfile};
use kerbside_core::repository::UserRepository;
use kerbside_core::{CoreError, CoreResult};
use kerbside_shared::models::User;

/// Identity provider backed by the entity store's user table.
///
/// Carries a device-local "current user": sign-in/sign-up set it, sign-out
/// clears it. The HTTP layer uses bearer tokens instead and never touches
/// this state.
pub struct StoreIdentityProvider {
    users: Arc<dyn UserRepository>,
    current: RwLock<Option<Uuid>>,
}

impl StoreIdentityProvider {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self {
            users,
            current: RwLock::new(None),
        }
    }

    fn hash_password(password: &str) -> CoreResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| CoreError::Validation(format!("password hashing failed: {e}")))
    }

    fn verify_password(password: &str, stored_hash: &str) -> bool {
        PasswordHash::new(stored_hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl IdentityProvider for StoreIdentityProvider {
    async fn current_user_id(&self) -> Option<Uuid> {
        *self.current.read().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> CoreResult<Uuid> {
        let credentials = self.users.credentials_by_email(email).await?;

        // Same message for unknown email and bad password.
        let (user_id, hash) = credentials
            .ok_or_else(|| CoreError::Validation("invalid email or password".to_string()))?;
        if !Self::verify_password(password, &hash) {
            return Err(CoreError::Validation(
                "invalid email or password".to_string(),
            ));
        }

        *self.current.write().await = Some(user_id);
        tracing::info!(%user_id, "user signed in");
        Ok(user_id)
    }

    async fn sign_up(&self, password: &str, profile: &NewUserProfile) -> CoreResult<Uuid> {
        let user = User {
            id: Uuid::new_v4(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
        };

        let hash = Self::hash_password(password)?;
        self.users.create(&user, &hash).await?;

        *self.current.write().await = Some(user.id);
        tracing::info!(user_id = %user.id, "user signed up");
        Ok(user.id)
    }

    async fn sign_out(&self) {
        let mut current = self.current.write().await;
        if let Some(user_id) = current.take() {
            tracing::info!(%user_id, "user signed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_pool;
    use crate::user_repo::StoreUserRepository;

    fn profile() -> NewUserProfile {
        NewUserProfile {
            name: "Amina".to_string(),
            email: "amina@example.com".to_string(),
            phone: "+254700000001".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let pool = memory_pool().await;
        let users: Arc<dyn UserRepository> = Arc::new(StoreUserRepository::new(pool));
        let identity = StoreIdentityProvider::new(users);

        let id = identity.sign_up("hunter2hunter2", &profile()).await.unwrap();
        assert_eq!(identity.current_user_id().await, Some(id));

        identity.sign_out().await;
        assert_eq!(identity.current_user_id().await, None);

        let signed_in = identity
            .sign_in("amina@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert_eq!(signed_in, id);
    }

    #[tokio::test]
    async fn test_bad_password_rejected() {
        let pool = memory_pool().await;
        let users: Arc<dyn UserRepository> = Arc::new(StoreUserRepository::new(pool));
        let identity = StoreIdentityProvider::new(users);

        identity.sign_up("hunter2hunter2", &profile()).await.unwrap();
        identity.sign_out().await;

        let err = identity
            .sign_in("amina@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(identity.current_user_id().await, None);
    }
}
