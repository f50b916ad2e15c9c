use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Profile fields collected at sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserProfile {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Authentication/identity seam. The core treats the returned id as opaque
/// and stable; everything else about the provider is an implementation
/// detail.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The device-local signed-in user, if any
    async fn current_user_id(&self) -> Option<Uuid>;

    async fn sign_in(&self, email: &str, password: &str) -> CoreResult<Uuid>;

    async fn sign_up(&self, password: &str, profile: &NewUserProfile) -> CoreResult<Uuid>;

    async fn sign_out(&self);
}
