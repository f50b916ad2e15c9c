use axum::{extract::State, routing::post, Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kerbside_core::identity::{IdentityProvider, NewUserProfile};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct SignUpRequest {
    name: String,
    email: String,
    phone: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    user_id: Uuid,
    token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        .route("/signout", post(sign_out))
}

fn issue_token(state: &AppState, user_id: Uuid, email: &str) -> Result<String, AppError> {
    let claims = crate::middleware::auth::CustomerClaims {
        sub: user_id.to_string(),
        email: email.to_owned(),
        role: "CUSTOMER".to_owned(),
        exp: (Utc::now() + Duration::seconds(state.auth.expiration as i64)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.auth.secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let profile = NewUserProfile {
        name: req.name,
        email: req.email.clone(),
        phone: req.phone,
    };

    let user_id = state.identity.sign_up(&req.password, &profile).await?;
    let token = issue_token(&state, user_id, &req.email)?;

    Ok(Json(AuthResponse { user_id, token }))
}

async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user_id = state
        .identity
        .sign_in(&req.email, &req.password)
        .await
        .map_err(|_| AppError::AuthenticationError("invalid email or password".to_string()))?;
    let token = issue_token(&state, user_id, &req.email)?;

    Ok(Json(AuthResponse { user_id, token }))
}

async fn sign_out(State(state): State<AppState>) -> Json<serde_json::Value> {
    // Bearer tokens are discarded client-side; this clears the provider's
    // device-local session.
    state.identity.sign_out().await;
    Json(serde_json::json!({ "status": "signed out" }))
}
