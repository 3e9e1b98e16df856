//! Authentication endpoints: register and login

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huddle_core::models::{LoginRequest, RegisterRequest, User};

use super::{AppResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email,
            display_name: user.display_name,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, token) = state
        .user_service
        .register(&req.email, &req.password, &req.display_name)
        .await?;

    Ok(Json(AuthResponse {
        user: user.into(),
        token,
    }))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, token) = state.user_service.login(&req.email, &req.password).await?;

    Ok(Json(AuthResponse {
        user: user.into(),
        token,
    }))
}
