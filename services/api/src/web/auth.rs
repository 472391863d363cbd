//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout, plus the
//! caller's own profile and account.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use carelink_core::{ProfileDraft, SessionContext, UserProfile};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: i64,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub phone_number: String,
    pub is_caregiver: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: String,
    pub email: String,
    /// Also set as the `session` cookie; send it back as a Bearer token or cookie.
    pub id_token: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    pub role: String,
    pub caretakers_id: Vec<String>,
    pub caregivers_id: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserProfile> for ProfileResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            role: p.role().as_str().to_string(),
            user_id: p.user_id,
            email: p.email,
            first_name: p.first_name,
            last_name: p.last_name,
            age: p.age,
            sex: p.sex,
            phone_number: p.phone_number,
            caretakers_id: p.caretakers_id,
            caregivers_id: p.caregivers_id,
            created_at: p.created_at,
        }
    }
}

fn session_cookie(token: &str, days: i64) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        token,
        Duration::days(days).num_seconds()
    )
}

const CLEARED_COOKIE: &str = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request or weak password"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let draft = ProfileDraft {
        first_name: req.first_name,
        last_name: req.last_name,
        age: req.age,
        sex: req.sex,
        phone_number: req.phone_number,
        is_caregiver: req.is_caregiver,
    };
    let (ctx, _profile) = state
        .accounts
        .register(&req.email, &req.password, draft)
        .await?;

    let cookie = session_cookie(&ctx.id_token, state.config.auth_session_days);
    let response = AuthResponse {
        user_id: ctx.user_id,
        email: ctx.email,
        id_token: ctx.id_token,
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = state.accounts.login(&req.email, &req.password).await?;

    let cookie = session_cookie(&ctx.id_token, state.config.auth_session_days);
    let response = AuthResponse {
        user_id: ctx.user_id,
        email: ctx.email,
        id_token: ctx.id_token,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.logout(&ctx).await?;
    Ok((StatusCode::OK, [(header::SET_COOKIE, CLEARED_COOKIE)]))
}

/// GET /profile - The caller's own profile
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = state.accounts.profile(&ctx).await?;
    Ok(Json(profile.into()))
}

/// DELETE /account - Delete the caller's account and unlink every peer
#[utoipa::path(
    delete,
    path = "/account",
    responses(
        (status = 204, description = "Account deleted"),
        (status = 401, description = "No active session")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<SessionContext>,
) -> Result<impl IntoResponse, ApiError> {
    state.accounts.delete_account(&ctx).await?;
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, CLEARED_COOKIE)]))
}
