//! Authentication endpoints

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::staff::{Staff, StaffRole},
};

use super::{AuthenticatedStaff, ValidatedJson};

/// Login request
#[derive(Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    pub password: String,
}

/// Login response with JWT token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    pub staff: StaffInfo,
}

/// Public view of a staff account
#[derive(Serialize, ToSchema)]
pub struct StaffInfo {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub role: StaffRole,
}

impl From<Staff> for StaffInfo {
    fn from(staff: Staff) -> Self {
        Self {
            id: staff.id,
            username: staff.username,
            full_name: staff.full_name,
            role: staff.role,
        }
    }
}

/// Staff login
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, staff) = state
        .services
        .auth
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        staff: staff.into(),
    }))
}

/// Get current staff identity
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current staff member", body = StaffInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedStaff(claims): AuthenticatedStaff,
) -> AppResult<Json<StaffInfo>> {
    let staff = state.services.auth.current_staff(&claims).await?;
    Ok(Json(staff.into()))
}
