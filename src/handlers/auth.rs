use std::sync::Arc;

use axum::{Extension, extract::State, http::HeaderMap};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::Json;
use crate::middleware::CurrentUser;
use crate::models::{
    LoginRequest, LoginResponse, NewSystemLog, RegisterCoachRequest, RegisterStudentRequest,
    UserResponse,
};
use crate::utils::ApiResult;

/// 学员注册
#[utoipa::path(
    post,
    path = "/api/v1/auth/register/student",
    request_body = RegisterStudentRequest,
    responses(
        (status = 200, description = "Student registered", body = LoginResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or phone already used")
    ),
    tag = "Authentication"
)]
pub async fn register_student(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterStudentRequest>,
) -> ApiResult<Json<LoginResponse>> {
    tracing::info!("Student registration attempt: {}", req.username);
    let resp = state.auth_service.register_student(req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(resp.user.id), "user_register", "学员注册")
                .target("user", resp.user.id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(resp))
}

/// 教练注册，需管理员审核
#[utoipa::path(
    post,
    path = "/api/v1/auth/register/coach",
    request_body = RegisterCoachRequest,
    responses(
        (status = 200, description = "Coach registered, pending approval", body = LoginResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or phone already used")
    ),
    tag = "Authentication"
)]
pub async fn register_coach(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterCoachRequest>,
) -> ApiResult<Json<LoginResponse>> {
    tracing::info!("Coach registration attempt: {}", req.username);
    let resp = state.auth_service.register_coach(req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(resp.user.id), "user_register", "教练注册")
                .target("user", resp.user.id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account disabled")
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    tracing::info!("Login attempt for user: {}", req.username);
    let resp = state.auth_service.login(req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(NewSystemLog::new(Some(resp.user.id), "user_login", "用户登录").client(ip, ua))
        .await;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<UserResponse>> {
    tracing::debug!("Fetching current user info for user_id: {}", user.user_id);
    Ok(Json(state.user_service.get_me(&user).await?))
}
