use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{
    AdminCreateUserRequest, AdminUpdateUserRequest, ChangePasswordRequest, NewSystemLog,
    Pagination, UpdateMeRequest, UserResponse,
};
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses((status = 200, description = "Current user profile", body = UserResponse)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<UserResponse>> {
    Ok(Json(state.user_service.get_me(&user).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 409, description = "Phone already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<UserResponse>> {
    tracing::info!("User {} updating own profile", user.user_id);
    Ok(Json(state.user_service.update_me(&user, req).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Old password wrong or new password too weak")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<()>> {
    state.user_service.change_password(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(NewSystemLog::new(Some(user.user_id), "password_change", "修改密码").client(ip, ua))
        .await;
    Ok(Json(()))
}

/// 管理员创建账号
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = AdminCreateUserRequest,
    responses(
        (status = 200, description = "User created", body = UserResponse),
        (status = 403, description = "Not allowed to create this role"),
        (status = 409, description = "Username or phone already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<AdminCreateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let created = state.user_service.create_user(&user, req).await?;
    tracing::info!("User {} ({}) created by {}", created.username, created.id, user.user_id);

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "user_create", format!("创建用户 {}", created.username))
                .target("user", created.id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User detail", body = UserResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserResponse>> {
    tracing::debug!("Fetching user {} for user {}", id, user.user_id);
    Ok(Json(state.user_service.get_user(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    request_body = AdminUpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AdminUpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let updated = state.user_service.update_user(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "user_update", format!("更新用户 {}", updated.username))
                .target("user", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 400, description = "Cannot deactivate yourself"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.user_service.deactivate_user(&user, id).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "user_deactivate", "停用用户")
                .target("user", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(()))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/campus/{campus_id}",
    params(("campus_id" = i64, Path, description = "Campus ID"), Pagination),
    responses((status = 200, description = "Users of the campus", body = Vec<UserResponse>)),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_by_campus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(campus_id): Path<i64>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.user_service.list_by_campus(&user, campus_id, page).await?;
    tracing::debug!("Listed {} users of campus {} for {}", users.len(), campus_id, user.user_id);
    Ok(Json(users))
}
