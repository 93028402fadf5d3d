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
    AssignAdminRequest, Campus, CreateCampusRequest, NewSystemLog, Pagination, UpdateCampusRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/campus",
    request_body = CreateCampusRequest,
    responses(
        (status = 200, description = "Campus created", body = Campus),
        (status = 403, description = "Super admin only"),
        (status = 409, description = "Campus name already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn create_campus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<CreateCampusRequest>,
) -> ApiResult<Json<Campus>> {
    let campus = state.campus_service.create_campus(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "campus_create", format!("创建校区 {}", campus.name))
                .target("campus", campus.id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(campus))
}

#[utoipa::path(
    get,
    path = "/api/v1/campus",
    params(Pagination),
    responses((status = 200, description = "Active campuses", body = Vec<Campus>)),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn list_campuses(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Campus>>> {
    Ok(Json(state.campus_service.list_campuses(page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/campus/main",
    responses(
        (status = 200, description = "Main campus", body = Campus),
        (status = 404, description = "No main campus configured")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn get_main_campus(State(state): State<Arc<AppState>>) -> ApiResult<Json<Campus>> {
    Ok(Json(state.campus_service.get_main_campus().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/campus/{id}",
    params(("id" = i64, Path, description = "Campus ID")),
    responses(
        (status = 200, description = "Campus detail", body = Campus),
        (status = 404, description = "Campus not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn get_campus(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Campus>> {
    Ok(Json(state.campus_service.get_campus(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/campus/{id}",
    params(("id" = i64, Path, description = "Campus ID")),
    request_body = UpdateCampusRequest,
    responses(
        (status = 200, description = "Campus updated", body = Campus),
        (status = 404, description = "Campus not found"),
        (status = 409, description = "Campus name already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn update_campus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCampusRequest>,
) -> ApiResult<Json<Campus>> {
    let campus = state.campus_service.update_campus(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "campus_update", format!("更新校区 {}", campus.name))
                .target("campus", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(campus))
}

#[utoipa::path(
    delete,
    path = "/api/v1/campus/{id}",
    params(("id" = i64, Path, description = "Campus ID")),
    responses(
        (status = 200, description = "Campus deactivated"),
        (status = 400, description = "Campus still has active users"),
        (status = 404, description = "Campus not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn delete_campus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.campus_service.delete_campus(&user, id).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "campus_delete", "删除校区")
                .target("campus", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(()))
}

#[utoipa::path(
    put,
    path = "/api/v1/campus/{id}/admin",
    params(("id" = i64, Path, description = "Campus ID")),
    request_body = AssignAdminRequest,
    responses(
        (status = 200, description = "Campus admin assigned", body = Campus),
        (status = 404, description = "Campus or user not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Campus"
)]
pub async fn assign_admin(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<AssignAdminRequest>,
) -> ApiResult<Json<Campus>> {
    let campus = state.campus_service.assign_admin(&user, id, req.user_id).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "campus_assign_admin",
                format!("指定用户 {} 为校区 {} 管理员", req.user_id, campus.name),
            )
            .target("campus", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(campus))
}
