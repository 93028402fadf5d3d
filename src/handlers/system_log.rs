use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{CleanupResult, DaysQuery, LogQuery, LogStatistics, Pagination, SystemLog};
use crate::utils::{
    ApiResult, campus_filter, check_campus_scope, require_admin, require_super_admin,
};

#[utoipa::path(
    get,
    path = "/api/v1/system-logs",
    params(LogQuery),
    responses(
        (status = 200, description = "Audit logs, newest first", body = Vec<SystemLog>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Vec<SystemLog>>> {
    require_admin(&user)?;
    let logs = state.system_log_service.get_logs(&query, campus_filter(&user)).await?;
    tracing::debug!("Listed {} system logs for user {}", logs.len(), user.user_id);
    Ok(Json(logs))
}

#[utoipa::path(
    get,
    path = "/api/v1/system-logs/campus/{campus_id}",
    params(("campus_id" = i64, Path, description = "Campus ID"), Pagination),
    responses((status = 200, description = "Logs of users in the campus", body = Vec<SystemLog>)),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn logs_by_campus(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(campus_id): Path<i64>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<SystemLog>>> {
    require_admin(&user)?;
    check_campus_scope(&user, Some(campus_id), "查看")?;
    Ok(Json(state.system_log_service.logs_by_campus(campus_id, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/system-logs/statistics",
    params(DaysQuery),
    responses((status = 200, description = "Log statistics", body = LogStatistics)),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn log_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<LogStatistics>> {
    require_admin(&user)?;
    let days = query.days.unwrap_or(7).clamp(1, 365);
    Ok(Json(state.system_log_service.statistics(days, campus_filter(&user)).await?))
}

/// 导出 CSV
#[utoipa::path(
    get,
    path = "/api/v1/system-logs/export",
    params(LogQuery),
    responses((status = 200, description = "CSV export", content_type = "text/csv", body = String)),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn export_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Response> {
    require_admin(&user)?;
    let csv = state.system_log_service.export_csv(&query, campus_filter(&user)).await?;
    tracing::info!("User {} exported system logs", user.user_id);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"system_logs.csv\""),
        ],
        csv,
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/api/v1/system-logs/cleanup",
    params(DaysQuery),
    responses(
        (status = 200, description = "Old logs deleted", body = CleanupResult),
        (status = 400, description = "Retention shorter than 30 days"),
        (status = 403, description = "Super admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn cleanup_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Query(query): Query<DaysQuery>,
) -> ApiResult<Json<CleanupResult>> {
    require_super_admin(&user)?;
    let days = query.days.unwrap_or(90);
    let (ip, _) = client_meta(&headers);
    tracing::warn!("User {} cleaning logs older than {} days from {:?}", user.user_id, days, ip);
    Ok(Json(state.system_log_service.cleanup(days, user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/system-logs/{id}",
    params(("id" = i64, Path, description = "Log ID")),
    responses(
        (status = 200, description = "Log entry", body = SystemLog),
        (status = 404, description = "Log not found")
    ),
    security(("bearer_auth" = [])),
    tag = "System Logs"
)]
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SystemLog>> {
    require_admin(&user)?;
    Ok(Json(state.system_log_service.get_log(id).await?))
}
