use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
};

use crate::AppState;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{
    BulkNotificationRequest, CountResponse, CreateNotificationRequest, CreateTemplateRequest,
    Notification, NotificationQuery, NotificationSettings, NotificationStatistics,
    NotificationTemplate, SendTemplateRequest, UpdateSettingsRequest,
};
use crate::utils::{ApiResult, require_admin};

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 200, description = "Notification stored", body = Notification),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Recipient not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateNotificationRequest>,
) -> ApiResult<Json<Notification>> {
    require_admin(&user)?;
    Ok(Json(state.notification_service.create(Some(user.user_id), req).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/bulk",
    request_body = BulkNotificationRequest,
    responses(
        (status = 200, description = "Notifications stored", body = Vec<Notification>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn bulk_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<BulkNotificationRequest>,
) -> ApiResult<Json<Vec<Notification>>> {
    require_admin(&user)?;
    let sent = state.notification_service.bulk(user.user_id, req).await?;
    tracing::info!("User {} sent {} notifications in bulk", user.user_id, sent.len());
    Ok(Json(sent))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Own notifications, newest first", body = Vec<Notification>)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(state.notification_service.list(user.user_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/unread-count",
    responses((status = 200, description = "Unread notification count", body = CountResponse)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.notification_service.unread_count(user.user_id).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/read-all",
    responses((status = 200, description = "Number of notifications marked read", body = CountResponse)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<CountResponse>> {
    let count = state.notification_service.mark_all_read(user.user_id).await?;
    Ok(Json(CountResponse { count }))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/statistics",
    responses((status = 200, description = "Notification statistics", body = NotificationStatistics)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn notification_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<NotificationStatistics>> {
    Ok(Json(state.notification_service.statistics(user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/settings",
    responses((status = 200, description = "Notification settings", body = NotificationSettings)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<NotificationSettings>> {
    Ok(Json(state.notification_service.get_settings(user.user_id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/settings",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = NotificationSettings),
        (status = 400, description = "Quiet hours must be HH:MM")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<NotificationSettings>> {
    Ok(Json(state.notification_service.update_settings(user.user_id, req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/templates",
    responses((status = 200, description = "Active templates", body = Vec<NotificationTemplate>)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<NotificationTemplate>>> {
    Ok(Json(state.notification_service.templates().await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 200, description = "Template created", body = NotificationTemplate),
        (status = 409, description = "Template code already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateTemplateRequest>,
) -> ApiResult<Json<NotificationTemplate>> {
    require_admin(&user)?;
    Ok(Json(state.notification_service.create_template(req).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/templates/send",
    request_body = SendTemplateRequest,
    responses(
        (status = 200, description = "Notification rendered from template", body = Notification),
        (status = 404, description = "Template or recipient not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn send_from_template(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<SendTemplateRequest>,
) -> ApiResult<Json<Notification>> {
    require_admin(&user)?;
    Ok(Json(state.notification_service.send_from_template(user.user_id, req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/{id}",
    params(("id" = i64, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification", body = Notification),
        (status = 404, description = "Notification not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.notification_service.get(user.user_id, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}/read",
    params(("id" = i64, Path, description = "Notification ID")),
    responses((status = 200, description = "Notification marked read", body = Notification)),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.notification_service.mark_read(user.user_id, id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/notifications/{id}",
    params(("id" = i64, Path, description = "Notification ID")),
    responses((status = 200, description = "Notification deleted")),
    security(("bearer_auth" = [])),
    tag = "Notifications"
)]
pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.notification_service.delete(user.user_id, id).await?;
    Ok(Json(()))
}
