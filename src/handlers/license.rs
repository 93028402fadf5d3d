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
    CreateLicenseRequest, DeactivateLicenseRequest, HeartbeatRequest, HeartbeatResponse, License,
    LicenseActivation, LicenseQuery, LicenseStatistics, LicenseValidation, NewSystemLog,
    RenewLicenseRequest, UpdateLicenseRequest, ValidateLicenseRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/licenses",
    request_body = CreateLicenseRequest,
    responses(
        (status = 200, description = "License issued", body = License),
        (status = 403, description = "Super admin only"),
        (status = 404, description = "Campus not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn create_license(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<CreateLicenseRequest>,
) -> ApiResult<Json<License>> {
    let license = state.license_service.create(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "license_create",
                format!("为 {} 签发授权", license.organization_name),
            )
            .target("license", license.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(license))
}

#[utoipa::path(
    get,
    path = "/api/v1/licenses",
    params(LicenseQuery),
    responses((status = 200, description = "Licenses", body = Vec<License>)),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn list_licenses(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<LicenseQuery>,
) -> ApiResult<Json<Vec<License>>> {
    Ok(Json(state.license_service.list(&user, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/licenses/statistics",
    responses((status = 200, description = "License statistics", body = LicenseStatistics)),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn license_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<LicenseStatistics>> {
    Ok(Json(state.license_service.statistics(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/licenses/key/{license_key}",
    params(("license_key" = String, Path, description = "License key")),
    responses(
        (status = 200, description = "License", body = License),
        (status = 404, description = "License not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn get_by_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(license_key): Path<String>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.license_service.get_by_key(&user, &license_key).await?))
}

/// 客户端校验授权，无需登录
#[utoipa::path(
    post,
    path = "/api/v1/licenses/validate",
    request_body = ValidateLicenseRequest,
    responses((status = 200, description = "Validation result", body = LicenseValidation)),
    tag = "Licenses"
)]
pub async fn validate_license(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ValidateLicenseRequest>,
) -> ApiResult<Json<LicenseValidation>> {
    let (ip, _) = client_meta(&headers);
    let result = state.license_service.validate(req, ip).await?;
    if !result.valid {
        tracing::warn!("License validation rejected: {}", result.message);
    }
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/v1/licenses/heartbeat",
    request_body = HeartbeatRequest,
    responses((status = 200, description = "Heartbeat acknowledged", body = HeartbeatResponse)),
    tag = "Licenses"
)]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<HeartbeatRequest>,
) -> ApiResult<Json<HeartbeatResponse>> {
    Ok(Json(state.license_service.heartbeat(req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/licenses/{id}",
    params(("id" = i64, Path, description = "License ID")),
    responses(
        (status = 200, description = "License", body = License),
        (status = 404, description = "License not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn get_license(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<License>> {
    Ok(Json(state.license_service.get(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/licenses/{id}",
    params(("id" = i64, Path, description = "License ID")),
    request_body = UpdateLicenseRequest,
    responses((status = 200, description = "License updated", body = License)),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn update_license(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLicenseRequest>,
) -> ApiResult<Json<License>> {
    let license = state.license_service.update(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "license_update", "更新授权")
                .target("license", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(license))
}

#[utoipa::path(
    get,
    path = "/api/v1/licenses/{id}/activations",
    params(("id" = i64, Path, description = "License ID")),
    responses((status = 200, description = "Activations of the license", body = Vec<LicenseActivation>)),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn activations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<LicenseActivation>>> {
    Ok(Json(state.license_service.activations(&user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/licenses/{id}/renew",
    params(("id" = i64, Path, description = "License ID")),
    request_body = RenewLicenseRequest,
    responses(
        (status = 200, description = "License renewed, fee payment pending", body = License),
        (status = 400, description = "Invalid number of months")
    ),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn renew_license(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RenewLicenseRequest>,
) -> ApiResult<Json<License>> {
    let license = state.license_service.renew(&user, id, req.extend_months).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "license_renew",
                format!("授权续期 {} 个月", req.extend_months),
            )
            .target("license", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(license))
}

#[utoipa::path(
    post,
    path = "/api/v1/licenses/{id}/deactivate",
    params(("id" = i64, Path, description = "License ID")),
    request_body = DeactivateLicenseRequest,
    responses(
        (status = 200, description = "Device deactivated"),
        (status = 404, description = "No active activation for the device")
    ),
    security(("bearer_auth" = [])),
    tag = "Licenses"
)]
pub async fn deactivate_license(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<DeactivateLicenseRequest>,
) -> ApiResult<Json<()>> {
    state
        .license_service
        .deactivate(&user, id, &req.hardware_fingerprint)
        .await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "license_deactivate", "解除设备激活")
                .target("license", id)
                .client(ip, ua)
                .extra(serde_json::json!({ "hardware_fingerprint": req.hardware_fingerprint })),
        )
        .await;
    Ok(Json(()))
}
