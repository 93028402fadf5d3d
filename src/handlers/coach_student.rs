use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::{Json, Path};
use crate::middleware::CurrentUser;
use crate::models::{
    ApplyCoachRequest, ApproveRelationRequest, ChangeCoachRequest, NewSystemLog, RelationDetail,
};
use crate::utils::ApiResult;

/// 学员申请教练
#[utoipa::path(
    post,
    path = "/api/v1/coach-students/apply",
    request_body = ApplyCoachRequest,
    responses(
        (status = 200, description = "Application created", body = RelationDetail),
        (status = 400, description = "Capacity reached"),
        (status = 409, description = "Relation already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn apply(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<ApplyCoachRequest>,
) -> ApiResult<Json<RelationDetail>> {
    let relation = state.coach_student_service.apply(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "relation_apply",
                format!("申请教练 {}", relation.coach_name),
            )
            .target("coach_student", relation.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(relation))
}

#[utoipa::path(
    put,
    path = "/api/v1/coach-students/{id}/approve",
    params(("id" = i64, Path, description = "Relation ID")),
    request_body = ApproveRelationRequest,
    responses(
        (status = 200, description = "Relation answered", body = RelationDetail),
        (status = 400, description = "Not pending or capacity reached"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ApproveRelationRequest>,
) -> ApiResult<Json<RelationDetail>> {
    let approved = req.approved;
    let relation = state.coach_student_service.approve(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    let action = if approved { "relation_approve" } else { "relation_reject" };
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                action,
                format!("处理学员 {} 的双选申请", relation.student_name),
            )
            .target("coach_student", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(relation))
}

/// 学员更换教练
#[utoipa::path(
    post,
    path = "/api/v1/coach-students/change",
    request_body = ChangeCoachRequest,
    responses(
        (status = 200, description = "Change requested", body = RelationDetail),
        (status = 400, description = "Old relation not active or new coach full"),
        (status = 409, description = "Relation with new coach already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn request_change(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<ChangeCoachRequest>,
) -> ApiResult<Json<RelationDetail>> {
    let relation = state.coach_student_service.request_change(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "relation_change",
                format!("申请更换教练为 {}", relation.coach_name),
            )
            .target("coach_student", relation.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(relation))
}

#[utoipa::path(
    get,
    path = "/api/v1/coach-students/pending",
    responses((status = 200, description = "Relations waiting for an answer", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn pending_approvals(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.coach_student_service.pending_approvals(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coach-students/student/{student_id}",
    params(("student_id" = i64, Path, description = "Student ID")),
    responses((status = 200, description = "Relations of the student", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn list_for_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(student_id): Path<i64>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.coach_student_service.list_for_student(&user, student_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coach-students/coach/{coach_id}",
    params(("coach_id" = i64, Path, description = "Coach ID")),
    responses((status = 200, description = "Relations of the coach", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn list_for_coach(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(coach_id): Path<i64>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.coach_student_service.list_for_coach(&user, coach_id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/coach-students/{id}",
    params(("id" = i64, Path, description = "Relation ID")),
    responses(
        (status = 200, description = "Relation removed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Relation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Coach-Student"
)]
pub async fn delete_relation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.coach_student_service.delete(&user, id).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "relation_delete", "解除双选关系")
                .target("coach_student", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(()))
}
