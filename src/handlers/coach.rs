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
    ApproveCoachRequest, AvailableCoachQuery, CoachDetail, CoachListQuery, CoachSearchQuery,
    CommentStatistics, EvaluationStatistics, NewSystemLog, RelationDetail, UpdateCoachRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/coaches",
    params(CoachListQuery),
    responses((status = 200, description = "Approved coaches", body = Vec<CoachDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn list_coaches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoachListQuery>,
) -> ApiResult<Json<Vec<CoachDetail>>> {
    let coaches = state.coach_service.list_coaches(&query).await?;
    tracing::debug!("Listed {} coaches", coaches.len());
    Ok(Json(coaches))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/search",
    params(CoachSearchQuery),
    responses((status = 200, description = "Matching coaches", body = Vec<CoachDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn search_coaches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CoachSearchQuery>,
) -> ApiResult<Json<Vec<CoachDetail>>> {
    Ok(Json(state.coach_service.search_coaches(&query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/pending",
    responses((status = 200, description = "Coaches waiting for approval", body = Vec<CoachDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn pending_coaches(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<CoachDetail>>> {
    Ok(Json(state.coach_service.pending_coaches(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/available",
    params(AvailableCoachQuery),
    responses((status = 200, description = "Coaches the current student can apply to", body = Vec<CoachDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn available_coaches(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<AvailableCoachQuery>,
) -> ApiResult<Json<Vec<CoachDetail>>> {
    Ok(Json(state.coach_service.available_coaches(&user, query.campus_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/me/students",
    responses((status = 200, description = "Active students of the current coach", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn my_students(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.coach_service.my_students(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/{id}",
    params(("id" = i64, Path, description = "Coach ID")),
    responses(
        (status = 200, description = "Coach detail", body = CoachDetail),
        (status = 404, description = "Coach not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn get_coach(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CoachDetail>> {
    Ok(Json(state.coach_service.get_coach(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/coaches/{id}",
    params(("id" = i64, Path, description = "Coach ID")),
    request_body = UpdateCoachRequest,
    responses(
        (status = 200, description = "Coach updated", body = CoachDetail),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Coach not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn update_coach(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCoachRequest>,
) -> ApiResult<Json<CoachDetail>> {
    let coach = state.coach_service.update_coach(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "coach_update", format!("更新教练 {}", coach.real_name))
                .target("coach", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(coach))
}

#[utoipa::path(
    put,
    path = "/api/v1/coaches/{id}/approve",
    params(("id" = i64, Path, description = "Coach ID")),
    request_body = ApproveCoachRequest,
    responses(
        (status = 200, description = "Coach approval recorded", body = CoachDetail),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Coach not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn approve_coach(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ApproveCoachRequest>,
) -> ApiResult<Json<CoachDetail>> {
    let coach = state.coach_service.approve_coach(&user, id, req.approved).await?;

    let (ip, ua) = client_meta(&headers);
    let verdict = if req.approved { "通过" } else { "拒绝" };
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "coach_approve",
                format!("{}教练 {} 的审核", verdict, coach.real_name),
            )
            .target("coach", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(coach))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/{id}/students",
    params(("id" = i64, Path, description = "Coach ID")),
    responses((status = 200, description = "Active students of the coach", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn coach_students(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.coach_service.coach_students(id).await?))
}

/// 学员对该教练课程的评价汇总
#[utoipa::path(
    get,
    path = "/api/v1/coaches/{id}/evaluation-summary",
    params(("id" = i64, Path, description = "Coach ID")),
    responses((status = 200, description = "Evaluation summary", body = EvaluationStatistics)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn evaluation_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<EvaluationStatistics>> {
    Ok(Json(state.evaluation_service.coach_summary(id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/coaches/{id}/comment-stats",
    params(("id" = i64, Path, description = "Coach ID")),
    responses((status = 200, description = "Comment statistics", body = CommentStatistics)),
    security(("bearer_auth" = [])),
    tag = "Coaches"
)]
pub async fn comment_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommentStatistics>> {
    Ok(Json(state.comment_service.coach_stats(id).await?))
}
