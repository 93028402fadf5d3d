use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
};

use crate::AppState;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{
    CreateEvaluationRequest, Evaluation, EvaluationStatistics, Pagination, PendingEvaluation,
    UpdateEvaluationRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/evaluations",
    request_body = CreateEvaluationRequest,
    responses(
        (status = 200, description = "Evaluation created", body = Evaluation),
        (status = 403, description = "Not a participant of the course"),
        (status = 409, description = "Already evaluated")
    ),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn create_evaluation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateEvaluationRequest>,
) -> ApiResult<Json<Evaluation>> {
    Ok(Json(state.evaluation_service.create(&user, req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/evaluations",
    params(Pagination),
    responses((status = 200, description = "Evaluations", body = Vec<Evaluation>)),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn list_evaluations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Evaluation>>> {
    Ok(Json(state.evaluation_service.list(&user, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/evaluations/pending",
    responses((status = 200, description = "Courses still to evaluate", body = Vec<PendingEvaluation>)),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn pending_evaluations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<Vec<PendingEvaluation>>> {
    Ok(Json(state.evaluation_service.pending(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/evaluations/statistics",
    responses((status = 200, description = "Statistics of the current evaluator", body = EvaluationStatistics)),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn evaluation_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<EvaluationStatistics>> {
    Ok(Json(state.evaluation_service.statistics(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/evaluations/course/{course_id}",
    params(("course_id" = i64, Path, description = "Course ID")),
    responses((status = 200, description = "Evaluations of the course", body = Vec<Evaluation>)),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn course_evaluations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<Vec<Evaluation>>> {
    Ok(Json(state.evaluation_service.for_course(&user, course_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/evaluations/{id}",
    params(("id" = i64, Path, description = "Evaluation ID")),
    responses(
        (status = 200, description = "Evaluation detail", body = Evaluation),
        (status = 404, description = "Evaluation not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn get_evaluation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Evaluation>> {
    Ok(Json(state.evaluation_service.get(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/evaluations/{id}",
    params(("id" = i64, Path, description = "Evaluation ID")),
    request_body = UpdateEvaluationRequest,
    responses((status = 200, description = "Evaluation updated", body = Evaluation)),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn update_evaluation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateEvaluationRequest>,
) -> ApiResult<Json<Evaluation>> {
    Ok(Json(state.evaluation_service.update(&user, id, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/evaluations/{id}",
    params(("id" = i64, Path, description = "Evaluation ID")),
    responses((status = 200, description = "Evaluation deleted")),
    security(("bearer_auth" = [])),
    tag = "Evaluations"
)]
pub async fn delete_evaluation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.evaluation_service.delete(&user, id).await?;
    Ok(Json(()))
}
