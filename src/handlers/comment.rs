use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
};

use crate::AppState;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{CommentDetail, CreateCommentRequest, Pagination, UpdateCommentRequest};
use crate::utils::ApiResult;

#[utoipa::path(
    post,
    path = "/api/v1/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 200, description = "Comment created", body = CommentDetail),
        (status = 403, description = "Only the booking's student may comment"),
        (status = 409, description = "Booking already commented")
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<Json<CommentDetail>> {
    Ok(Json(state.comment_service.create(&user, req).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/my",
    params(Pagination),
    responses((status = 200, description = "Comments written or received", body = Vec<CommentDetail>)),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn my_comments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<CommentDetail>>> {
    Ok(Json(state.comment_service.my_comments(&user, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/booking/{booking_id}",
    params(("booking_id" = i64, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Comment of the booking", body = CommentDetail),
        (status = 404, description = "No comment yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn by_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(booking_id): Path<i64>,
) -> ApiResult<Json<CommentDetail>> {
    Ok(Json(state.comment_service.by_booking(&user, booking_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/coach/{coach_id}",
    params(("coach_id" = i64, Path, description = "Coach ID"), Pagination),
    responses((status = 200, description = "Comments received by the coach", body = Vec<CommentDetail>)),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn by_coach(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(coach_id): Path<i64>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<CommentDetail>>> {
    Ok(Json(state.comment_service.by_coach(&user, coach_id, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/student/{student_id}",
    params(("student_id" = i64, Path, description = "Student ID"), Pagination),
    responses((status = 200, description = "Comments written by the student", body = Vec<CommentDetail>)),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn by_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(student_id): Path<i64>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<CommentDetail>>> {
    Ok(Json(state.comment_service.by_student(&user, student_id, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Comment detail", body = CommentDetail),
        (status = 404, description = "Comment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn get_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommentDetail>> {
    Ok(Json(state.comment_service.get(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Comment updated", body = CommentDetail),
        (status = 400, description = "Edit window closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateCommentRequest>,
) -> ApiResult<Json<CommentDetail>> {
    Ok(Json(state.comment_service.update(&user, id, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses((status = 200, description = "Comment deleted")),
    security(("bearer_auth" = [])),
    tag = "Comments"
)]
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<()>> {
    state.comment_service.delete(&user, id).await?;
    Ok(Json(()))
}
