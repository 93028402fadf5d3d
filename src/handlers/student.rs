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
    Booking, BookingListQuery, CommentStatistics, NewSystemLog, RelationDetail, StudentBalance,
    StudentDetail, StudentListQuery, StudentProfile, UpdateStudentRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/students",
    params(StudentListQuery),
    responses(
        (status = 200, description = "Students", body = Vec<StudentDetail>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn list_students(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<StudentListQuery>,
) -> ApiResult<Json<Vec<StudentDetail>>> {
    let students = state.student_service.list_students(&user, &query).await?;
    tracing::debug!("Listed {} students for user {}", students.len(), user.user_id);
    Ok(Json(students))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/me",
    responses(
        (status = 200, description = "Current student profile with balance", body = StudentProfile),
        (status = 404, description = "Student profile not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<StudentProfile>> {
    Ok(Json(state.student_service.get_me(&user).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student ID")),
    responses(
        (status = 200, description = "Student detail", body = StudentDetail),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn get_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StudentDetail>> {
    Ok(Json(state.student_service.get_student(&user, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/students/{id}",
    params(("id" = i64, Path, description = "Student ID")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student updated", body = StudentDetail),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn update_student(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStudentRequest>,
) -> ApiResult<Json<StudentDetail>> {
    let student = state.student_service.update_student(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "student_update", format!("更新学员 {}", student.real_name))
                .target("student", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(student))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/coaches",
    params(("id" = i64, Path, description = "Student ID")),
    responses((status = 200, description = "Active coaches of the student", body = Vec<RelationDetail>)),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn student_coaches(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<RelationDetail>>> {
    Ok(Json(state.student_service.student_coaches(&user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/bookings",
    params(("id" = i64, Path, description = "Student ID"), BookingListQuery),
    responses((status = 200, description = "Bookings of the student", body = Vec<Booking>)),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn student_bookings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Query(query): Query<BookingListQuery>,
) -> ApiResult<Json<Vec<Booking>>> {
    Ok(Json(state.student_service.student_bookings(&user, id, query.status).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/balance",
    params(("id" = i64, Path, description = "Student ID")),
    responses(
        (status = 200, description = "Derived balance", body = StudentBalance),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn student_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StudentBalance>> {
    Ok(Json(state.student_service.student_balance(&user, id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/{id}/comment-stats",
    params(("id" = i64, Path, description = "Student ID")),
    responses((status = 200, description = "Comment statistics", body = CommentStatistics)),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn comment_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CommentStatistics>> {
    Ok(Json(state.comment_service.student_stats(id).await?))
}
