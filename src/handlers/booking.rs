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
    AvailableTables, AvailableTablesQuery, Booking, BookingAction, BookingListQuery,
    CancelBookingRequest, CompleteBookingRequest, CreateBookingRequest, MonthlyStatistics,
    MonthlyStatisticsQuery, NewSystemLog, Pagination, RespondBookingRequest, ScheduleEntry,
    ScheduleQuery,
};
use crate::utils::ApiResult;

/// 学员预约课程
#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    request_body = CreateBookingRequest,
    responses(
        (status = 200, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid time window or insufficient balance"),
        (status = 403, description = "No active relation with the coach"),
        (status = 409, description = "Time or table conflict")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = state.booking_service.create(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "booking_create",
                format!("预约课程 {} ~ {}", booking.start_time, booking.end_time),
            )
            .target("booking", booking.id)
            .client(ip, ua)
            .extra(serde_json::json!({
                "coach_id": booking.coach_id,
                "table_number": booking.table_number,
                "total_cost": booking.total_cost,
            })),
        )
        .await;
    Ok(Json(booking))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings",
    params(BookingListQuery),
    responses((status = 200, description = "Bookings visible to the current user", body = Vec<Booking>)),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<BookingListQuery>,
) -> ApiResult<Json<Vec<Booking>>> {
    let bookings = state.booking_service.list(&user, &query).await?;
    tracing::debug!("Listed {} bookings for user {}", bookings.len(), user.user_id);
    Ok(Json(bookings))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/pending",
    params(Pagination),
    responses((status = 200, description = "Pending bookings", body = Vec<Booking>)),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn my_pending(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Booking>>> {
    Ok(Json(state.booking_service.my_pending(&user, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/coach/{coach_id}/schedule",
    params(("coach_id" = i64, Path, description = "Coach ID"), ScheduleQuery),
    responses((status = 200, description = "Pending and confirmed bookings in range", body = Vec<ScheduleEntry>)),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn coach_schedule(
    State(state): State<Arc<AppState>>,
    Path(coach_id): Path<i64>,
    Query(query): Query<ScheduleQuery>,
) -> ApiResult<Json<Vec<ScheduleEntry>>> {
    Ok(Json(
        state
            .booking_service
            .coach_schedule(coach_id, query.date_from, query.date_to)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/tables/available",
    params(AvailableTablesQuery),
    responses((status = 200, description = "Free tables in the window", body = AvailableTables)),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn available_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailableTablesQuery>,
) -> ApiResult<Json<AvailableTables>> {
    Ok(Json(
        state
            .booking_service
            .available_tables(query.campus_id, query.start_time, query.end_time)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/statistics/monthly",
    params(MonthlyStatisticsQuery),
    responses((status = 200, description = "Monthly booking statistics", body = MonthlyStatistics)),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn monthly_statistics(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<MonthlyStatisticsQuery>,
) -> ApiResult<Json<MonthlyStatistics>> {
    Ok(Json(
        state
            .booking_service
            .monthly_statistics(&user, query.year, query.month)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    params(("id" = i64, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking detail", body = Booking),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Booking not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Booking>> {
    Ok(Json(state.booking_service.get(&user, id).await?))
}

/// 教练确认或拒绝预约
#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/respond",
    params(("id" = i64, Path, description = "Booking ID")),
    request_body = RespondBookingRequest,
    responses(
        (status = 200, description = "Booking answered", body = Booking),
        (status = 400, description = "Not pending or insufficient balance"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn respond_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<RespondBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let action = match req.action {
        BookingAction::Confirm => "booking_confirm",
        BookingAction::Reject => "booking_reject",
    };
    let booking = state.booking_service.respond(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), action, format!("预约状态变为 {}", booking.status))
                .target("booking", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(booking))
}

#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/cancel",
    params(("id" = i64, Path, description = "Booking ID")),
    request_body = CancelBookingRequest,
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 400, description = "Too late to cancel or monthly limit reached"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<CancelBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = state.booking_service.cancel(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "booking_cancel",
                booking.cancellation_reason.clone().unwrap_or_else(|| "取消预约".to_string()),
            )
            .target("booking", id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(booking))
}

#[utoipa::path(
    put,
    path = "/api/v1/bookings/{id}/complete",
    params(("id" = i64, Path, description = "Booking ID")),
    request_body = CompleteBookingRequest,
    responses(
        (status = 200, description = "Booking completed", body = Booking),
        (status = 400, description = "Not confirmed or not finished yet")
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<CompleteBookingRequest>,
) -> ApiResult<Json<Booking>> {
    let booking = state.booking_service.complete(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "booking_complete", "课程完成")
                .target("booking", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(booking))
}
