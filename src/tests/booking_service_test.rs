// Booking lifecycle: creation checks, confirmation debit, cancellation refund and limits

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::middleware::CurrentUser;
use crate::models::{
    BookingAction, BookingStatus, CancelBookingRequest, CoachLevel, CompleteBookingRequest,
    CreateBookingRequest, RespondBookingRequest,
};
use crate::services::BookingService;
use crate::tests::common::{
    count, create_campus, create_campus_admin, create_coach, create_student, create_test_db, link,
    recharge, test_state,
};
use crate::utils::ApiError;

struct Fixture {
    pool: SqlitePool,
    service: BookingService,
    campus_id: i64,
    coach: CurrentUser,
    coach_id: i64,
    student: CurrentUser,
}

/// 一个校区、一名中级教练（150/小时）、一名已绑定且充值 1000 的学员
async fn fixture() -> Fixture {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "东区").await;
    let (coach, coach_id) = create_coach(&pool, "coach_li", campus_id, CoachLevel::Intermediate).await;
    let (student, student_id) = create_student(&pool, "stu_wang", campus_id).await;
    link(&pool, coach_id, student_id).await;
    recharge(&pool, student.user_id, 1000.0).await;

    let service = test_state(&pool).booking_service.as_ref().clone();
    Fixture { pool, service, campus_id, coach, coach_id, student }
}

fn request(f: &Fixture, start: DateTime<Utc>, hours: i64) -> CreateBookingRequest {
    CreateBookingRequest {
        coach_id: f.coach_id,
        campus_id: f.campus_id,
        start_time: start,
        end_time: start + Duration::hours(hours),
        table_number: None,
        booking_message: Some("练习反手".to_string()),
    }
}

fn confirm() -> RespondBookingRequest {
    RespondBookingRequest { action: BookingAction::Confirm, message: None }
}

fn cancel() -> CancelBookingRequest {
    CancelBookingRequest { reason: Some("临时有事".to_string()) }
}

async fn balance(f: &Fixture) -> f64 {
    test_state(&f.pool).payment_service.balance(f.student.user_id).await.unwrap()
}

#[tokio::test]
async fn test_confirm_debits_and_cancel_refunds_once() {
    let f = fixture().await;
    let start = Utc::now() + Duration::hours(30);

    let booking = f.service.create(&f.student, request(&f, start, 1)).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Pending.as_str());
    assert_eq!(booking.total_cost, 150.0);
    assert_eq!(booking.table_number.as_deref(), Some("桌01"));
    // 待确认的预约不扣费
    assert_eq!(balance(&f).await, 1000.0);

    let confirmed = f.service.respond(&f.coach, booking.id, confirm()).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed.as_str());
    assert_eq!(balance(&f).await, 850.0);

    let cancelled = f.service.cancel(&f.student, booking.id, cancel()).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled.as_str());
    assert_eq!(cancelled.cancelled_by, Some(f.student.user_id));
    assert_eq!(balance(&f).await, 1000.0);

    // 已取消的预约不能再次取消，也不会再次退款
    let again = f.service.cancel(&f.student, booking.id, cancel()).await;
    assert!(matches!(again, Err(ApiError::ValidationError(_))));
    let refunds = count(
        &f.pool,
        &format!(
            "SELECT COUNT(*) FROM payments WHERE payment_type = 'refund' AND related_id = {}",
            booking.id
        ),
    )
    .await;
    assert_eq!(refunds, 1);
    assert_eq!(balance(&f).await, 1000.0);
}

#[tokio::test]
async fn test_cancel_pending_booking_has_no_refund() {
    let f = fixture().await;
    let booking = f
        .service
        .create(&f.student, request(&f, Utc::now() + Duration::hours(48), 2))
        .await
        .unwrap();

    f.service.cancel(&f.coach, booking.id, cancel()).await.unwrap();

    let refunds = count(&f.pool, "SELECT COUNT(*) FROM payments WHERE payment_type = 'refund'").await;
    assert_eq!(refunds, 0);
    assert_eq!(balance(&f).await, 1000.0);
}

#[tokio::test]
async fn test_overlapping_booking_for_same_coach_conflicts() {
    let f = fixture().await;
    let start = Utc::now() + Duration::hours(40);
    f.service.create(&f.student, request(&f, start, 2)).await.unwrap();

    let overlapping = f
        .service
        .create(&f.student, request(&f, start + Duration::minutes(30), 1))
        .await;
    assert!(matches!(overlapping, Err(ApiError::Conflict(_))));

    // 首尾相接不算重叠
    let adjacent = f.service.create(&f.student, request(&f, start + Duration::hours(2), 1)).await;
    assert!(adjacent.is_ok());
}

#[tokio::test]
async fn test_parallel_coaches_get_different_tables() {
    let f = fixture().await;
    let (_, other_coach) = create_coach(&f.pool, "coach_zhao", f.campus_id, CoachLevel::Junior).await;
    let (other_student, other_student_id) = create_student(&f.pool, "stu_liu", f.campus_id).await;
    link(&f.pool, other_coach, other_student_id).await;
    recharge(&f.pool, other_student.user_id, 500.0).await;

    let start = Utc::now() + Duration::hours(50);
    let first = f.service.create(&f.student, request(&f, start, 1)).await.unwrap();

    let mut req = request(&f, start, 1);
    req.coach_id = other_coach;
    let second = f.service.create(&other_student, req).await.unwrap();

    assert_eq!(first.table_number.as_deref(), Some("桌01"));
    assert_eq!(second.table_number.as_deref(), Some("桌02"));
    assert_eq!(second.total_cost, 80.0);

    let mut taken = request(&f, start, 1);
    taken.coach_id = other_coach;
    taken.start_time = start + Duration::hours(3);
    taken.end_time = start + Duration::hours(4);
    taken.table_number = Some("桌99".to_string());
    let invalid = f.service.create(&other_student, taken).await;
    assert!(matches!(invalid, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_booking_requires_relation_window_and_balance() {
    let f = fixture().await;

    let (stranger, _) = create_student(&f.pool, "stu_stranger", f.campus_id).await;
    recharge(&f.pool, stranger.user_id, 1000.0).await;
    let no_relation = f
        .service
        .create(&stranger, request(&f, Utc::now() + Duration::hours(30), 1))
        .await;
    assert!(matches!(no_relation, Err(ApiError::Forbidden(_))));

    let past = f.service.create(&f.student, request(&f, Utc::now() - Duration::hours(1), 1)).await;
    assert!(matches!(past, Err(ApiError::ValidationError(_))));

    let too_far = f.service.create(&f.student, request(&f, Utc::now() + Duration::days(8), 1)).await;
    assert!(matches!(too_far, Err(ApiError::ValidationError(_))));

    // 150 × 7 = 1050 > 1000
    let too_expensive = f
        .service
        .create(&f.student, request(&f, Utc::now() + Duration::hours(30), 7))
        .await;
    assert!(matches!(too_expensive, Err(ApiError::ValidationError(_))));

    assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM bookings").await, 0);
}

#[tokio::test]
async fn test_cancel_needs_lead_time() {
    let f = fixture().await;
    let booking = f
        .service
        .create(&f.student, request(&f, Utc::now() + Duration::hours(10), 1))
        .await
        .unwrap();

    let result = f.service.cancel(&f.student, booking.id, cancel()).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
    assert_eq!(f.service.fetch(booking.id).await.unwrap().status, "pending");
}

#[tokio::test]
async fn test_fourth_cancellation_in_month_is_rejected() {
    let f = fixture().await;
    let base = Utc::now() + Duration::hours(30);

    let mut ids = Vec::new();
    for i in 0..4 {
        let booking = f
            .service
            .create(&f.student, request(&f, base + Duration::hours(i * 2), 1))
            .await
            .unwrap();
        ids.push(booking.id);
    }

    for id in &ids[..3] {
        f.service.cancel(&f.student, *id, cancel()).await.unwrap();
    }
    let fourth = f.service.cancel(&f.student, ids[3], cancel()).await;
    assert!(matches!(fourth, Err(ApiError::ValidationError(_))));

    // 上限按发起人计算，教练仍然可以取消
    assert!(f.service.cancel(&f.coach, ids[3], cancel()).await.is_ok());
}

#[tokio::test]
async fn test_only_own_coach_or_campus_admin_can_respond() {
    let f = fixture().await;
    let booking = f
        .service
        .create(&f.student, request(&f, Utc::now() + Duration::hours(30), 1))
        .await
        .unwrap();

    let (other_coach, _) = create_coach(&f.pool, "coach_sun", f.campus_id, CoachLevel::Senior).await;
    let denied = f.service.respond(&other_coach, booking.id, confirm()).await;
    assert!(matches!(denied, Err(ApiError::Forbidden(_))));

    let other_campus = create_campus(&f.pool, "西区").await;
    let foreign_admin = create_campus_admin(&f.pool, "admin_west", other_campus).await;
    let denied = f.service.respond(&foreign_admin, booking.id, confirm()).await;
    assert!(matches!(denied, Err(ApiError::Forbidden(_))));

    let local_admin = create_campus_admin(&f.pool, "admin_east", f.campus_id).await;
    let rejected = f
        .service
        .respond(
            &local_admin,
            booking.id,
            RespondBookingRequest { action: BookingAction::Reject, message: Some("场地维修".into()) },
        )
        .await
        .unwrap();
    assert_eq!(rejected.status, "rejected");
    assert_eq!(balance(&f).await, 1000.0);

    // 已处理的预约不能再确认
    let late = f.service.respond(&f.coach, booking.id, confirm()).await;
    assert!(matches!(late, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_complete_creates_course_record() {
    let f = fixture().await;
    let booking = f
        .service
        .create(&f.student, request(&f, Utc::now() + Duration::hours(30), 1))
        .await
        .unwrap();
    f.service.respond(&f.coach, booking.id, confirm()).await.unwrap();

    let early = f
        .service
        .complete(&f.coach, booking.id, CompleteBookingRequest { notes: None })
        .await;
    assert!(matches!(early, Err(ApiError::ValidationError(_))));

    // 把课程挪到过去
    let start = Utc::now() - Duration::hours(3);
    sqlx::query("UPDATE bookings SET start_time = ?, end_time = ? WHERE id = ?")
        .bind(start)
        .bind(start + Duration::hours(1))
        .bind(booking.id)
        .execute(&f.pool)
        .await
        .unwrap();

    let done = f
        .service
        .complete(&f.coach, booking.id, CompleteBookingRequest { notes: Some("进步明显".into()) })
        .await
        .unwrap();
    assert_eq!(done.status, "completed");
    assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM courses").await, 1);
}

#[tokio::test]
async fn test_monthly_statistics_count_confirmed_revenue() {
    let f = fixture().await;
    let start = Utc::now() + Duration::hours(30);
    let first = f.service.create(&f.student, request(&f, start, 1)).await.unwrap();
    f.service.create(&f.student, request(&f, start + Duration::hours(3), 2)).await.unwrap();
    f.service.respond(&f.coach, first.id, confirm()).await.unwrap();

    use chrono::Datelike;
    let stats = f
        .service
        .monthly_statistics(&f.student, start.year(), start.month())
        .await
        .unwrap();
    assert_eq!(stats.total_bookings, 2);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.total_hours, 1.0);
    assert_eq!(stats.total_revenue, 150.0);
}

#[tokio::test]
async fn test_sub_minute_slot_is_rejected() {
    let f = fixture().await;
    let start = Utc::now() + Duration::hours(30);

    let mut short = request(&f, start, 1);
    short.end_time = start + Duration::seconds(50);
    let result = f.service.create(&f.student, short).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
    assert_eq!(count(&f.pool, "SELECT COUNT(*) FROM bookings").await, 0);

    // 整分钟的短课按分钟计费
    let mut quick = request(&f, start, 1);
    quick.end_time = start + Duration::minutes(20);
    let booking = f.service.create(&f.student, quick).await.unwrap();
    assert_eq!(booking.total_cost, 50.0);
}
