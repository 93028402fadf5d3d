use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::{CoachLevel, CreateCommentRequest, UpdateCommentRequest};
use crate::services::CommentService;
use crate::tests::common::{
    create_campus, create_campus_admin, create_coach, create_student, create_test_db,
};
use crate::utils::ApiError;

/// 一条已完成的课时预约
async fn completed_booking(pool: &SqlitePool, coach_id: i64, student_id: i64, campus_id: i64) -> i64 {
    let start = Utc::now() - Duration::days(1);
    sqlx::query(
        r#"
        INSERT INTO bookings (coach_id, student_id, campus_id, table_number, start_time, end_time,
                              duration_hours, hourly_rate, total_cost, status, created_at, updated_at)
        VALUES (?, ?, ?, '桌01', ?, ?, 1.0, 200.0, 200.0, 'completed', ?, ?)
        "#,
    )
    .bind(coach_id)
    .bind(student_id)
    .bind(campus_id)
    .bind(start)
    .bind(start + Duration::hours(1))
    .bind(start)
    .bind(start)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

fn comment(booking_id: i64, rating: i64) -> CreateCommentRequest {
    CreateCommentRequest { booking_id, rating, content: Some("教练很耐心".to_string()) }
}

#[tokio::test]
async fn test_only_booking_student_can_comment_once() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (coach, coach_id) = create_coach(&pool, "coach_m", campus_id, CoachLevel::Senior).await;
    let (student, student_id) = create_student(&pool, "stu_m", campus_id).await;
    let (outsider, _) = create_student(&pool, "stu_x", campus_id).await;
    let booking_id = completed_booking(&pool, coach_id, student_id, campus_id).await;
    let service = CommentService::new(pool.clone());

    assert!(matches!(
        service.create(&outsider, comment(booking_id, 5)).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        service.create(&coach, comment(booking_id, 5)).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        service.create(&student, comment(booking_id, 6)).await,
        Err(ApiError::ValidationError(_))
    ));

    let created = service.create(&student, comment(booking_id, 4)).await.unwrap();
    assert_eq!(created.coach_id, coach_id);
    assert_eq!(created.rating, 4);

    assert!(matches!(
        service.create(&student, comment(booking_id, 5)).await,
        Err(ApiError::Conflict(_))
    ));

    // 教练可以查看，其他学员不行
    assert!(service.get(&coach, created.id).await.is_ok());
    assert!(matches!(service.get(&outsider, created.id).await, Err(ApiError::Forbidden(_))));
}

#[tokio::test]
async fn test_update_window_and_admin_delete() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, coach_id) = create_coach(&pool, "coach_n", campus_id, CoachLevel::Junior).await;
    let (student, student_id) = create_student(&pool, "stu_n", campus_id).await;
    let booking_id = completed_booking(&pool, coach_id, student_id, campus_id).await;
    let service = CommentService::new(pool.clone());

    let created = service.create(&student, comment(booking_id, 3)).await.unwrap();
    let updated = service
        .update(&student, created.id, UpdateCommentRequest { rating: Some(5), content: None })
        .await
        .unwrap();
    assert_eq!(updated.rating, 5);
    assert_eq!(updated.content.as_deref(), Some("教练很耐心"));

    sqlx::query("UPDATE comments SET created_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::hours(25))
        .bind(created.id)
        .execute(&pool)
        .await
        .unwrap();
    let late = service
        .update(&student, created.id, UpdateCommentRequest { rating: Some(1), content: None })
        .await;
    assert!(matches!(late, Err(ApiError::ValidationError(_))));

    let other_campus = create_campus(&pool, "分部").await;
    let foreign_admin = create_campus_admin(&pool, "admin_far", other_campus).await;
    assert!(matches!(service.delete(&foreign_admin, created.id).await, Err(ApiError::Forbidden(_))));

    let admin = create_campus_admin(&pool, "admin_near", campus_id).await;
    service.delete(&admin, created.id).await.unwrap();
    assert!(matches!(service.get(&student, created.id).await, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn test_coach_rating_statistics() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, coach_id) = create_coach(&pool, "coach_s", campus_id, CoachLevel::Senior).await;
    let service = CommentService::new(pool.clone());

    for (i, rating) in [5, 4, 4].into_iter().enumerate() {
        let (student, student_id) = create_student(&pool, &format!("stu_s{}", i), campus_id).await;
        let booking_id = completed_booking(&pool, coach_id, student_id, campus_id).await;
        service.create(&student, comment(booking_id, rating)).await.unwrap();
    }

    let stats = service.coach_stats(coach_id).await.unwrap();
    assert_eq!(stats.coach_id, Some(coach_id));
    assert_eq!(stats.total_comments, 3);
    assert_eq!(stats.average_rating, 4.33);
    assert_eq!(stats.rating_distribution.get("4"), Some(&2));
    assert_eq!(stats.recent_comments, 3);
}
