use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::models::{CoachLevel, CreateEvaluationRequest};
use crate::services::EvaluationService;
use crate::tests::common::{create_campus, create_coach, create_student, create_test_db};
use crate::utils::ApiError;

/// 已完成预约及其课程记录，返回 courses.id
async fn finished_course(pool: &SqlitePool, coach_id: i64, student_id: i64, campus_id: i64) -> i64 {
    let start = Utc::now() - Duration::days(2);
    let end = start + Duration::hours(1);
    let booking_id = sqlx::query(
        r#"
        INSERT INTO bookings (coach_id, student_id, campus_id, table_number, start_time, end_time,
                              duration_hours, hourly_rate, total_cost, status, created_at, updated_at)
        VALUES (?, ?, ?, '桌05', ?, ?, 1.0, 80.0, 80.0, 'completed', ?, ?)
        "#,
    )
    .bind(coach_id)
    .bind(student_id)
    .bind(campus_id)
    .bind(start)
    .bind(end)
    .bind(start)
    .bind(start)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO courses (booking_id, coach_id, student_id, campus_id, table_number, start_time,
                             end_time, duration_hours, total_cost, created_at)
        VALUES (?, ?, ?, ?, '桌05', ?, ?, 1.0, 80.0, ?)
        "#,
    )
    .bind(booking_id)
    .bind(coach_id)
    .bind(student_id)
    .bind(campus_id)
    .bind(start)
    .bind(end)
    .bind(end)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

#[tokio::test]
async fn test_both_sides_evaluate_course_once() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (coach, coach_id) = create_coach(&pool, "coach_e", campus_id, CoachLevel::Junior).await;
    let (student, student_id) = create_student(&pool, "stu_e", campus_id).await;
    let (outsider, _) = create_student(&pool, "stu_o", campus_id).await;
    let course_id = finished_course(&pool, coach_id, student_id, campus_id).await;
    let service = EvaluationService::new(pool.clone());

    assert_eq!(service.pending(&student).await.unwrap().len(), 1);
    assert_eq!(service.pending(&coach).await.unwrap()[0].evaluator_type, "coach");

    let by_student = service
        .create(
            &student,
            CreateEvaluationRequest { course_id, content: "发球练得很扎实".into(), rating: Some(5) },
        )
        .await
        .unwrap();
    assert_eq!(by_student.evaluator_type, "student");

    let by_coach = service
        .create(
            &coach,
            CreateEvaluationRequest { course_id, content: "正手需要加强".into(), rating: None },
        )
        .await
        .unwrap();
    assert_eq!(by_coach.evaluator_type, "coach");

    let twice = service
        .create(&student, CreateEvaluationRequest { course_id, content: "再评一次".into(), rating: Some(4) })
        .await;
    assert!(matches!(twice, Err(ApiError::Conflict(_))));

    let stranger = service
        .create(&outsider, CreateEvaluationRequest { course_id, content: "路过".into(), rating: Some(1) })
        .await;
    assert!(matches!(stranger, Err(ApiError::Forbidden(_))));

    assert!(service.pending(&student).await.unwrap().is_empty());
    assert_eq!(service.for_course(&coach, course_id).await.unwrap().len(), 2);

    let summary = service.coach_summary(coach_id).await.unwrap();
    assert_eq!(summary.total_evaluations, 1);
    assert_eq!(summary.average_rating, 5.0);
}
