// Two-way coach selection: capacity limits, approval and coach change

use crate::models::{
    ApplyCoachRequest, ApproveRelationRequest, ChangeCoachRequest, CoachLevel, RelationStatus,
};
use crate::tests::common::{
    count, create_campus, create_coach, create_student, create_test_db, link, test_state,
};
use crate::utils::ApiError;

fn apply(coach_id: i64) -> ApplyCoachRequest {
    ApplyCoachRequest { coach_id, message: Some("希望跟您学球".to_string()) }
}

fn approve(approved: bool) -> ApproveRelationRequest {
    ApproveRelationRequest { approved, response_message: None }
}

#[tokio::test]
async fn test_apply_then_coach_approves() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (coach, coach_id) = create_coach(&pool, "coach_a", campus_id, CoachLevel::Senior).await;
    let (student, _) = create_student(&pool, "stu_a", campus_id).await;
    let service = test_state(&pool).coach_student_service.clone();

    let pending = service.apply(&student, apply(coach_id)).await.unwrap();
    assert_eq!(pending.status, RelationStatus::Pending.as_str());
    assert_eq!(pending.applied_by, "student");

    // 重复申请
    let duplicate = service.apply(&student, apply(coach_id)).await;
    assert!(matches!(duplicate, Err(ApiError::Conflict(_))));

    let queue = service.pending_approvals(&coach).await.unwrap();
    assert_eq!(queue.len(), 1);

    let active = service.approve(&coach, pending.id, approve(true)).await.unwrap();
    assert_eq!(active.status, RelationStatus::Active.as_str());

    let again = service.approve(&coach, pending.id, approve(false)).await;
    assert!(matches!(again, Err(ApiError::ValidationError(_))));

    // 教练收到申请通知，学员收到审批结果
    let notified = count(&pool, "SELECT COUNT(*) FROM notifications WHERE notification_type = 'coach_student'").await;
    assert_eq!(notified, 2);
}

#[tokio::test]
async fn test_student_limited_to_two_coaches() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, student_id) = create_student(&pool, "stu_b", campus_id).await;
    for name in ["coach_b1", "coach_b2"] {
        let (_, coach_id) = create_coach(&pool, name, campus_id, CoachLevel::Junior).await;
        link(&pool, coach_id, student_id).await;
    }
    let (_, third) = create_coach(&pool, "coach_b3", campus_id, CoachLevel::Junior).await;

    let service = test_state(&pool).coach_student_service.clone();
    let result = service.apply(&student, apply(third)).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_coach_limited_to_twenty_students() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, coach_id) = create_coach(&pool, "coach_full", campus_id, CoachLevel::Intermediate).await;
    for i in 0..20 {
        let (_, student_id) = create_student(&pool, &format!("stu_{:02}", i), campus_id).await;
        link(&pool, coach_id, student_id).await;
    }
    let (late, _) = create_student(&pool, "stu_late", campus_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let result = service.apply(&late, apply(coach_id)).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_pending_coach_cannot_be_selected() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, coach_id) = create_coach(&pool, "coach_new", campus_id, CoachLevel::Junior).await;
    sqlx::query("UPDATE coaches SET approval_status = 'pending' WHERE id = ?")
        .bind(coach_id)
        .execute(&pool)
        .await
        .unwrap();
    let (student, _) = create_student(&pool, "stu_c", campus_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let result = service.apply(&student, apply(coach_id)).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_change_coach_approved_retires_old_relation() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, old_coach) = create_coach(&pool, "coach_old", campus_id, CoachLevel::Junior).await;
    let (new_coach_user, new_coach) = create_coach(&pool, "coach_new", campus_id, CoachLevel::Senior).await;
    let (student, student_id) = create_student(&pool, "stu_d", campus_id).await;
    let old_relation = link(&pool, old_coach, student_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let change = service
        .request_change(
            &student,
            ChangeCoachRequest { old_coach_id: old_coach, new_coach_id: new_coach, message: None },
        )
        .await
        .unwrap();
    assert_eq!(change.status, RelationStatus::PendingChange.as_str());
    assert_eq!(change.replaces_relation_id, Some(old_relation));

    let status: String = sqlx::query_scalar("SELECT status FROM coach_students WHERE id = ?")
        .bind(old_relation)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "changing");

    service.approve(&new_coach_user, change.id, approve(true)).await.unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM coach_students WHERE id = ?")
        .bind(old_relation)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "deleted");

    let relations = service.list_for_student(&student, student_id).await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].coach_id, new_coach);
}

#[tokio::test]
async fn test_change_coach_rejected_restores_old_relation() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, old_coach) = create_coach(&pool, "coach_keep", campus_id, CoachLevel::Junior).await;
    let (new_coach_user, new_coach) = create_coach(&pool, "coach_busy", campus_id, CoachLevel::Senior).await;
    let (student, student_id) = create_student(&pool, "stu_e", campus_id).await;
    let old_relation = link(&pool, old_coach, student_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let change = service
        .request_change(
            &student,
            ChangeCoachRequest { old_coach_id: old_coach, new_coach_id: new_coach, message: None },
        )
        .await
        .unwrap();
    service.approve(&new_coach_user, change.id, approve(false)).await.unwrap();

    let status: String = sqlx::query_scalar("SELECT status FROM coach_students WHERE id = ?")
        .bind(old_relation)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");
}

async fn relation_status(pool: &sqlx::SqlitePool, id: i64) -> String {
    sqlx::query_scalar("SELECT status FROM coach_students WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_withdrawn_change_reactivates_old_relation() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (_, old_coach) = create_coach(&pool, "coach_stay", campus_id, CoachLevel::Junior).await;
    let (_, new_coach) = create_coach(&pool, "coach_maybe", campus_id, CoachLevel::Senior).await;
    let (student, student_id) = create_student(&pool, "stu_f", campus_id).await;
    let old_relation = link(&pool, old_coach, student_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let change = service
        .request_change(
            &student,
            ChangeCoachRequest { old_coach_id: old_coach, new_coach_id: new_coach, message: None },
        )
        .await
        .unwrap();

    // 学员撤回更换申请
    service.delete(&student, change.id).await.unwrap();

    assert_eq!(relation_status(&pool, change.id).await, "deleted");
    assert_eq!(relation_status(&pool, old_relation).await, "active");
    assert_eq!(
        count(
            &pool,
            &format!("SELECT COUNT(*) FROM coach_students WHERE student_id = {} AND status = 'active'", student_id)
        )
        .await,
        1
    );
}

#[tokio::test]
async fn test_removed_old_relation_stays_removed() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (old_coach_user, old_coach) = create_coach(&pool, "coach_gone", campus_id, CoachLevel::Junior).await;
    let (new_coach_user, new_coach) = create_coach(&pool, "coach_next", campus_id, CoachLevel::Senior).await;
    let (student, student_id) = create_student(&pool, "stu_g", campus_id).await;
    let old_relation = link(&pool, old_coach, student_id).await;

    let service = test_state(&pool).coach_student_service.clone();
    let change = service
        .request_change(
            &student,
            ChangeCoachRequest { old_coach_id: old_coach, new_coach_id: new_coach, message: None },
        )
        .await
        .unwrap();

    // 原教练在更换审批前解除关系，挂起的更换申请随之作废
    service.delete(&old_coach_user, old_relation).await.unwrap();
    assert_eq!(relation_status(&pool, change.id).await, "deleted");

    let rejected = service.approve(&new_coach_user, change.id, approve(false)).await;
    assert!(matches!(rejected, Err(ApiError::ValidationError(_))));
    assert_eq!(relation_status(&pool, old_relation).await, "deleted");

    // 已删除的关系不能再次删除
    assert!(matches!(service.delete(&student, old_relation).await, Err(ApiError::NotFound(_))));
}
