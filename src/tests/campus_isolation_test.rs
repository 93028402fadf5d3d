// Campus admins only see and manage users of their own campus

use crate::models::{
    AdminCreateUserRequest, CoachLevel, CreateCampusRequest, Pagination, UserRole,
};
use crate::services::{CampusService, CoachService, UserService};
use crate::tests::common::{
    create_campus, create_campus_admin, create_coach, create_student, create_super_admin,
    create_test_db, create_user, test_business,
};
use crate::utils::ApiError;

fn new_account(username: &str, phone: &str, role: UserRole, level: Option<CoachLevel>) -> AdminCreateUserRequest {
    AdminCreateUserRequest {
        username: username.to_string(),
        password: "Table#2025".to_string(),
        real_name: format!("{}的名字", username),
        phone: phone.to_string(),
        role,
        campus_id: None,
        gender: None,
        age: None,
        email: None,
        level,
        achievements: None,
        emergency_contact: None,
        emergency_phone: None,
    }
}

#[tokio::test]
async fn test_campus_admin_sees_only_own_campus_users() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let west = create_campus(&pool, "西区").await;
    let east_admin = create_campus_admin(&pool, "admin_east", east).await;
    let (east_student, _) = create_student(&pool, "stu_east", east).await;
    let (west_student, _) = create_student(&pool, "stu_west", west).await;
    let service = UserService::new(pool.clone());

    assert!(service.get_user(&east_admin, east_student.user_id).await.is_ok());
    assert!(matches!(
        service.get_user(&east_admin, west_student.user_id).await,
        Err(ApiError::Forbidden(_))
    ));

    // 学员只能看自己
    assert!(service.get_user(&east_student, east_student.user_id).await.is_ok());
    assert!(matches!(
        service.get_user(&east_student, west_student.user_id).await,
        Err(ApiError::Forbidden(_))
    ));

    let users = service.list_by_campus(&east_admin, east, Pagination::default()).await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(matches!(
        service.list_by_campus(&east_admin, west, Pagination::default()).await,
        Err(ApiError::Forbidden(_))
    ));

    assert!(matches!(
        service.deactivate_user(&east_admin, west_student.user_id).await,
        Err(ApiError::Forbidden(_))
    ));
    assert!(matches!(
        service.deactivate_user(&east_admin, east_admin.user_id).await,
        Err(ApiError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_campus_admin_creates_accounts_in_own_campus_only() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let admin = create_campus_admin(&pool, "admin_east", east).await;
    let service = UserService::new(pool.clone());

    let coach = service
        .create_user(&admin, new_account("coach_new", "13600000001", UserRole::Coach, Some(CoachLevel::Senior)))
        .await
        .unwrap();
    assert_eq!(coach.campus_id, Some(east));
    assert_eq!(coach.role, "coach");

    // 管理员创建的教练直接通过审核
    let (status, rate): (String, f64) =
        sqlx::query_as("SELECT approval_status, hourly_rate FROM coaches WHERE user_id = ?")
            .bind(coach.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "approved");
    assert_eq!(rate, 200.0);

    let missing_level = service
        .create_user(&admin, new_account("coach_bad", "13600000002", UserRole::Coach, None))
        .await;
    assert!(matches!(missing_level, Err(ApiError::ValidationError(_))));

    let admin_account = service
        .create_user(&admin, new_account("admin_two", "13600000003", UserRole::CampusAdmin, None))
        .await;
    assert!(matches!(admin_account, Err(ApiError::Forbidden(_))));

    let mut elsewhere = new_account("stu_far", "13600000004", UserRole::Student, None);
    elsewhere.campus_id = Some(create_campus(&pool, "西区").await);
    assert!(matches!(service.create_user(&admin, elsewhere).await, Err(ApiError::Forbidden(_))));

    let duplicate_phone = service
        .create_user(&admin, new_account("stu_dup", "13600000001", UserRole::Student, None))
        .await;
    assert!(matches!(duplicate_phone, Err(ApiError::Conflict(_))));
}

#[tokio::test]
async fn test_coach_approval_scoped_to_campus() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let west = create_campus(&pool, "西区").await;
    let (_, coach_id) = create_coach(&pool, "coach_wait", east, CoachLevel::Junior).await;
    sqlx::query("UPDATE coaches SET approval_status = 'pending' WHERE id = ?")
        .bind(coach_id)
        .execute(&pool)
        .await
        .unwrap();
    let west_admin = create_campus_admin(&pool, "admin_west", west).await;
    let east_admin = create_campus_admin(&pool, "admin_east", east).await;
    let service = CoachService::new(pool.clone(), test_business());

    assert!(service.pending_coaches(&west_admin).await.unwrap().is_empty());
    assert_eq!(service.pending_coaches(&east_admin).await.unwrap().len(), 1);

    assert!(matches!(
        service.approve_coach(&west_admin, coach_id, true).await,
        Err(ApiError::Forbidden(_))
    ));
    let approved = service.approve_coach(&east_admin, coach_id, true).await.unwrap();
    assert_eq!(approved.approval_status, "approved");
}

#[tokio::test]
async fn test_only_super_admin_manages_campuses() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let admin = create_campus_admin(&pool, "admin_east", east).await;
    let root = create_super_admin(&pool).await;
    let service = CampusService::new(pool.clone());

    let req = || CreateCampusRequest {
        name: "北区".to_string(),
        address: "北环路8号".to_string(),
        contact_person: "周老师".to_string(),
        contact_phone: "13500001111".to_string(),
        contact_email: None,
        is_main_campus: true,
    };
    assert!(matches!(service.create_campus(&admin, req()).await, Err(ApiError::Forbidden(_))));

    let north = service.create_campus(&root, req()).await.unwrap();
    assert!(north.is_main_campus);
    assert_eq!(service.get_main_campus().await.unwrap().id, north.id);
    assert!(matches!(service.create_campus(&root, req()).await, Err(ApiError::Conflict(_))));

    // 仍有启用用户的校区不能删除
    assert!(matches!(service.delete_campus(&root, east).await, Err(ApiError::ValidationError(_))));

    let promoted = create_user(&pool, "future_admin", UserRole::Coach, Some(east)).await;
    let assigned = service.assign_admin(&root, north.id, promoted).await.unwrap();
    assert_eq!(assigned.admin_id, Some(promoted));
    let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = ?")
        .bind(promoted)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(role, "campus_admin");
}
