// Common test utilities and helpers

use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;
use std::time::Duration;

use crate::AppState;
use crate::config::BusinessConfig;
use crate::middleware::CurrentUser;
use crate::models::{CoachLevel, UserRole};
use crate::utils::JwtUtil;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-tabletennis";

/// Create an in-memory SQLite database for testing
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(3))
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");

    sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");

    pool
}

pub fn test_business() -> BusinessConfig {
    BusinessConfig::default()
}

pub fn test_jwt() -> Arc<JwtUtil> {
    Arc::new(JwtUtil::new(TEST_JWT_SECRET, "24h"))
}

pub fn test_state(pool: &SqlitePool) -> Arc<AppState> {
    Arc::new(AppState::new(pool.clone(), test_jwt(), test_business()))
}

pub async fn create_campus(pool: &SqlitePool, name: &str) -> i64 {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO campuses (name, address, contact_person, contact_phone, is_main_campus, created_at, updated_at)
        VALUES (?, '体育路1号', '张老师', '13800001111', 0, ?, ?)
        "#,
    )
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to create campus")
    .last_insert_rowid()
}

/// 直接写入 users 行，密码哈希为占位值（不走 bcrypt）
pub async fn create_user(pool: &SqlitePool, username: &str, role: UserRole, campus_id: Option<i64>) -> i64 {
    let now = Utc::now();
    let user_id = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, real_name, phone, role, campus_id, is_active, created_at, updated_at)
        VALUES (?, 'not-a-hash', ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(username)
    .bind(format!("{}-name", username))
    .bind(format!("phone-{}", username))
    .bind(role.as_str())
    .bind(campus_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to create user")
    .last_insert_rowid();

    if role == UserRole::CampusAdmin
        && let Some(campus_id) = campus_id
    {
        sqlx::query("UPDATE campuses SET admin_id = ? WHERE id = ?")
            .bind(user_id)
            .bind(campus_id)
            .execute(pool)
            .await
            .expect("Failed to assign campus admin");
    }

    user_id
}

/// 中间件写入的当前用户
pub async fn current_user(pool: &SqlitePool, user_id: i64) -> CurrentUser {
    let (username, role, campus_id): (String, String, Option<i64>) =
        sqlx::query_as("SELECT username, role, campus_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .expect("Failed to load user");
    CurrentUser { user_id, username, role: role.parse().expect("valid role"), campus_id }
}

pub async fn create_super_admin(pool: &SqlitePool) -> CurrentUser {
    let id = create_user(pool, "root", UserRole::SuperAdmin, None).await;
    current_user(pool, id).await
}

pub async fn create_campus_admin(pool: &SqlitePool, username: &str, campus_id: i64) -> CurrentUser {
    let id = create_user(pool, username, UserRole::CampusAdmin, Some(campus_id)).await;
    current_user(pool, id).await
}

/// 学员账号 + 档案，返回 (用户, students.id)
pub async fn create_student(pool: &SqlitePool, username: &str, campus_id: i64) -> (CurrentUser, i64) {
    let user_id = create_user(pool, username, UserRole::Student, Some(campus_id)).await;
    let now = Utc::now();
    let student_id = sqlx::query("INSERT INTO students (user_id, created_at, updated_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .expect("Failed to create student")
        .last_insert_rowid();
    (current_user(pool, user_id).await, student_id)
}

/// 已审核通过的教练，返回 (用户, coaches.id)
pub async fn create_coach(
    pool: &SqlitePool,
    username: &str,
    campus_id: i64,
    level: CoachLevel,
) -> (CurrentUser, i64) {
    let user_id = create_user(pool, username, UserRole::Coach, Some(campus_id)).await;
    let now = Utc::now();
    let coach_id = sqlx::query(
        r#"
        INSERT INTO coaches (user_id, level, hourly_rate, approval_status, approved_at, created_at, updated_at)
        VALUES (?, ?, ?, 'approved', ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(level.as_str())
    .bind(level.hourly_rate())
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to create coach")
    .last_insert_rowid();
    (current_user(pool, user_id).await, coach_id)
}

/// 建立一条已生效的双选关系
pub async fn link(pool: &SqlitePool, coach_id: i64, student_id: i64) -> i64 {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO coach_students (coach_id, student_id, status, applied_by, created_at, updated_at)
        VALUES (?, ?, 'active', 'student', ?, ?)
        "#,
    )
    .bind(coach_id)
    .bind(student_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to link coach and student")
    .last_insert_rowid()
}

/// 写入一笔成功的充值
pub async fn recharge(pool: &SqlitePool, user_id: i64, amount: f64) {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (user_id, payment_type, amount, payment_method, status, paid_at, created_at, updated_at)
        VALUES (?, 'recharge', ?, 'offline', 'success', ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .expect("Failed to recharge");
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.expect("count query failed")
}
