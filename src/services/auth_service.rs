use std::sync::Arc;

use sqlx::SqlitePool;
use validator::Validate;

use crate::models::{
    LoginRequest, LoginResponse, RegisterCoachRequest, RegisterStudentRequest, User, UserRole,
};
use crate::services::user_service::{
    NewAccount, insert_account, insert_coach_profile, insert_student_profile,
};
use crate::utils::{ApiError, ApiResult, JwtUtil, verify_password};

#[derive(Clone)]
pub struct AuthService {
    pool: SqlitePool,
    jwt_util: Arc<JwtUtil>,
}

impl AuthService {
    pub fn new(pool: SqlitePool, jwt_util: Arc<JwtUtil>) -> Self {
        Self { pool, jwt_util }
    }

    /// 学员自助注册：users + students 同一事务
    pub async fn register_student(&self, req: RegisterStudentRequest) -> ApiResult<LoginResponse> {
        req.validate()?;

        let account = NewAccount {
            username: &req.username,
            password: &req.password,
            real_name: &req.real_name,
            phone: &req.phone,
            gender: req.gender.as_deref(),
            age: req.age,
            email: req.email.as_deref(),
            role: UserRole::Student,
            campus_id: req.campus_id,
        };

        let mut tx = self.pool.begin().await?;
        let user_id = insert_account(&mut tx, &account).await?;
        insert_student_profile(&mut tx, user_id, req.emergency_contact.clone(), req.emergency_phone.clone())
            .await?;
        tx.commit().await?;

        tracing::info!("Student registered: {} (ID: {})", req.username, user_id);
        self.issue(user_id).await
    }

    /// 教练注册后处于待审核状态，课时费由级别决定
    pub async fn register_coach(&self, req: RegisterCoachRequest) -> ApiResult<LoginResponse> {
        req.validate()?;

        let account = NewAccount {
            username: &req.username,
            password: &req.password,
            real_name: &req.real_name,
            phone: &req.phone,
            gender: req.gender.as_deref(),
            age: req.age,
            email: req.email.as_deref(),
            role: UserRole::Coach,
            campus_id: req.campus_id,
        };

        let mut tx = self.pool.begin().await?;
        let user_id = insert_account(&mut tx, &account).await?;
        insert_coach_profile(&mut tx, user_id, req.level, req.achievements.clone(), None).await?;
        tx.commit().await?;

        tracing::info!("Coach registered: {} (ID: {}, level: {})", req.username, user_id, req.level);
        self.issue(user_id).await
    }

    pub async fn login(&self, req: LoginRequest) -> ApiResult<LoginResponse> {
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
            .bind(req.username.trim())
            .fetch_optional(&self.pool)
            .await?;

        let Some(user) = user else {
            tracing::warn!("Login failed: unknown user {}", req.username);
            return Err(ApiError::unauthorized("用户名或密码错误"));
        };

        if !verify_password(&req.password, &user.password_hash)? {
            tracing::warn!("Login failed: wrong password for {}", req.username);
            return Err(ApiError::unauthorized("用户名或密码错误"));
        }

        if !user.is_active {
            tracing::warn!("Login rejected: user {} is inactive", user.id);
            return Err(ApiError::forbidden("账户已被禁用"));
        }

        let token = self.jwt_util.generate_token(user.id, &user.username, &user.role)?;
        tracing::info!("User logged in: {} (ID: {})", user.username, user.id);
        Ok(LoginResponse { token, user: user.into() })
    }

    async fn issue(&self, user_id: i64) -> ApiResult<LoginResponse> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let token = self.jwt_util.generate_token(user.id, &user.username, &user.role)?;
        Ok(LoginResponse { token, user: user.into() })
    }
}
