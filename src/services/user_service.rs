use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{
    AdminCreateUserRequest, AdminUpdateUserRequest, ApprovalStatus, ChangePasswordRequest,
    CoachLevel, Pagination, UpdateMeRequest, User, UserResponse, UserRole,
};
use crate::utils::{
    ApiError, ApiResult, StringExt, check_campus_scope, hash_password, require_admin,
    validate_password_strength, verify_password,
};

/// 新账号的基础资料
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub real_name: &'a str,
    pub phone: &'a str,
    pub gender: Option<&'a str>,
    pub age: Option<i64>,
    pub email: Option<&'a str>,
    pub role: UserRole,
    pub campus_id: Option<i64>,
}

/// 校验并写入 users 行，返回新用户 ID
pub async fn insert_account(conn: &mut SqliteConnection, account: &NewAccount<'_>) -> ApiResult<i64> {
    validate_password_strength(account.password)?;

    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(account.username)
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("用户名已存在"));
    }
    ensure_phone_available(conn, account.phone, None).await?;

    if let Some(campus_id) = account.campus_id {
        let active: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM campuses WHERE id = ?")
            .bind(campus_id)
            .fetch_optional(&mut *conn)
            .await?;
        if !matches!(active, Some((true,))) {
            return Err(ApiError::not_found("校区不存在"));
        }
    }

    let password_hash = hash_password(account.password)?;
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users
            (username, password_hash, real_name, gender, age, phone, email, role, campus_id,
             is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(account.username)
    .bind(password_hash)
    .bind(account.real_name)
    .bind(account.gender)
    .bind(account.age)
    .bind(account.phone)
    .bind(account.email)
    .bind(account.role.as_str())
    .bind(account.campus_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn insert_student_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    emergency_contact: Option<String>,
    emergency_phone: Option<String>,
) -> ApiResult<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO students (user_id, emergency_contact, emergency_phone, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(emergency_contact.clean())
    .bind(emergency_phone.clean())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// 写入教练档案；`approved_by` 为 Some 时直接审核通过
pub async fn insert_coach_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    level: CoachLevel,
    achievements: Option<String>,
    approved_by: Option<i64>,
) -> ApiResult<i64> {
    let now = Utc::now();
    let status = if approved_by.is_some() { ApprovalStatus::Approved } else { ApprovalStatus::Pending };
    let result = sqlx::query(
        r#"
        INSERT INTO coaches
            (user_id, level, hourly_rate, achievements, approval_status, approved_by, approved_at,
             created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(level.as_str())
    .bind(level.hourly_rate())
    .bind(achievements.clean())
    .bind(status.as_str())
    .bind(approved_by)
    .bind(approved_by.map(|_| now))
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

async fn ensure_phone_available(
    conn: &mut SqliteConnection,
    phone: &str,
    exclude_user_id: Option<i64>,
) -> ApiResult<()> {
    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE phone = ? AND id != ?")
        .bind(phone)
        .bind(exclude_user_id.unwrap_or(0))
        .fetch_optional(&mut *conn)
        .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("手机号已被注册"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct UserService {
    pool: SqlitePool,
}

impl UserService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn fetch_user(&self, user_id: i64) -> ApiResult<User> {
        sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("用户不存在"))
    }

    pub async fn get_me(&self, user: &CurrentUser) -> ApiResult<UserResponse> {
        Ok(self.fetch_user(user.user_id).await?.into())
    }

    pub async fn update_me(&self, user: &CurrentUser, req: UpdateMeRequest) -> ApiResult<UserResponse> {
        req.validate()?;
        let profile = AdminUpdateUserRequest {
            real_name: req.real_name,
            gender: req.gender,
            age: req.age,
            phone: req.phone,
            email: req.email,
            avatar_url: req.avatar_url,
            ..Default::default()
        };
        self.apply_update(user.user_id, profile).await?;
        tracing::info!("User {} updated own profile", user.user_id);
        self.get_me(user).await
    }

    pub async fn change_password(&self, user: &CurrentUser, req: ChangePasswordRequest) -> ApiResult<()> {
        let existing = self.fetch_user(user.user_id).await?;
        if !verify_password(&req.old_password, &existing.password_hash)? {
            return Err(ApiError::validation_error("原密码错误"));
        }
        validate_password_strength(&req.new_password)?;

        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(hash_password(&req.new_password)?)
            .bind(Utc::now())
            .bind(user.user_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("User {} changed password", user.user_id);
        Ok(())
    }

    /// 本人、或本校区管理员、或超级管理员可查看
    pub async fn get_user(&self, user: &CurrentUser, id: i64) -> ApiResult<UserResponse> {
        let target = self.fetch_user(id).await?;
        if user.user_id != id {
            require_admin(user)?;
            check_campus_scope(user, target.campus_id, "查看")?;
        }
        Ok(target.into())
    }

    pub async fn update_user(
        &self,
        user: &CurrentUser,
        id: i64,
        req: AdminUpdateUserRequest,
    ) -> ApiResult<UserResponse> {
        require_admin(user)?;
        req.validate()?;

        let target = self.fetch_user(id).await?;
        check_campus_scope(user, target.campus_id, "管理")?;

        if (req.role.is_some() || req.campus_id.is_some()) && !user.is_super_admin() {
            return Err(ApiError::forbidden("只有超级管理员可以修改角色或校区"));
        }

        self.apply_update(id, req).await?;
        tracing::info!("User {} updated by {}", id, user.user_id);
        Ok(self.fetch_user(id).await?.into())
    }

    pub async fn deactivate_user(&self, user: &CurrentUser, id: i64) -> ApiResult<()> {
        require_admin(user)?;
        if user.user_id == id {
            return Err(ApiError::validation_error("不能停用自己的账号"));
        }

        let target = self.fetch_user(id).await?;
        check_campus_scope(user, target.campus_id, "管理")?;

        sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::warn!("User {} deactivated by {}", id, user.user_id);
        Ok(())
    }

    pub async fn list_by_campus(
        &self,
        user: &CurrentUser,
        campus_id: i64,
        page: Pagination,
    ) -> ApiResult<Vec<UserResponse>> {
        require_admin(user)?;
        check_campus_scope(user, Some(campus_id), "查看")?;

        let (limit, offset) = page.bounds();
        let users: Vec<User> = sqlx::query_as(
            "SELECT * FROM users WHERE campus_id = ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(campus_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!("Listed {} users of campus {}", users.len(), campus_id);
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    /// 管理员创建账号，按角色同时创建学员或教练档案
    pub async fn create_user(
        &self,
        user: &CurrentUser,
        req: AdminCreateUserRequest,
    ) -> ApiResult<UserResponse> {
        require_admin(user)?;
        req.validate()?;

        let campus_id = if user.is_super_admin() {
            req.campus_id
        } else {
            if !matches!(req.role, UserRole::Coach | UserRole::Student) {
                return Err(ApiError::forbidden("校区管理员只能创建教练或学员账号"));
            }
            check_campus_scope(user, req.campus_id.or(user.campus_id), "创建")?;
            user.campus_id
        };

        let account = NewAccount {
            username: &req.username,
            password: &req.password,
            real_name: &req.real_name,
            phone: &req.phone,
            gender: req.gender.as_deref(),
            age: req.age,
            email: req.email.as_deref(),
            role: req.role,
            campus_id,
        };

        let mut tx = self.pool.begin().await?;
        let user_id = insert_account(&mut tx, &account).await?;
        match req.role {
            UserRole::Student => {
                insert_student_profile(&mut tx, user_id, req.emergency_contact, req.emergency_phone)
                    .await?;
            },
            UserRole::Coach => {
                let level = req
                    .level
                    .ok_or_else(|| ApiError::validation_error("创建教练账号必须指定级别"))?;
                insert_coach_profile(&mut tx, user_id, level, req.achievements, Some(user.user_id))
                    .await?;
            },
            UserRole::SuperAdmin | UserRole::CampusAdmin => {},
        }
        tx.commit().await?;

        tracing::info!(
            "User {} ({}) created with role {} by {}",
            req.username,
            user_id,
            req.role,
            user.user_id
        );
        Ok(self.fetch_user(user_id).await?.into())
    }

    /// 启动时确保至少存在一个超级管理员
    pub async fn ensure_super_admin(&self, username: &str, password: &str) -> ApiResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'super_admin'")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(());
        }

        let account = NewAccount {
            username,
            password,
            real_name: "系统管理员",
            phone: "13800000000",
            gender: None,
            age: None,
            email: None,
            role: UserRole::SuperAdmin,
            campus_id: None,
        };
        let mut conn = self.pool.acquire().await?;
        let id = insert_account(&mut conn, &account).await?;

        tracing::warn!("Bootstrap super admin '{}' created (ID: {}), change its password", username, id);
        Ok(())
    }

    async fn apply_update(&self, id: i64, req: AdminUpdateUserRequest) -> ApiResult<()> {
        let mut conn = self.pool.acquire().await?;
        if let Some(phone) = &req.phone {
            ensure_phone_available(&mut conn, phone, Some(id)).await?;
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        if let Some(real_name) = req.real_name.clean() {
            set.push("real_name = ").push_bind_unseparated(real_name);
        }
        if let Some(gender) = req.gender {
            set.push("gender = ").push_bind_unseparated(gender.clean());
        }
        if let Some(age) = req.age {
            set.push("age = ").push_bind_unseparated(age);
        }
        if let Some(phone) = req.phone {
            set.push("phone = ").push_bind_unseparated(phone);
        }
        if let Some(email) = req.email {
            set.push("email = ").push_bind_unseparated(email.clean());
        }
        if let Some(avatar_url) = req.avatar_url {
            set.push("avatar_url = ").push_bind_unseparated(avatar_url.clean());
        }
        if let Some(role) = req.role {
            set.push("role = ").push_bind_unseparated(role.as_str());
        }
        if let Some(campus_id) = req.campus_id {
            set.push("campus_id = ").push_bind_unseparated(campus_id);
        }
        if let Some(is_active) = req.is_active {
            set.push("is_active = ").push_bind_unseparated(is_active);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);

        qb.build().execute(&mut *conn).await?;
        Ok(())
    }
}
