use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{Campus, CreateCampusRequest, Pagination, UpdateCampusRequest, UserRole};
use crate::utils::{ApiError, ApiResult, StringExt, require_super_admin};

#[derive(Clone)]
pub struct CampusService {
    pool: SqlitePool,
}

impl CampusService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_campus(&self, user: &CurrentUser, req: CreateCampusRequest) -> ApiResult<Campus> {
        require_super_admin(user)?;
        req.validate()?;

        let mut tx = self.pool.begin().await?;
        ensure_name_available(&mut tx, &req.name, None).await?;
        if req.is_main_campus {
            clear_main_flag(&mut tx).await?;
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO campuses
                (name, address, contact_person, contact_phone, contact_email, is_main_campus,
                 is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(req.name.trim())
        .bind(req.address.trim())
        .bind(req.contact_person.trim())
        .bind(&req.contact_phone)
        .bind(req.contact_email.clean())
        .bind(req.is_main_campus)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        tracing::info!("Campus created: {} (ID: {}) by {}", req.name, id, user.user_id);
        self.get_campus(id).await
    }

    pub async fn list_campuses(&self, page: Pagination) -> ApiResult<Vec<Campus>> {
        let (limit, offset) = page.bounds();
        Ok(sqlx::query_as(
            "SELECT * FROM campuses WHERE is_active = 1 ORDER BY is_main_campus DESC, id LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_campus(&self, id: i64) -> ApiResult<Campus> {
        sqlx::query_as("SELECT * FROM campuses WHERE id = ? AND is_active = 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("校区不存在"))
    }

    pub async fn get_main_campus(&self) -> ApiResult<Campus> {
        sqlx::query_as("SELECT * FROM campuses WHERE is_main_campus = 1 AND is_active = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("尚未设置中心校区"))
    }

    pub async fn update_campus(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateCampusRequest,
    ) -> ApiResult<Campus> {
        require_super_admin(user)?;
        req.validate()?;
        self.get_campus(id).await?;

        let mut tx = self.pool.begin().await?;
        if let Some(name) = &req.name {
            ensure_name_available(&mut tx, name, Some(id)).await?;
        }
        if req.is_main_campus == Some(true) {
            clear_main_flag(&mut tx).await?;
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE campuses SET ");
        let mut set = qb.separated(", ");
        if let Some(name) = req.name.clean() {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(address) = req.address.clean() {
            set.push("address = ").push_bind_unseparated(address);
        }
        if let Some(contact_person) = req.contact_person.clean() {
            set.push("contact_person = ").push_bind_unseparated(contact_person);
        }
        if let Some(contact_phone) = req.contact_phone {
            set.push("contact_phone = ").push_bind_unseparated(contact_phone);
        }
        if let Some(contact_email) = req.contact_email {
            set.push("contact_email = ").push_bind_unseparated(contact_email.clean());
        }
        if let Some(is_main) = req.is_main_campus {
            set.push("is_main_campus = ").push_bind_unseparated(is_main);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&mut *tx).await?;
        tx.commit().await?;

        tracing::info!("Campus {} updated by {}", id, user.user_id);
        self.get_campus(id).await
    }

    /// 软删除；仍有启用用户时拒绝
    pub async fn delete_campus(&self, user: &CurrentUser, id: i64) -> ApiResult<()> {
        require_super_admin(user)?;
        self.get_campus(id).await?;

        let active_users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE campus_id = ? AND is_active = 1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if active_users > 0 {
            return Err(ApiError::validation_error(format!(
                "校区下仍有{}个启用的用户，无法删除",
                active_users
            )));
        }

        sqlx::query("UPDATE campuses SET is_active = 0, is_main_campus = 0, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::warn!("Campus {} deleted by {}", id, user.user_id);
        Ok(())
    }

    /// 指定校区管理员：同时更新用户角色和所属校区
    pub async fn assign_admin(&self, user: &CurrentUser, campus_id: i64, user_id: i64) -> ApiResult<Campus> {
        require_super_admin(user)?;
        self.get_campus(campus_id).await?;

        let target: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((role,)) = target else {
            return Err(ApiError::not_found("用户不存在"));
        };
        if role == UserRole::SuperAdmin.as_str() {
            return Err(ApiError::validation_error("不能将超级管理员设为校区管理员"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE campuses SET admin_id = ?, updated_at = ? WHERE id = ?")
            .bind(user_id)
            .bind(now)
            .bind(campus_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE users SET role = ?, campus_id = ?, updated_at = ? WHERE id = ?")
            .bind(UserRole::CampusAdmin.as_str())
            .bind(campus_id)
            .bind(now)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("User {} assigned as admin of campus {} by {}", user_id, campus_id, user.user_id);
        self.get_campus(campus_id).await
    }
}

async fn ensure_name_available(
    conn: &mut SqliteConnection,
    name: &str,
    exclude_id: Option<i64>,
) -> ApiResult<()> {
    let taken: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM campuses WHERE name = ? AND is_active = 1 AND id != ?",
    )
    .bind(name.trim())
    .bind(exclude_id.unwrap_or(0))
    .fetch_optional(&mut *conn)
    .await?;
    if taken.is_some() {
        return Err(ApiError::conflict("校区名称已存在"));
    }
    Ok(())
}

/// 中心校区唯一
async fn clear_main_flag(conn: &mut SqliteConnection) -> ApiResult<()> {
    sqlx::query("UPDATE campuses SET is_main_campus = 0, updated_at = ? WHERE is_main_campus = 1")
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(())
}
