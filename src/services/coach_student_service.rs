use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::config::BusinessConfig;
use crate::middleware::CurrentUser;
use crate::models::{
    ApplyCoachRequest, ApprovalStatus, ApproveRelationRequest, ChangeCoachRequest, Coach,
    CoachStudent, NotificationType, RelationDetail, RelationStatus, UserRole,
};
use crate::services::NotificationService;
use crate::services::coach_service::{find_coach, find_coach_by_user};
use crate::services::student_service::{find_student, find_student_by_user};
use crate::utils::{ApiError, ApiResult, StringExt, campus_filter, check_campus_scope, require_role};

/// 双选关系连同教练、学员姓名；校区取教练所在校区
pub(crate) const RELATION_DETAIL_SQL: &str = r#"
    SELECT cs.id, cs.coach_id, cu.id AS coach_user_id, cu.real_name AS coach_name,
           c.level AS coach_level, cs.student_id, su.id AS student_user_id,
           su.real_name AS student_name, cu.campus_id AS campus_id, cs.status, cs.applied_by,
           cs.application_message, cs.response_message, cs.replaces_relation_id,
           cs.created_at, cs.responded_at
    FROM coach_students cs
    JOIN coaches c ON c.id = cs.coach_id
    JOIN users cu ON cu.id = c.user_id
    JOIN students s ON s.id = cs.student_id
    JOIN users su ON su.id = s.user_id
    WHERE 1=1"#;

/// 仍占用名额或等待处理的状态，同一对师生之间只能有一条
const OPEN_STATUSES: &str = "('pending', 'active', 'pending_change')";

#[derive(Clone)]
pub struct CoachStudentService {
    pool: SqlitePool,
    business: BusinessConfig,
    notification_service: Arc<NotificationService>,
}

impl CoachStudentService {
    pub fn new(
        pool: SqlitePool,
        business: BusinessConfig,
        notification_service: Arc<NotificationService>,
    ) -> Self {
        Self { pool, business, notification_service }
    }

    /// 学员向教练提交双选申请
    pub async fn apply(&self, user: &CurrentUser, req: ApplyCoachRequest) -> ApiResult<RelationDetail> {
        require_role(user, &[UserRole::Student])?;
        let student = find_student_by_user(&self.pool, user.user_id).await?;
        let coach = find_coach(&self.pool, req.coach_id).await?;
        ensure_approved(&coach)?;

        let coach_cap = self.coach_cap(&coach);
        let student_cap = student.max_coaches.min(self.business.max_coaches_per_student);

        if self.student_active_count(student.id, None).await? >= student_cap {
            return Err(ApiError::validation_error(format!("每位学员最多选择{}名教练", student_cap)));
        }
        if self.open_relation_exists(coach.id, student.id).await? {
            return Err(ApiError::conflict("已存在与该教练的申请或双选关系"));
        }
        if self.coach_active_count(coach.id).await? >= coach_cap {
            return Err(ApiError::validation_error(format!("该教练学员已满（{}人）", coach_cap)));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO coach_students
                (coach_id, student_id, status, applied_by, application_message, created_at, updated_at)
            VALUES (?, ?, ?, 'student', ?, ?, ?)
            "#,
        )
        .bind(coach.id)
        .bind(student.id)
        .bind(RelationStatus::Pending.as_str())
        .bind(req.message.clean())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::info!("Student {} applied to coach {} (relation {})", student.id, coach.id, id);

        let detail = self.relation_detail(id).await?;
        self.notification_service
            .notify(
                coach.user_id,
                NotificationType::CoachStudent,
                "新的双选申请",
                format!("学员{}申请成为您的学员", detail.student_name),
                Some(("coach_student", id)),
            )
            .await;

        Ok(detail)
    }

    /// 教练或管理员审批申请（含更换教练申请）
    pub async fn approve(
        &self,
        user: &CurrentUser,
        id: i64,
        req: ApproveRelationRequest,
    ) -> ApiResult<RelationDetail> {
        let relation = self.fetch(id).await?;
        let coach = find_coach(&self.pool, relation.coach_id).await?;
        self.ensure_coach_or_admin(user, &coach).await?;

        let status: RelationStatus = relation.status.parse()?;
        if !matches!(status, RelationStatus::Pending | RelationStatus::PendingChange) {
            return Err(ApiError::validation_error("该申请已处理"));
        }

        if req.approved {
            let coach_cap = self.coach_cap(&coach);
            if self.coach_active_count(coach.id).await? >= coach_cap {
                return Err(ApiError::validation_error(format!("该教练学员已满（{}人）", coach_cap)));
            }
            let student = find_student(&self.pool, relation.student_id).await?;
            let student_cap = student.max_coaches.min(self.business.max_coaches_per_student);
            let current = self
                .student_active_count(student.id, relation.replaces_relation_id)
                .await?;
            if current >= student_cap {
                return Err(ApiError::validation_error(format!("该学员已有{}名教练", current)));
            }
        }

        let new_status = if req.approved { RelationStatus::Active } else { RelationStatus::Rejected };
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE coach_students
            SET status = ?, response_message = ?, responded_by = ?, responded_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(req.response_message.clean())
        .bind(user.user_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("该申请已处理"));
        }

        // 被替换的旧关系只在仍处于 changing 时跟随处理
        if status == RelationStatus::PendingChange
            && let Some(old_id) = relation.replaces_relation_id
        {
            if req.approved {
                sqlx::query(
                    "UPDATE coach_students SET status = ?, deleted_at = ?, updated_at = ? WHERE id = ? AND status = 'changing'",
                )
                .bind(RelationStatus::Deleted.as_str())
                .bind(now)
                .bind(now)
                .bind(old_id)
                .execute(&mut *tx)
                .await?;
            } else {
                restore_replaced(&mut tx, old_id).await?;
            }
        }
        tx.commit().await?;

        tracing::info!("Relation {} {} by user {}", id, new_status, user.user_id);

        let detail = self.relation_detail(id).await?;
        let (title, verdict) = if req.approved { ("双选申请已通过", "通过") } else { ("双选申请被拒绝", "拒绝") };
        self.notification_service
            .notify(
                detail.student_user_id,
                NotificationType::CoachStudent,
                title,
                format!("教练{}已{}您的申请", detail.coach_name, verdict),
                Some(("coach_student", id)),
            )
            .await;

        Ok(detail)
    }

    /// 更换教练：原关系转为 changing，新建 pending_change 申请
    pub async fn request_change(
        &self,
        user: &CurrentUser,
        req: ChangeCoachRequest,
    ) -> ApiResult<RelationDetail> {
        require_role(user, &[UserRole::Student])?;
        if req.old_coach_id == req.new_coach_id {
            return Err(ApiError::validation_error("新教练不能与原教练相同"));
        }
        let student = find_student_by_user(&self.pool, user.user_id).await?;

        let old: Option<CoachStudent> = sqlx::query_as(
            "SELECT * FROM coach_students WHERE coach_id = ? AND student_id = ? AND status = 'active'",
        )
        .bind(req.old_coach_id)
        .bind(student.id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(old) = old else {
            return Err(ApiError::validation_error("与原教练没有生效的双选关系"));
        };

        let new_coach = find_coach(&self.pool, req.new_coach_id).await?;
        ensure_approved(&new_coach)?;
        let coach_cap = self.coach_cap(&new_coach);
        if self.coach_active_count(new_coach.id).await? >= coach_cap {
            return Err(ApiError::validation_error(format!("该教练学员已满（{}人）", coach_cap)));
        }
        if self.open_relation_exists(new_coach.id, student.id).await? {
            return Err(ApiError::conflict("已存在与该教练的申请或双选关系"));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE coach_students SET status = ?, updated_at = ? WHERE id = ?")
            .bind(RelationStatus::Changing.as_str())
            .bind(now)
            .bind(old.id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            r#"
            INSERT INTO coach_students
                (coach_id, student_id, status, applied_by, application_message,
                 replaces_relation_id, created_at, updated_at)
            VALUES (?, ?, ?, 'student', ?, ?, ?, ?)
            "#,
        )
        .bind(new_coach.id)
        .bind(student.id)
        .bind(RelationStatus::PendingChange.as_str())
        .bind(req.message.clean())
        .bind(old.id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        tracing::info!(
            "Student {} requested coach change {} -> {} (relation {})",
            student.id,
            req.old_coach_id,
            req.new_coach_id,
            id
        );

        let detail = self.relation_detail(id).await?;
        self.notification_service
            .notify(
                new_coach.user_id,
                NotificationType::CoachStudent,
                "新的更换教练申请",
                format!("学员{}申请更换为您的学员", detail.student_name),
                Some(("coach_student", id)),
            )
            .await;

        Ok(detail)
    }

    pub async fn list_for_student(&self, user: &CurrentUser, student_id: i64) -> ApiResult<Vec<RelationDetail>> {
        let student = find_student(&self.pool, student_id).await?;
        if student.user_id != user.user_id {
            let campus_id = self.user_campus(student.user_id).await?;
            require_admin_scope(user, campus_id)?;
        }

        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.student_id = ")
            .push_bind(student_id)
            .push(" AND cs.status != 'deleted' ORDER BY cs.id DESC");
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn list_for_coach(&self, user: &CurrentUser, coach_id: i64) -> ApiResult<Vec<RelationDetail>> {
        let coach = find_coach(&self.pool, coach_id).await?;
        if coach.user_id != user.user_id {
            let campus_id = self.user_campus(coach.user_id).await?;
            require_admin_scope(user, campus_id)?;
        }

        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.coach_id = ")
            .push_bind(coach_id)
            .push(" AND cs.status != 'deleted' ORDER BY cs.id DESC");
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    /// 待处理的申请：教练看发给自己的，学员看自己提交的，管理员看本校区
    pub async fn pending_approvals(&self, user: &CurrentUser) -> ApiResult<Vec<RelationDetail>> {
        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.status IN ('pending', 'pending_change')");

        match user.role {
            UserRole::Coach => {
                let coach = find_coach_by_user(&self.pool, user.user_id).await?;
                qb.push(" AND cs.coach_id = ").push_bind(coach.id);
            },
            UserRole::Student => {
                let student = find_student_by_user(&self.pool, user.user_id).await?;
                qb.push(" AND cs.student_id = ").push_bind(student.id);
            },
            UserRole::SuperAdmin | UserRole::CampusAdmin => {
                if let Some(campus_id) = campus_filter(user) {
                    qb.push(" AND cu.campus_id = ").push_bind(campus_id);
                }
            },
        }
        qb.push(" ORDER BY datetime(cs.created_at), cs.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    /// 解除关系（软删除）
    pub async fn delete(&self, user: &CurrentUser, id: i64) -> ApiResult<()> {
        let relation = self.fetch(id).await?;
        if relation.status == RelationStatus::Deleted.as_str() {
            return Err(ApiError::not_found("双选关系不存在"));
        }

        let coach = find_coach(&self.pool, relation.coach_id).await?;
        let student = find_student(&self.pool, relation.student_id).await?;
        if coach.user_id != user.user_id && student.user_id != user.user_id {
            let campus_id = self.user_campus(coach.user_id).await?;
            require_admin_scope(user, campus_id)?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE coach_students SET status = ?, deleted_at = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(RelationStatus::Deleted.as_str())
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(&relation.status)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("双选关系状态已变更，请刷新后重试"));
        }

        match relation.status.parse::<RelationStatus>()? {
            // 撤回更换申请，原关系恢复生效
            RelationStatus::PendingChange => {
                if let Some(old_id) = relation.replaces_relation_id {
                    restore_replaced(&mut tx, old_id).await?;
                }
            },
            // 原关系已解除，挂在它上面的更换申请一并作废
            RelationStatus::Changing => {
                sqlx::query(
                    r#"
                    UPDATE coach_students SET status = ?, deleted_at = ?, updated_at = ?
                    WHERE replaces_relation_id = ? AND status = 'pending_change'
                    "#,
                )
                .bind(RelationStatus::Deleted.as_str())
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            },
            _ => {},
        }
        tx.commit().await?;

        tracing::warn!("Relation {} deleted by user {}", id, user.user_id);
        Ok(())
    }

    pub async fn relation_detail(&self, id: i64) -> ApiResult<RelationDetail> {
        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("双选关系不存在"))
    }

    async fn fetch(&self, id: i64) -> ApiResult<CoachStudent> {
        sqlx::query_as("SELECT * FROM coach_students WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("双选关系不存在"))
    }

    fn coach_cap(&self, coach: &Coach) -> i64 {
        coach.max_students.min(self.business.max_students_per_coach)
    }

    async fn coach_active_count(&self, coach_id: i64) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coach_students WHERE coach_id = ? AND status = 'active'",
        )
        .bind(coach_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// 学员占用的教练名额；更换中的旧关系也占名额，审批更换时排除被替换的那条
    async fn student_active_count(&self, student_id: i64, exclude_id: Option<i64>) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM coach_students WHERE student_id = ? AND status IN ('active', 'changing') AND id != ?",
        )
        .bind(student_id)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn open_relation_exists(&self, coach_id: i64, student_id: i64) -> ApiResult<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM coach_students WHERE coach_id = ? AND student_id = ? AND status IN {}",
            OPEN_STATUSES
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(coach_id)
            .bind(student_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn user_campus(&self, user_id: i64) -> ApiResult<Option<i64>> {
        let campus_id: Option<Option<i64>> = sqlx::query_scalar("SELECT campus_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        campus_id.ok_or_else(|| ApiError::not_found("用户不存在"))
    }

    async fn ensure_coach_or_admin(&self, user: &CurrentUser, coach: &Coach) -> ApiResult<()> {
        if coach.user_id == user.user_id {
            return Ok(());
        }
        let campus_id = self.user_campus(coach.user_id).await?;
        require_admin_scope(user, campus_id)
    }
}

async fn restore_replaced(tx: &mut Transaction<'_, Sqlite>, old_id: i64) -> ApiResult<()> {
    sqlx::query("UPDATE coach_students SET status = ?, updated_at = ? WHERE id = ? AND status = 'changing'")
        .bind(RelationStatus::Active.as_str())
        .bind(Utc::now())
        .bind(old_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn ensure_approved(coach: &Coach) -> ApiResult<()> {
    if coach.approval_status != ApprovalStatus::Approved.as_str() {
        return Err(ApiError::validation_error("该教练尚未通过审核"));
    }
    Ok(())
}

fn require_admin_scope(user: &CurrentUser, campus_id: Option<i64>) -> ApiResult<()> {
    if !user.is_admin() {
        return Err(ApiError::forbidden("无权操作该双选关系"));
    }
    check_campus_scope(user, campus_id, "管理")
}
