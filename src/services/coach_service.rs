use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::config::BusinessConfig;
use crate::middleware::CurrentUser;
use crate::models::{
    ApprovalStatus, Coach, CoachDetail, CoachListQuery, CoachSearchQuery, Pagination,
    RelationDetail, RelationStatus, UpdateCoachRequest, UserRole,
};
use crate::services::coach_student_service::RELATION_DETAIL_SQL;
use crate::services::student_service::find_student_by_user;
use crate::utils::{
    ApiError, ApiResult, StringExt, campus_filter, check_campus_scope, require_admin, require_role,
    round2,
};

const COACH_DETAIL_SQL: &str = r#"
    SELECT c.id, c.user_id, u.username, u.real_name, u.gender, u.age, u.phone, u.email,
           u.avatar_url, u.campus_id, c.level, c.hourly_rate, c.achievements, c.max_students,
           c.approval_status, c.approved_at,
           (SELECT COUNT(*) FROM coach_students cs
             WHERE cs.coach_id = c.id AND cs.status = 'active') AS active_students,
           c.created_at
    FROM coaches c
    JOIN users u ON u.id = c.user_id
    WHERE 1=1"#;

pub async fn find_coach(pool: &SqlitePool, coach_id: i64) -> ApiResult<Coach> {
    sqlx::query_as("SELECT * FROM coaches WHERE id = ?")
        .bind(coach_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("教练不存在"))
}

pub async fn find_coach_by_user(pool: &SqlitePool, user_id: i64) -> ApiResult<Coach> {
    sqlx::query_as("SELECT * FROM coaches WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("教练信息不存在"))
}

#[derive(Clone)]
pub struct CoachService {
    pool: SqlitePool,
    business: BusinessConfig,
}

impl CoachService {
    pub fn new(pool: SqlitePool, business: BusinessConfig) -> Self {
        Self { pool, business }
    }

    /// 已审核通过的教练列表
    pub async fn list_coaches(&self, query: &CoachListQuery) -> ApiResult<Vec<CoachDetail>> {
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = QueryBuilder::<Sqlite>::new(COACH_DETAIL_SQL);
        qb.push(" AND u.is_active = 1 AND c.approval_status = ")
            .push_bind(ApprovalStatus::Approved.as_str());
        if let Some(campus_id) = query.campus_id {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        if let Some(level) = query.level {
            qb.push(" AND c.level = ").push_bind(level.as_str());
        }
        qb.push(" ORDER BY c.id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let coaches: Vec<CoachDetail> = qb.build_query_as().fetch_all(&self.pool).await?;
        tracing::debug!("Listed {} coaches", coaches.len());
        Ok(coaches)
    }

    pub async fn search_coaches(&self, query: &CoachSearchQuery) -> ApiResult<Vec<CoachDetail>> {
        let mut qb = QueryBuilder::<Sqlite>::new(COACH_DETAIL_SQL);
        qb.push(" AND u.is_active = 1 AND c.approval_status = ")
            .push_bind(ApprovalStatus::Approved.as_str());
        if let Some(name) = query.name.clean() {
            qb.push(" AND LOWER(u.real_name) LIKE ")
                .push_bind(format!("%{}%", name.to_lowercase()));
        }
        if let Some(gender) = query.gender.clean() {
            qb.push(" AND u.gender = ").push_bind(gender);
        }
        if let Some(age_min) = query.age_min {
            qb.push(" AND u.age >= ").push_bind(age_min);
        }
        if let Some(age_max) = query.age_max {
            qb.push(" AND u.age <= ").push_bind(age_max);
        }
        if let Some(campus_id) = query.campus_id {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY c.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn get_coach(&self, id: i64) -> ApiResult<CoachDetail> {
        let mut qb = QueryBuilder::<Sqlite>::new(COACH_DETAIL_SQL);
        qb.push(" AND c.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("教练不存在"))
    }

    /// 教练本人只能修改成绩简介，其余字段需要管理员
    pub async fn update_coach(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateCoachRequest,
    ) -> ApiResult<CoachDetail> {
        let coach = self.get_coach(id).await?;

        if user.is_admin() {
            check_campus_scope(user, coach.campus_id, "管理")?;
        } else if coach.user_id == user.user_id {
            if req.level.is_some() || req.hourly_rate.is_some() || req.max_students.is_some() {
                return Err(ApiError::forbidden("教练只能修改自己的成绩简介"));
            }
        } else {
            return Err(ApiError::forbidden("无权修改该教练信息"));
        }

        if let Some(rate) = req.hourly_rate
            && (!rate.is_finite() || rate <= 0.0)
        {
            return Err(ApiError::validation_error("课时费必须大于0"));
        }
        if let Some(max_students) = req.max_students
            && !(1..=self.business.max_students_per_coach).contains(&max_students)
        {
            return Err(ApiError::validation_error(format!(
                "学员上限必须在1-{}之间",
                self.business.max_students_per_coach
            )));
        }

        let hourly_rate = req.hourly_rate.or_else(|| req.level.map(|level| level.hourly_rate()));

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE coaches SET ");
        let mut set = qb.separated(", ");
        if let Some(level) = req.level {
            set.push("level = ").push_bind_unseparated(level.as_str());
        }
        if let Some(rate) = hourly_rate {
            set.push("hourly_rate = ").push_bind_unseparated(round2(rate));
        }
        if let Some(achievements) = req.achievements {
            set.push("achievements = ").push_bind_unseparated(achievements.clean());
        }
        if let Some(max_students) = req.max_students {
            set.push("max_students = ").push_bind_unseparated(max_students);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Coach {} updated by user {}", id, user.user_id);
        self.get_coach(id).await
    }

    pub async fn approve_coach(&self, user: &CurrentUser, id: i64, approved: bool) -> ApiResult<CoachDetail> {
        require_admin(user)?;
        let coach = self.get_coach(id).await?;
        check_campus_scope(user, coach.campus_id, "审核")?;

        let status = if approved { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
        let now = Utc::now();
        sqlx::query(
            "UPDATE coaches SET approval_status = ?, approved_by = ?, approved_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(user.user_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        tracing::info!("Coach {} {} by {}", id, status, user.user_id);
        self.get_coach(id).await
    }

    pub async fn pending_coaches(&self, user: &CurrentUser) -> ApiResult<Vec<CoachDetail>> {
        require_admin(user)?;
        let mut qb = QueryBuilder::<Sqlite>::new(COACH_DETAIL_SQL);
        qb.push(" AND c.approval_status = ").push_bind(ApprovalStatus::Pending.as_str());
        if let Some(campus_id) = campus_filter(user) {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY datetime(c.created_at), c.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    /// 教练当前在带的学员
    pub async fn coach_students(&self, coach_id: i64) -> ApiResult<Vec<RelationDetail>> {
        find_coach(&self.pool, coach_id).await?;
        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.coach_id = ")
            .push_bind(coach_id)
            .push(" AND cs.status = ")
            .push_bind(RelationStatus::Active.as_str())
            .push(" ORDER BY cs.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn my_students(&self, user: &CurrentUser) -> ApiResult<Vec<RelationDetail>> {
        require_role(user, &[UserRole::Coach])?;
        let coach = find_coach_by_user(&self.pool, user.user_id).await?;
        self.coach_students(coach.id).await
    }

    /// 当前学员可申请的教练：已审核、未满员、且与该学员没有待审或生效中的关系
    pub async fn available_coaches(&self, user: &CurrentUser, campus_id: i64) -> ApiResult<Vec<CoachDetail>> {
        require_role(user, &[UserRole::Student])?;
        let student = find_student_by_user(&self.pool, user.user_id).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(COACH_DETAIL_SQL);
        qb.push(" AND u.is_active = 1 AND c.approval_status = ")
            .push_bind(ApprovalStatus::Approved.as_str())
            .push(" AND u.campus_id = ")
            .push_bind(campus_id)
            .push(
                " AND (SELECT COUNT(*) FROM coach_students cs WHERE cs.coach_id = c.id AND cs.status = 'active') < MIN(c.max_students, ",
            )
            .push_bind(self.business.max_students_per_coach)
            .push(")")
            .push(
                " AND NOT EXISTS (SELECT 1 FROM coach_students cs WHERE cs.coach_id = c.id AND cs.student_id = ",
            )
            .push_bind(student.id)
            .push(" AND cs.status IN ('pending', 'active', 'pending_change'))")
            .push(" ORDER BY c.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }
}
