use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{
    Course, CreateEvaluationRequest, Evaluation, EvaluationStatistics, EvaluatorType, Pagination,
    PendingEvaluation, UpdateEvaluationRequest,
};
use crate::services::coach_service::find_coach;
use crate::services::student_service::find_student;
use crate::utils::{ApiError, ApiResult, campus_filter, check_campus_scope, round2};

/// 评分汇总，`recent` 为近 30 天的数量
pub struct RatingSummary {
    pub total: i64,
    pub average: f64,
    pub distribution: BTreeMap<String, i64>,
    pub recent: i64,
}

/// 平均分只统计有评分的记录
pub fn summarize_ratings(rows: &[(Option<i64>, DateTime<Utc>)], now: DateTime<Utc>) -> RatingSummary {
    let mut distribution: BTreeMap<String, i64> = (1..=5).map(|r| (r.to_string(), 0)).collect();
    let recent_since = now - Duration::days(30);

    let mut rated = 0i64;
    let mut sum = 0i64;
    let mut recent = 0i64;
    for (rating, created_at) in rows {
        if let Some(rating) = rating {
            rated += 1;
            sum += rating;
            *distribution.entry(rating.to_string()).or_default() += 1;
        }
        if *created_at >= recent_since {
            recent += 1;
        }
    }

    let average = if rated > 0 { round2(sum as f64 / rated as f64) } else { 0.0 };
    RatingSummary { total: rows.len() as i64, average, distribution, recent }
}

#[derive(Clone)]
pub struct EvaluationService {
    pool: SqlitePool,
}

impl EvaluationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 课程的学员或教练评价一次，评价人类型由身份决定
    pub async fn create(&self, user: &CurrentUser, req: CreateEvaluationRequest) -> ApiResult<Evaluation> {
        req.validate()?;
        let course = self.course(req.course_id).await?;
        let evaluator_type = self
            .participant_type(user, &course)
            .await?
            .ok_or_else(|| ApiError::forbidden("只有课程的学员或教练可以评价"))?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM evaluations WHERE course_id = ? AND evaluator_id = ?")
                .bind(course.id)
                .bind(user.user_id)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("您已评价过该课程"));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO evaluations (course_id, evaluator_id, evaluator_type, content, rating, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(course.id)
        .bind(user.user_id)
        .bind(evaluator_type.as_str())
        .bind(req.content.trim())
        .bind(req.rating)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::info!("Evaluation {} created for course {} by user {}", id, course.id, user.user_id);
        self.fetch(id).await
    }

    pub async fn list(&self, user: &CurrentUser, page: Pagination) -> ApiResult<Vec<Evaluation>> {
        let (limit, offset) = page.bounds();
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT e.* FROM evaluations e JOIN courses c ON c.id = e.course_id WHERE 1=1",
        );
        if user.is_admin() {
            if let Some(campus_id) = campus_filter(user) {
                qb.push(" AND c.campus_id = ").push_bind(campus_id);
            }
        } else {
            qb.push(" AND e.evaluator_id = ").push_bind(user.user_id);
        }
        qb.push(" ORDER BY datetime(e.created_at) DESC, e.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: i64) -> ApiResult<Evaluation> {
        let evaluation = self.fetch(id).await?;
        if evaluation.evaluator_id != user.user_id {
            let course = self.course(evaluation.course_id).await?;
            self.ensure_can_view_course(user, &course).await?;
        }
        Ok(evaluation)
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateEvaluationRequest,
    ) -> ApiResult<Evaluation> {
        req.validate()?;
        let evaluation = self.fetch(id).await?;
        self.ensure_owner_or_admin(user, &evaluation).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE evaluations SET ");
        let mut set = qb.separated(", ");
        if let Some(content) = req.content {
            set.push("content = ").push_bind_unseparated(content.trim().to_string());
        }
        if let Some(rating) = req.rating {
            set.push("rating = ").push_bind_unseparated(rating);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Evaluation {} updated by user {}", id, user.user_id);
        self.fetch(id).await
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> ApiResult<()> {
        let evaluation = self.fetch(id).await?;
        self.ensure_owner_or_admin(user, &evaluation).await?;

        sqlx::query("DELETE FROM evaluations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::warn!("Evaluation {} deleted by user {}", id, user.user_id);
        Ok(())
    }

    pub async fn for_course(&self, user: &CurrentUser, course_id: i64) -> ApiResult<Vec<Evaluation>> {
        let course = self.course(course_id).await?;
        self.ensure_can_view_course(user, &course).await?;

        Ok(sqlx::query_as("SELECT * FROM evaluations WHERE course_id = ? ORDER BY id")
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// 当前用户参与过、但尚未评价的课程
    pub async fn pending(&self, user: &CurrentUser) -> ApiResult<Vec<PendingEvaluation>> {
        Ok(sqlx::query_as(
            r#"
            SELECT c.id AS course_id, c.booking_id, c.coach_id, c.student_id, c.start_time, c.end_time,
                   CASE WHEN su.id = ? THEN 'student' ELSE 'coach' END AS evaluator_type
            FROM courses c
            JOIN students s ON s.id = c.student_id
            JOIN users su ON su.id = s.user_id
            JOIN coaches co ON co.id = c.coach_id
            WHERE (s.user_id = ? OR co.user_id = ?)
              AND NOT EXISTS (
                  SELECT 1 FROM evaluations e WHERE e.course_id = c.id AND e.evaluator_id = ?
              )
            ORDER BY datetime(c.end_time) DESC, c.id DESC
            "#,
        )
        .bind(user.user_id)
        .bind(user.user_id)
        .bind(user.user_id)
        .bind(user.user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// 当前用户作为评价人的统计
    pub async fn statistics(&self, user: &CurrentUser) -> ApiResult<EvaluationStatistics> {
        let rows: Vec<(Option<i64>, DateTime<Utc>)> =
            sqlx::query_as("SELECT rating, created_at FROM evaluations WHERE evaluator_id = ?")
                .bind(user.user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(to_statistics(None, &rows))
    }

    /// 学员对某教练课程的评价汇总
    pub async fn coach_summary(&self, coach_id: i64) -> ApiResult<EvaluationStatistics> {
        find_coach(&self.pool, coach_id).await?;
        let rows: Vec<(Option<i64>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT e.rating, e.created_at FROM evaluations e
            JOIN courses c ON c.id = e.course_id
            WHERE c.coach_id = ? AND e.evaluator_type = 'student'
            "#,
        )
        .bind(coach_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(to_statistics(Some(coach_id), &rows))
    }

    async fn fetch(&self, id: i64) -> ApiResult<Evaluation> {
        sqlx::query_as("SELECT * FROM evaluations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("评价不存在"))
    }

    async fn course(&self, id: i64) -> ApiResult<Course> {
        sqlx::query_as("SELECT * FROM courses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("课程不存在"))
    }

    async fn participant_type(&self, user: &CurrentUser, course: &Course) -> ApiResult<Option<EvaluatorType>> {
        let student = find_student(&self.pool, course.student_id).await?;
        if student.user_id == user.user_id {
            return Ok(Some(EvaluatorType::Student));
        }
        let coach = find_coach(&self.pool, course.coach_id).await?;
        if coach.user_id == user.user_id {
            return Ok(Some(EvaluatorType::Coach));
        }
        Ok(None)
    }

    async fn ensure_can_view_course(&self, user: &CurrentUser, course: &Course) -> ApiResult<()> {
        if user.is_admin() {
            return check_campus_scope(user, Some(course.campus_id), "查看");
        }
        if self.participant_type(user, course).await?.is_none() {
            return Err(ApiError::forbidden("无权查看该课程的评价"));
        }
        Ok(())
    }

    async fn ensure_owner_or_admin(&self, user: &CurrentUser, evaluation: &Evaluation) -> ApiResult<()> {
        if evaluation.evaluator_id == user.user_id {
            return Ok(());
        }
        if !user.is_admin() {
            return Err(ApiError::forbidden("只能修改自己的评价"));
        }
        let course = self.course(evaluation.course_id).await?;
        check_campus_scope(user, Some(course.campus_id), "管理")
    }
}

fn to_statistics(coach_id: Option<i64>, rows: &[(Option<i64>, DateTime<Utc>)]) -> EvaluationStatistics {
    let summary = summarize_ratings(rows, Utc::now());
    EvaluationStatistics {
        coach_id,
        total_evaluations: summary.total,
        average_rating: summary.average,
        rating_distribution: summary.distribution,
        recent_evaluations: summary.recent,
    }
}
