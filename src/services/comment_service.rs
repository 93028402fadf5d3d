use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{
    Booking, Comment, CommentDetail, CommentStatistics, CreateCommentRequest, Pagination,
    UpdateCommentRequest, UserRole,
};
use crate::services::coach_service::{find_coach, find_coach_by_user};
use crate::services::evaluation_service::summarize_ratings;
use crate::services::student_service::{find_student, find_student_by_user};
use crate::utils::{ApiError, ApiResult, StringExt, check_campus_scope};

/// 评论创建后可修改的时限（小时）
const EDIT_WINDOW_HOURS: i64 = 24;

const COMMENT_DETAIL_SQL: &str = r#"
    SELECT cm.id, cm.booking_id, b.coach_id, b.student_id, su.real_name AS student_name,
           cu.real_name AS coach_name, cm.rating, cm.content, cm.created_at, cm.updated_at
    FROM comments cm
    JOIN bookings b ON b.id = cm.booking_id
    JOIN students s ON s.id = b.student_id
    JOIN users su ON su.id = s.user_id
    JOIN coaches c ON c.id = b.coach_id
    JOIN users cu ON cu.id = c.user_id
    WHERE 1=1"#;

/// 预约参与方
struct Parties {
    booking: Booking,
    student_user_id: i64,
    coach_user_id: i64,
}

#[derive(Clone)]
pub struct CommentService {
    pool: SqlitePool,
}

impl CommentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 学员对自己的预约打分，每个预约一条
    pub async fn create(&self, user: &CurrentUser, req: CreateCommentRequest) -> ApiResult<CommentDetail> {
        req.validate()?;
        let parties = self.parties(req.booking_id).await?;
        if parties.student_user_id != user.user_id {
            return Err(ApiError::forbidden("只有预约的学员可以评论"));
        }

        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM comments WHERE booking_id = ?")
            .bind(req.booking_id)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("该预约已评论"));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO comments (booking_id, rating, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(req.booking_id)
        .bind(req.rating)
        .bind(req.content.clean())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::info!("Comment {} created on booking {} by user {}", id, req.booking_id, user.user_id);
        self.detail(id).await
    }

    /// 仅作者本人，且在创建后 24 小时内
    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateCommentRequest,
    ) -> ApiResult<CommentDetail> {
        req.validate()?;
        let comment = self.fetch(id).await?;
        let parties = self.parties(comment.booking_id).await?;
        if parties.student_user_id != user.user_id {
            return Err(ApiError::forbidden("只能修改自己的评论"));
        }
        if Utc::now() - comment.created_at > Duration::hours(EDIT_WINDOW_HOURS) {
            return Err(ApiError::validation_error("评论发布超过24小时，无法修改"));
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE comments SET ");
        let mut set = qb.separated(", ");
        if let Some(rating) = req.rating {
            set.push("rating = ").push_bind_unseparated(rating);
        }
        if let Some(content) = req.content {
            set.push("content = ").push_bind_unseparated(content.clean());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Comment {} updated by user {}", id, user.user_id);
        self.detail(id).await
    }

    pub async fn delete(&self, user: &CurrentUser, id: i64) -> ApiResult<()> {
        let comment = self.fetch(id).await?;
        let parties = self.parties(comment.booking_id).await?;
        if parties.student_user_id != user.user_id {
            if !user.is_admin() {
                return Err(ApiError::forbidden("只能删除自己的评论"));
            }
            check_campus_scope(user, Some(parties.booking.campus_id), "管理")?;
        }

        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::warn!("Comment {} deleted by user {}", id, user.user_id);
        Ok(())
    }

    pub async fn get(&self, user: &CurrentUser, id: i64) -> ApiResult<CommentDetail> {
        let comment = self.fetch(id).await?;
        let parties = self.parties(comment.booking_id).await?;
        ensure_can_view(user, &parties)?;
        self.detail(id).await
    }

    pub async fn by_booking(&self, user: &CurrentUser, booking_id: i64) -> ApiResult<CommentDetail> {
        let parties = self.parties(booking_id).await?;
        ensure_can_view(user, &parties)?;

        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_DETAIL_SQL);
        qb.push(" AND cm.booking_id = ").push_bind(booking_id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("该预约暂无评论"))
    }

    /// 教练收到的评论；学员只能看到自己写给该教练的
    pub async fn by_coach(
        &self,
        user: &CurrentUser,
        coach_id: i64,
        page: Pagination,
    ) -> ApiResult<Vec<CommentDetail>> {
        let coach = find_coach(&self.pool, coach_id).await?;
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_DETAIL_SQL);
        qb.push(" AND b.coach_id = ").push_bind(coach_id);

        match user.role {
            UserRole::Coach if coach.user_id != user.user_id => {
                return Err(ApiError::forbidden("只能查看自己收到的评论"));
            },
            UserRole::Student => {
                qb.push(" AND s.user_id = ").push_bind(user.user_id);
            },
            UserRole::CampusAdmin => {
                qb.push(" AND b.campus_id = ").push_bind(user.campus_id);
            },
            _ => {},
        }

        self.paged(qb, page).await
    }

    /// 学员写的评论；教练只能看到写给自己的
    pub async fn by_student(
        &self,
        user: &CurrentUser,
        student_id: i64,
        page: Pagination,
    ) -> ApiResult<Vec<CommentDetail>> {
        let student = find_student(&self.pool, student_id).await?;
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_DETAIL_SQL);
        qb.push(" AND b.student_id = ").push_bind(student_id);

        match user.role {
            UserRole::Student if student.user_id != user.user_id => {
                return Err(ApiError::forbidden("只能查看自己的评论"));
            },
            UserRole::Coach => {
                qb.push(" AND c.user_id = ").push_bind(user.user_id);
            },
            UserRole::CampusAdmin => {
                qb.push(" AND b.campus_id = ").push_bind(user.campus_id);
            },
            _ => {},
        }

        self.paged(qb, page).await
    }

    /// 学员写过的或教练收到的评论
    pub async fn my_comments(&self, user: &CurrentUser, page: Pagination) -> ApiResult<Vec<CommentDetail>> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_DETAIL_SQL);
        match user.role {
            UserRole::Student => {
                let student = find_student_by_user(&self.pool, user.user_id).await?;
                qb.push(" AND b.student_id = ").push_bind(student.id);
            },
            UserRole::Coach => {
                let coach = find_coach_by_user(&self.pool, user.user_id).await?;
                qb.push(" AND b.coach_id = ").push_bind(coach.id);
            },
            _ => return Err(ApiError::forbidden("只有学员或教练有自己的评论")),
        }

        self.paged(qb, page).await
    }

    pub async fn coach_stats(&self, coach_id: i64) -> ApiResult<CommentStatistics> {
        find_coach(&self.pool, coach_id).await?;
        let rows = self.ratings("b.coach_id", coach_id).await?;
        let mut stats = to_statistics(&rows);
        stats.coach_id = Some(coach_id);
        Ok(stats)
    }

    pub async fn student_stats(&self, student_id: i64) -> ApiResult<CommentStatistics> {
        find_student(&self.pool, student_id).await?;
        let rows = self.ratings("b.student_id", student_id).await?;
        let mut stats = to_statistics(&rows);
        stats.student_id = Some(student_id);
        Ok(stats)
    }

    async fn ratings(&self, column: &str, id: i64) -> ApiResult<Vec<(Option<i64>, DateTime<Utc>)>> {
        let sql = format!(
            "SELECT cm.rating, cm.created_at FROM comments cm JOIN bookings b ON b.id = cm.booking_id WHERE {} = ?",
            column
        );
        Ok(sqlx::query_as(&sql).bind(id).fetch_all(&self.pool).await?)
    }

    async fn paged(&self, mut qb: QueryBuilder<'_, Sqlite>, page: Pagination) -> ApiResult<Vec<CommentDetail>> {
        let (limit, offset) = page.bounds();
        qb.push(" ORDER BY datetime(cm.created_at) DESC, cm.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn fetch(&self, id: i64) -> ApiResult<Comment> {
        sqlx::query_as("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("评论不存在"))
    }

    async fn detail(&self, id: i64) -> ApiResult<CommentDetail> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMMENT_DETAIL_SQL);
        qb.push(" AND cm.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("评论不存在"))
    }

    async fn parties(&self, booking_id: i64) -> ApiResult<Parties> {
        let booking: Booking = sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("预约不存在"))?;
        let student = find_student(&self.pool, booking.student_id).await?;
        let coach = find_coach(&self.pool, booking.coach_id).await?;
        Ok(Parties { booking, student_user_id: student.user_id, coach_user_id: coach.user_id })
    }
}

fn ensure_can_view(user: &CurrentUser, parties: &Parties) -> ApiResult<()> {
    if parties.student_user_id == user.user_id || parties.coach_user_id == user.user_id {
        return Ok(());
    }
    if !user.is_admin() {
        return Err(ApiError::forbidden("无权查看该评论"));
    }
    check_campus_scope(user, Some(parties.booking.campus_id), "查看")
}

fn to_statistics(rows: &[(Option<i64>, DateTime<Utc>)]) -> CommentStatistics {
    let summary = summarize_ratings(rows, Utc::now());
    CommentStatistics {
        coach_id: None,
        student_id: None,
        total_comments: summary.total,
        average_rating: summary.average,
        rating_distribution: summary.distribution,
        recent_comments: summary.recent,
    }
}
