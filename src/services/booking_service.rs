use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::config::BusinessConfig;
use crate::middleware::CurrentUser;
use crate::models::{
    AvailableTables, Booking, BookingAction, BookingListQuery, BookingStatus,
    CancelBookingRequest, CompleteBookingRequest, CreateBookingRequest, MonthlyStatistics,
    NotificationType, Pagination, PaymentType, RespondBookingRequest, ScheduleEntry, UserRole,
};
use crate::services::NotificationService;
use crate::services::coach_service::{find_coach, find_coach_by_user};
use crate::services::payment_service::{balance_on, deduct_on, refund_on};
use crate::services::student_service::{find_student, find_student_by_user};
use crate::utils::{ApiError, ApiResult, StringExt, check_campus_scope, round2};

/// 球台编号：桌01、桌02 ...
pub fn table_label(n: u32) -> String {
    format!("桌{:02}", n)
}

/// 在占用集合之外分配球台；指定了球台时只校验该球台
pub fn pick_table(table_count: u32, taken: &HashSet<String>, requested: Option<&str>) -> ApiResult<String> {
    if let Some(requested) = requested {
        let valid = (1..=table_count).any(|n| table_label(n) == requested);
        if !valid {
            return Err(ApiError::validation_error(format!("无效的球台编号: {}", requested)));
        }
        if taken.contains(requested) {
            return Err(ApiError::conflict("该球台在此时段已被占用"));
        }
        return Ok(requested.to_string());
    }

    (1..=table_count)
        .map(table_label)
        .find(|label| !taken.contains(label))
        .ok_or_else(|| ApiError::conflict("该时段没有空闲球台"))
}

/// 课时（小时），按分钟折算
pub fn duration_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_minutes() as f64 / 60.0
}

fn month_start(year: i32, month: u32) -> ApiResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ApiError::validation_error(format!("无效的年月: {}-{}", year, month)))
}

/// 列表和统计的角色范围
enum Scope {
    Student(i64),
    Coach(i64),
    Campus(Option<i64>),
    All,
}

impl Scope {
    fn push(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Scope::Student(id) => {
                qb.push(" AND student_id = ").push_bind(*id);
            },
            Scope::Coach(id) => {
                qb.push(" AND coach_id = ").push_bind(*id);
            },
            Scope::Campus(campus_id) => {
                qb.push(" AND campus_id = ").push_bind(*campus_id);
            },
            Scope::All => {},
        }
    }
}

#[derive(Clone)]
pub struct BookingService {
    pool: SqlitePool,
    business: BusinessConfig,
    notification_service: Arc<NotificationService>,
}

impl BookingService {
    pub fn new(
        pool: SqlitePool,
        business: BusinessConfig,
        notification_service: Arc<NotificationService>,
    ) -> Self {
        Self { pool, business, notification_service }
    }

    /// 学员预约课程，校验顺序固定
    pub async fn create(&self, user: &CurrentUser, req: CreateBookingRequest) -> ApiResult<Booking> {
        if user.role != UserRole::Student {
            return Err(ApiError::forbidden("只有学员可以预约课程"));
        }
        let student = find_student_by_user(&self.pool, user.user_id).await?;

        let related: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM coach_students WHERE coach_id = ? AND student_id = ? AND status = 'active'",
        )
        .bind(req.coach_id)
        .bind(student.id)
        .fetch_optional(&self.pool)
        .await?;
        if related.is_none() {
            return Err(ApiError::forbidden("您与该教练没有建立双选关系"));
        }

        let coach = find_coach(&self.pool, req.coach_id).await?;
        let campus: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM campuses WHERE id = ?")
            .bind(req.campus_id)
            .fetch_optional(&self.pool)
            .await?;
        if !matches!(campus, Some((true,))) {
            return Err(ApiError::not_found("校区不存在"));
        }

        if req.end_time <= req.start_time {
            return Err(ApiError::validation_error("结束时间必须晚于开始时间"));
        }
        if req.end_time - req.start_time < Duration::minutes(1) {
            return Err(ApiError::validation_error("预约时长不能少于1分钟"));
        }
        let now = Utc::now();
        if req.start_time <= now {
            return Err(ApiError::validation_error("预约时间必须晚于当前时间"));
        }
        if req.start_time > now + Duration::days(self.business.booking_window_days) {
            return Err(ApiError::validation_error(format!(
                "最多只能预约{}天内的课程",
                self.business.booking_window_days
            )));
        }

        let overlapping: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM bookings
            WHERE coach_id = ? AND status IN ('pending', 'confirmed')
              AND datetime(start_time) < datetime(?) AND datetime(end_time) > datetime(?)
            "#,
        )
        .bind(coach.id)
        .bind(req.end_time)
        .bind(req.start_time)
        .fetch_one(&self.pool)
        .await?;
        if overlapping > 0 {
            return Err(ApiError::conflict("该教练在此时段已有预约"));
        }

        let taken = self.taken_tables(req.campus_id, req.start_time, req.end_time).await?;
        let requested = req.table_number.clean();
        let table = pick_table(self.business.table_count, &taken, requested.as_deref())?;

        let duration = duration_hours(req.start_time, req.end_time);
        let total_cost = round2(coach.hourly_rate * duration);
        if total_cost <= 0.0 {
            return Err(ApiError::validation_error("课时费用必须大于0"));
        }

        let mut conn = self.pool.acquire().await?;
        let balance = balance_on(&mut conn, user.user_id).await?;
        drop(conn);
        if balance < total_cost {
            return Err(ApiError::validation_error("账户余额不足，请先充值"));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO bookings
                (coach_id, student_id, campus_id, table_number, start_time, end_time,
                 duration_hours, hourly_rate, total_cost, status, booking_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(coach.id)
        .bind(student.id)
        .bind(req.campus_id)
        .bind(&table)
        .bind(req.start_time)
        .bind(req.end_time)
        .bind(duration)
        .bind(coach.hourly_rate)
        .bind(total_cost)
        .bind(BookingStatus::Pending.as_str())
        .bind(req.booking_message.clean())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::info!(
            "Booking {} created by student {} with coach {} at {} ({}h, {:.2})",
            id,
            student.id,
            coach.id,
            table,
            duration,
            total_cost
        );

        self.notification_service
            .notify(
                coach.user_id,
                NotificationType::Booking,
                "新的课程预约",
                format!(
                    "有学员预约了{}的课程（{}），请及时处理",
                    req.start_time.format("%Y-%m-%d %H:%M"),
                    table
                ),
                Some(("booking", id)),
            )
            .await;

        self.fetch(id).await
    }

    /// 教练确认或拒绝；确认时在同一事务里扣费
    pub async fn respond(
        &self,
        user: &CurrentUser,
        id: i64,
        req: RespondBookingRequest,
    ) -> ApiResult<Booking> {
        let booking = self.fetch(id).await?;
        let coach = find_coach(&self.pool, booking.coach_id).await?;
        if coach.user_id != user.user_id {
            if !user.is_admin() {
                return Err(ApiError::forbidden("只有该预约的教练可以处理"));
            }
            check_campus_scope(user, Some(booking.campus_id), "处理")?;
        }

        if booking.status != BookingStatus::Pending.as_str() {
            return Err(ApiError::validation_error("只能处理待确认的预约"));
        }
        let student = find_student(&self.pool, booking.student_id).await?;

        let new_status = match req.action {
            BookingAction::Confirm => BookingStatus::Confirmed,
            BookingAction::Reject => BookingStatus::Rejected,
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE bookings SET status = ?, response_message = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(new_status.as_str())
        .bind(req.message.clean())
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("只能处理待确认的预约"));
        }

        if new_status == BookingStatus::Confirmed {
            deduct_on(
                &mut tx,
                student.user_id,
                booking.total_cost,
                PaymentType::Booking,
                Some(id),
                "课程预约扣费",
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!("Booking {} {} by user {}", id, new_status, user.user_id);

        let (title, verdict) = match new_status {
            BookingStatus::Confirmed => ("预约已确认", "确认"),
            _ => ("预约被拒绝", "拒绝"),
        };
        self.notification_service
            .notify(
                student.user_id,
                NotificationType::Booking,
                title,
                format!(
                    "您{}的课程预约已被教练{}",
                    booking.start_time.format("%Y-%m-%d %H:%M"),
                    verdict
                ),
                Some(("booking", id)),
            )
            .await;

        self.fetch(id).await
    }

    /// 取消预约；已确认的预约退回课时费
    pub async fn cancel(&self, user: &CurrentUser, id: i64, req: CancelBookingRequest) -> ApiResult<Booking> {
        let booking = self.fetch(id).await?;
        let student = find_student(&self.pool, booking.student_id).await?;
        let coach = find_coach(&self.pool, booking.coach_id).await?;

        let is_student = student.user_id == user.user_id;
        let is_coach = coach.user_id == user.user_id;
        if !is_student && !is_coach {
            if !user.is_admin() {
                return Err(ApiError::forbidden("无权取消该预约"));
            }
            check_campus_scope(user, Some(booking.campus_id), "取消")?;
        }

        let previous: BookingStatus = booking.status.parse()?;
        if !matches!(previous, BookingStatus::Pending | BookingStatus::Confirmed) {
            return Err(ApiError::validation_error("只能取消待确认或已确认的预约"));
        }

        let now = Utc::now();
        if booking.start_time - now < Duration::hours(self.business.cancellation_lead_hours) {
            return Err(ApiError::validation_error(format!(
                "距离上课不足{}小时，无法取消",
                self.business.cancellation_lead_hours
            )));
        }

        let used = self.monthly_cancellations(user.user_id).await?;
        if used >= self.business.monthly_cancellation_limit {
            return Err(ApiError::validation_error(format!(
                "本月取消次数已达上限（{}次）",
                self.business.monthly_cancellation_limit
            )));
        }

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, cancelled_by = ?, cancelled_at = ?, cancellation_reason = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(BookingStatus::Cancelled.as_str())
        .bind(user.user_id)
        .bind(now)
        .bind(req.reason.clean())
        .bind(now)
        .bind(id)
        .bind(previous.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("预约状态已变更，请刷新后重试"));
        }

        if previous == BookingStatus::Confirmed {
            refund_on(
                &mut tx,
                student.user_id,
                booking.total_cost,
                Some(id),
                "取消预约退款",
                Some(user.user_id),
            )
            .await?;
        }
        tx.commit().await?;

        tracing::info!(
            "Booking {} cancelled by user {} (was {}, refund: {})",
            id,
            user.user_id,
            previous,
            previous == BookingStatus::Confirmed
        );

        let content = format!(
            "{}的课程预约已被取消",
            booking.start_time.format("%Y-%m-%d %H:%M")
        );
        let recipients: Vec<i64> = if is_student {
            vec![coach.user_id]
        } else if is_coach {
            vec![student.user_id]
        } else {
            vec![student.user_id, coach.user_id]
        };
        for recipient in recipients {
            self.notification_service
                .notify(
                    recipient,
                    NotificationType::Booking,
                    "预约已取消",
                    content.clone(),
                    Some(("booking", id)),
                )
                .await;
        }

        self.fetch(id).await
    }

    /// 课程结束后标记完成并生成课程记录
    pub async fn complete(
        &self,
        user: &CurrentUser,
        id: i64,
        req: CompleteBookingRequest,
    ) -> ApiResult<Booking> {
        let booking = self.fetch(id).await?;
        let coach = find_coach(&self.pool, booking.coach_id).await?;
        if coach.user_id != user.user_id {
            if !user.is_admin() {
                return Err(ApiError::forbidden("只有该预约的教练可以完成课程"));
            }
            check_campus_scope(user, Some(booking.campus_id), "处理")?;
        }

        if booking.status != BookingStatus::Confirmed.as_str() {
            return Err(ApiError::validation_error("只能完成已确认的预约"));
        }
        let now = Utc::now();
        if booking.end_time > now {
            return Err(ApiError::validation_error("课程尚未结束"));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(BookingStatus::Completed.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO courses
                (booking_id, coach_id, student_id, campus_id, table_number, start_time, end_time,
                 duration_hours, total_cost, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(booking.id)
        .bind(booking.coach_id)
        .bind(booking.student_id)
        .bind(booking.campus_id)
        .bind(&booking.table_number)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.duration_hours)
        .bind(booking.total_cost)
        .bind(req.notes.clean())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!("Booking {} completed by user {}", id, user.user_id);
        self.fetch(id).await
    }

    pub async fn list(&self, user: &CurrentUser, query: &BookingListQuery) -> ApiResult<Vec<Booking>> {
        let scope = self.scope(user).await?;
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM bookings WHERE 1=1");
        scope.push(&mut qb);
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY datetime(start_time) DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let bookings: Vec<Booking> = qb.build_query_as().fetch_all(&self.pool).await?;
        tracing::debug!("Listed {} bookings for user {}", bookings.len(), user.user_id);
        Ok(bookings)
    }

    pub async fn my_pending(&self, user: &CurrentUser, page: Pagination) -> ApiResult<Vec<Booking>> {
        let query = BookingListQuery {
            status: Some(BookingStatus::Pending),
            skip: page.skip,
            limit: page.limit,
        };
        self.list(user, &query).await
    }

    pub async fn get(&self, user: &CurrentUser, id: i64) -> ApiResult<Booking> {
        let booking = self.fetch(id).await?;
        if user.is_admin() {
            check_campus_scope(user, Some(booking.campus_id), "查看")?;
            return Ok(booking);
        }

        let student = find_student(&self.pool, booking.student_id).await?;
        let coach = find_coach(&self.pool, booking.coach_id).await?;
        if student.user_id != user.user_id && coach.user_id != user.user_id {
            return Err(ApiError::forbidden("无权查看该预约"));
        }
        Ok(booking)
    }

    /// 教练在 [from, to) 内的待确认与已确认课程
    pub async fn coach_schedule(
        &self,
        coach_id: i64,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
    ) -> ApiResult<Vec<ScheduleEntry>> {
        find_coach(&self.pool, coach_id).await?;
        if date_to <= date_from {
            return Err(ApiError::validation_error("结束日期必须晚于开始日期"));
        }

        Ok(sqlx::query_as(
            r#"
            SELECT b.id, b.student_id, u.real_name AS student_name, b.campus_id, b.table_number,
                   b.start_time, b.end_time, b.status
            FROM bookings b
            JOIN students s ON s.id = b.student_id
            JOIN users u ON u.id = s.user_id
            WHERE b.coach_id = ? AND b.status IN ('pending', 'confirmed')
              AND datetime(b.start_time) >= datetime(?) AND datetime(b.start_time) < datetime(?)
            ORDER BY datetime(b.start_time), b.id
            "#,
        )
        .bind(coach_id)
        .bind(date_from)
        .bind(date_to)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn available_tables(
        &self,
        campus_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> ApiResult<AvailableTables> {
        if end_time <= start_time {
            return Err(ApiError::validation_error("结束时间必须晚于开始时间"));
        }
        let campus: Option<(i64,)> = sqlx::query_as("SELECT id FROM campuses WHERE id = ? AND is_active = 1")
            .bind(campus_id)
            .fetch_optional(&self.pool)
            .await?;
        if campus.is_none() {
            return Err(ApiError::not_found("校区不存在"));
        }

        let taken = self.taken_tables(campus_id, start_time, end_time).await?;
        let tables = (1..=self.business.table_count)
            .map(table_label)
            .filter(|label| !taken.contains(label))
            .collect();

        Ok(AvailableTables { campus_id, tables })
    }

    /// 按月统计，范围与列表一致
    pub async fn monthly_statistics(
        &self,
        user: &CurrentUser,
        year: i32,
        month: u32,
    ) -> ApiResult<MonthlyStatistics> {
        let from = month_start(year, month)?;
        let to = if month == 12 { month_start(year + 1, 1)? } else { month_start(year, month + 1)? };
        let scope = self.scope(user).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'confirmed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
                CAST(COALESCE(SUM(CASE WHEN status IN ('confirmed', 'completed') THEN duration_hours ELSE 0 END), 0) AS REAL),
                CAST(COALESCE(SUM(CASE WHEN status IN ('confirmed', 'completed') THEN total_cost ELSE 0 END), 0) AS REAL)
            FROM bookings
            WHERE datetime(start_time) >= datetime("#,
        );
        qb.push_bind(from)
            .push(") AND datetime(start_time) < datetime(")
            .push_bind(to)
            .push(")");
        scope.push(&mut qb);

        let (total, pending, confirmed, rejected, cancelled, completed, hours, revenue): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
            f64,
            f64,
        ) = qb.build_query_as().fetch_one(&self.pool).await?;

        Ok(MonthlyStatistics {
            year,
            month,
            total_bookings: total,
            pending,
            confirmed,
            rejected,
            cancelled,
            completed,
            total_hours: round2(hours),
            total_revenue: round2(revenue),
        })
    }

    pub async fn fetch(&self, id: i64) -> ApiResult<Booking> {
        sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("预约不存在"))
    }

    /// 本自然月（UTC）内该用户发起的取消次数
    async fn monthly_cancellations(&self, user_id: i64) -> ApiResult<i64> {
        let now = Utc::now();
        let since = month_start(now.year(), now.month())?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE cancelled_by = ? AND datetime(cancelled_at) >= datetime(?)",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn taken_tables(
        &self,
        campus_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> ApiResult<HashSet<String>> {
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT table_number FROM bookings
            WHERE campus_id = ? AND status IN ('pending', 'confirmed')
              AND datetime(start_time) < datetime(?) AND datetime(end_time) > datetime(?)
            "#,
        )
        .bind(campus_id)
        .bind(end_time)
        .bind(start_time)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|(table,)| table).collect())
    }

    async fn scope(&self, user: &CurrentUser) -> ApiResult<Scope> {
        Ok(match user.role {
            UserRole::Student => Scope::Student(find_student_by_user(&self.pool, user.user_id).await?.id),
            UserRole::Coach => Scope::Coach(find_coach_by_user(&self.pool, user.user_id).await?.id),
            UserRole::CampusAdmin => Scope::Campus(user.campus_id),
            UserRole::SuperAdmin => Scope::All,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_zero_padded() {
        assert_eq!(table_label(1), "桌01");
        assert_eq!(table_label(20), "桌20");
    }

    #[test]
    fn picks_first_free_table() {
        let taken: HashSet<String> = ["桌01", "桌02"].iter().map(|s| s.to_string()).collect();
        assert_eq!(pick_table(20, &taken, None).unwrap(), "桌03");
        assert_eq!(pick_table(20, &HashSet::new(), None).unwrap(), "桌01");
    }

    #[test]
    fn requested_table_must_be_valid_and_free() {
        let taken: HashSet<String> = ["桌05"].iter().map(|s| s.to_string()).collect();
        assert_eq!(pick_table(20, &taken, Some("桌06")).unwrap(), "桌06");
        assert!(matches!(pick_table(20, &taken, Some("桌05")), Err(ApiError::Conflict(_))));
        assert!(matches!(pick_table(20, &taken, Some("桌21")), Err(ApiError::ValidationError(_))));
    }

    #[test]
    fn full_campus_has_no_table() {
        let taken: HashSet<String> = (1..=3).map(table_label).collect();
        assert!(matches!(pick_table(3, &taken, None), Err(ApiError::Conflict(_))));
    }

    #[test]
    fn duration_counts_minutes() {
        let start = Utc::now();
        assert_eq!(duration_hours(start, start + Duration::minutes(90)), 1.5);
        assert_eq!(duration_hours(start, start + Duration::hours(1)), 1.0);
    }
}
