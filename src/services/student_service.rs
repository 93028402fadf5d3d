use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::middleware::CurrentUser;
use crate::models::{
    Booking, BookingStatus, Pagination, RelationDetail, RelationStatus, Student, StudentBalance,
    StudentDetail, StudentListQuery, StudentProfile, UpdateStudentRequest, UserRole,
};
use crate::services::coach_student_service::RELATION_DETAIL_SQL;
use crate::services::payment_service::balance_on;
use crate::utils::{
    ApiError, ApiResult, StringExt, campus_filter, check_campus_scope, require_admin, require_role,
};

const STUDENT_DETAIL_SQL: &str = r#"
    SELECT s.id, s.user_id, u.username, u.real_name, u.gender, u.age, u.phone, u.email,
           u.avatar_url, u.campus_id, s.emergency_contact, s.emergency_phone, s.max_coaches,
           s.created_at
    FROM students s
    JOIN users u ON u.id = s.user_id
    WHERE 1=1"#;

pub async fn find_student(pool: &SqlitePool, student_id: i64) -> ApiResult<Student> {
    sqlx::query_as("SELECT * FROM students WHERE id = ?")
        .bind(student_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("学员不存在"))
}

pub async fn find_student_by_user(pool: &SqlitePool, user_id: i64) -> ApiResult<Student> {
    sqlx::query_as("SELECT * FROM students WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("学员信息不存在"))
}

#[derive(Clone)]
pub struct StudentService {
    pool: SqlitePool,
}

impl StudentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_students(
        &self,
        user: &CurrentUser,
        query: &StudentListQuery,
    ) -> ApiResult<Vec<StudentDetail>> {
        require_admin(user)?;
        if query.campus_id.is_some() {
            check_campus_scope(user, query.campus_id, "查看")?;
        }

        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = QueryBuilder::<Sqlite>::new(STUDENT_DETAIL_SQL);
        if let Some(campus_id) = query.campus_id.or(campus_filter(user)) {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY s.id LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let students: Vec<StudentDetail> = qb.build_query_as().fetch_all(&self.pool).await?;
        tracing::debug!("Listed {} students for user {}", students.len(), user.user_id);
        Ok(students)
    }

    pub async fn get_student(&self, user: &CurrentUser, id: i64) -> ApiResult<StudentDetail> {
        let student = self.detail(id).await?;
        self.ensure_can_view(user, &student).await?;
        Ok(student)
    }

    /// 当前学员的资料与实时余额
    pub async fn get_me(&self, user: &CurrentUser) -> ApiResult<StudentProfile> {
        require_role(user, &[UserRole::Student])?;
        let student = find_student_by_user(&self.pool, user.user_id).await?;
        let detail = self.detail(student.id).await?;

        let mut conn = self.pool.acquire().await?;
        let balance = balance_on(&mut conn, user.user_id).await?;

        Ok(StudentProfile { student: detail, balance })
    }

    pub async fn update_student(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateStudentRequest,
    ) -> ApiResult<StudentDetail> {
        let student = self.detail(id).await?;
        self.ensure_self_or_admin(user, &student)?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE students SET ");
        let mut set = qb.separated(", ");
        if let Some(contact) = req.emergency_contact {
            set.push("emergency_contact = ").push_bind_unseparated(contact.clean());
        }
        if let Some(phone) = req.emergency_phone {
            set.push("emergency_phone = ").push_bind_unseparated(phone.clean());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Student {} updated by user {}", id, user.user_id);
        self.detail(id).await
    }

    pub async fn student_coaches(&self, user: &CurrentUser, id: i64) -> ApiResult<Vec<RelationDetail>> {
        let student = self.detail(id).await?;
        self.ensure_can_view(user, &student).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(RELATION_DETAIL_SQL);
        qb.push(" AND cs.student_id = ")
            .push_bind(id)
            .push(" AND cs.status = ")
            .push_bind(RelationStatus::Active.as_str())
            .push(" ORDER BY cs.id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn student_bookings(
        &self,
        user: &CurrentUser,
        id: i64,
        status: Option<BookingStatus>,
    ) -> ApiResult<Vec<Booking>> {
        let student = self.detail(id).await?;
        self.ensure_can_view(user, &student).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM bookings WHERE student_id = ");
        qb.push_bind(id);
        if let Some(status) = status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        qb.push(" ORDER BY datetime(start_time) DESC, id DESC");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn student_balance(&self, user: &CurrentUser, id: i64) -> ApiResult<StudentBalance> {
        let student = self.detail(id).await?;
        self.ensure_self_or_admin(user, &student)?;

        let mut conn = self.pool.acquire().await?;
        let balance = balance_on(&mut conn, student.user_id).await?;

        Ok(StudentBalance { student_id: student.id, user_id: student.user_id, balance })
    }

    async fn detail(&self, id: i64) -> ApiResult<StudentDetail> {
        let mut qb = QueryBuilder::<Sqlite>::new(STUDENT_DETAIL_SQL);
        qb.push(" AND s.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("学员不存在"))
    }

    fn ensure_self_or_admin(&self, user: &CurrentUser, student: &StudentDetail) -> ApiResult<()> {
        if student.user_id == user.user_id {
            return Ok(());
        }
        require_admin(user)?;
        check_campus_scope(user, student.campus_id, "操作")
    }

    /// 本人、管理员，或与其有生效关系的教练
    async fn ensure_can_view(&self, user: &CurrentUser, student: &StudentDetail) -> ApiResult<()> {
        if student.user_id == user.user_id {
            return Ok(());
        }
        if user.is_admin() {
            return check_campus_scope(user, student.campus_id, "查看");
        }
        if user.role == UserRole::Coach {
            let linked: Option<(i64,)> = sqlx::query_as(
                r#"
                SELECT cs.id FROM coach_students cs
                JOIN coaches c ON c.id = cs.coach_id
                WHERE c.user_id = ? AND cs.student_id = ? AND cs.status = 'active'
                "#,
            )
            .bind(user.user_id)
            .bind(student.id)
            .fetch_optional(&self.pool)
            .await?;
            if linked.is_some() {
                return Ok(());
            }
        }
        Err(ApiError::forbidden("无权查看该学员信息"))
    }
}
