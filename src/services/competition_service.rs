use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{
    Competition, CompetitionMatch, CompetitionQuery, CompetitionRegistration,
    CompetitionStatistics, CompetitionStatus, CreateCompetitionRequest, GroupType, MatchStatus,
    Pagination, PaymentMethod, PaymentStatus, PaymentType, UpdateCompetitionRequest,
    UpdateMatchRequest, UserRole,
};
use crate::services::payment_service::{LedgerEntry, insert_payment};
use crate::services::student_service::{find_student, find_student_by_user};
use crate::utils::{
    ApiError, ApiResult, StringExt, campus_filter, check_campus_scope, require_admin, require_role,
    round2,
};

/// 比赛连同已确认报名人数
const COMPETITION_SQL: &str = r#"
    SELECT c.*,
           (SELECT COUNT(*) FROM competition_registrations r
            WHERE r.competition_id = c.id AND r.is_confirmed = 1) AS registered_count
    FROM competitions c
    WHERE 1=1"#;

/// 首轮对阵；人数为奇数时最后一人轮空
pub fn pair_entrants(entrants: &[i64]) -> Vec<(i64, Option<i64>)> {
    entrants
        .chunks(2)
        .map(|pair| (pair[0], pair.get(1).copied()))
        .collect()
}

/// 比分高者胜，平局无胜者
pub fn decide_winner(player1: Option<i64>, player2: Option<i64>, score1: i64, score2: i64) -> Option<i64> {
    match score1.cmp(&score2) {
        std::cmp::Ordering::Greater => player1,
        std::cmp::Ordering::Less => player2,
        std::cmp::Ordering::Equal => None,
    }
}

fn ensure_dates(deadline: DateTime<Utc>, competition_date: DateTime<Utc>) -> ApiResult<()> {
    if deadline >= competition_date {
        return Err(ApiError::validation_error("报名截止时间必须早于比赛时间"));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CompetitionService {
    pool: SqlitePool,
}

impl CompetitionService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &CurrentUser, req: CreateCompetitionRequest) -> ApiResult<Competition> {
        require_admin(user)?;
        req.validate()?;
        check_campus_scope(user, Some(req.campus_id), "创建")?;
        ensure_dates(req.registration_deadline, req.competition_date)?;

        let campus: Option<(i64,)> = sqlx::query_as("SELECT id FROM campuses WHERE id = ? AND is_active = 1")
            .bind(req.campus_id)
            .fetch_optional(&self.pool)
            .await?;
        if campus.is_none() {
            return Err(ApiError::not_found("校区不存在"));
        }

        let now = Utc::now();
        let status = req.status.unwrap_or(CompetitionStatus::Upcoming);
        let result = sqlx::query(
            r#"
            INSERT INTO competitions
                (title, description, competition_date, registration_deadline, registration_fee,
                 max_participants, status, campus_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(req.title.trim())
        .bind(req.description.clean())
        .bind(req.competition_date)
        .bind(req.registration_deadline)
        .bind(round2(req.registration_fee))
        .bind(req.max_participants)
        .bind(status.as_str())
        .bind(req.campus_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        let id = result.last_insert_rowid();

        tracing::info!("Competition {} '{}' created by {}", id, req.title, user.user_id);
        self.get(id).await
    }

    pub async fn list(&self, query: &CompetitionQuery) -> ApiResult<Vec<Competition>> {
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = QueryBuilder::<Sqlite>::new(COMPETITION_SQL);
        if let Some(status) = query.status {
            qb.push(" AND c.status = ").push_bind(status.as_str());
        }
        if let Some(campus_id) = query.campus_id {
            qb.push(" AND c.campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY datetime(c.competition_date) DESC, c.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, id: i64) -> ApiResult<Competition> {
        let mut qb = QueryBuilder::<Sqlite>::new(COMPETITION_SQL);
        qb.push(" AND c.id = ").push_bind(id);
        qb.build_query_as()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("比赛不存在"))
    }

    pub async fn update(
        &self,
        user: &CurrentUser,
        id: i64,
        req: UpdateCompetitionRequest,
    ) -> ApiResult<Competition> {
        require_admin(user)?;
        req.validate()?;
        let existing = self.get(id).await?;
        check_campus_scope(user, Some(existing.campus_id), "管理")?;

        ensure_dates(
            req.registration_deadline.unwrap_or(existing.registration_deadline),
            req.competition_date.unwrap_or(existing.competition_date),
        )?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE competitions SET ");
        let mut set = qb.separated(", ");
        if let Some(title) = req.title.clean() {
            set.push("title = ").push_bind_unseparated(title);
        }
        if let Some(description) = req.description {
            set.push("description = ").push_bind_unseparated(description.clean());
        }
        if let Some(date) = req.competition_date {
            set.push("competition_date = ").push_bind_unseparated(date);
        }
        if let Some(deadline) = req.registration_deadline {
            set.push("registration_deadline = ").push_bind_unseparated(deadline);
        }
        if let Some(fee) = req.registration_fee {
            set.push("registration_fee = ").push_bind_unseparated(round2(fee));
        }
        if let Some(max) = req.max_participants {
            set.push("max_participants = ").push_bind_unseparated(max);
        }
        if let Some(status) = req.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Competition {} updated by {}", id, user.user_id);
        self.get(id).await
    }

    /// 学员报名：生成待支付的报名费，支付成功后再确认
    pub async fn register(
        &self,
        user: &CurrentUser,
        competition_id: i64,
        group_type: GroupType,
    ) -> ApiResult<CompetitionRegistration> {
        require_role(user, &[UserRole::Student])?;
        let student = find_student_by_user(&self.pool, user.user_id).await?;
        let competition = self.get(competition_id).await?;

        if competition.status != CompetitionStatus::Registration.as_str() {
            return Err(ApiError::validation_error("比赛当前不在报名阶段"));
        }
        if Utc::now() > competition.registration_deadline {
            return Err(ApiError::validation_error("报名已截止"));
        }

        let existing: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM competition_registrations WHERE competition_id = ? AND student_id = ?",
        )
        .bind(competition_id)
        .bind(student.id)
        .fetch_optional(&self.pool)
        .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("您已报名该比赛"));
        }

        let confirmed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM competition_registrations WHERE competition_id = ? AND is_confirmed = 1",
        )
        .bind(competition_id)
        .fetch_one(&self.pool)
        .await?;
        if confirmed >= competition.max_participants {
            return Err(ApiError::validation_error("报名人数已满"));
        }

        let mut tx = self.pool.begin().await?;
        let free = competition.registration_fee <= 0.0;
        let payment_id = if free {
            None
        } else {
            let description = format!("比赛报名费：{}", competition.title);
            Some(
                insert_payment(
                    &mut tx,
                    LedgerEntry {
                        user_id: user.user_id,
                        payment_type: PaymentType::Competition,
                        amount: competition.registration_fee,
                        method: PaymentMethod::Balance,
                        status: PaymentStatus::Pending,
                        related_id: Some(competition_id),
                        description: Some(&description),
                        created_by: Some(user.user_id),
                    },
                )
                .await?,
            )
        };

        let result = sqlx::query(
            r#"
            INSERT INTO competition_registrations
                (competition_id, student_id, group_type, payment_id, is_confirmed, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(competition_id)
        .bind(student.id)
        .bind(group_type.as_str())
        .bind(payment_id)
        .bind(free)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        tracing::info!(
            "Student {} registered for competition {} group {} (registration {})",
            student.id,
            competition_id,
            group_type,
            id
        );
        self.registration(id).await
    }

    /// 报名费支付成功后确认报名
    pub async fn confirm_registration(&self, user: &CurrentUser, id: i64) -> ApiResult<CompetitionRegistration> {
        let registration = self.registration(id).await?;
        let student = find_student(&self.pool, registration.student_id).await?;
        if student.user_id != user.user_id {
            require_admin(user)?;
            let competition = self.get(registration.competition_id).await?;
            check_campus_scope(user, Some(competition.campus_id), "管理")?;
        }

        if let Some(payment_id) = registration.payment_id {
            let status: Option<String> = sqlx::query_scalar("SELECT status FROM payments WHERE id = ?")
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await?;
            if status.as_deref() != Some(PaymentStatus::Success.as_str()) {
                return Err(ApiError::validation_error("报名费尚未支付"));
            }
        }

        sqlx::query("UPDATE competition_registrations SET is_confirmed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        tracing::info!("Registration {} confirmed by user {}", id, user.user_id);
        self.registration(id).await
    }

    pub async fn registrations(
        &self,
        competition_id: i64,
        group_type: Option<GroupType>,
    ) -> ApiResult<Vec<CompetitionRegistration>> {
        self.get(competition_id).await?;
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM competition_registrations WHERE competition_id = ",
        );
        qb.push_bind(competition_id);
        if let Some(group_type) = group_type {
            qb.push(" AND group_type = ").push_bind(group_type.as_str());
        }
        qb.push(" ORDER BY group_type, id");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn my_registrations(&self, user: &CurrentUser) -> ApiResult<Vec<CompetitionRegistration>> {
        require_role(user, &[UserRole::Student])?;
        let student = find_student_by_user(&self.pool, user.user_id).await?;
        Ok(sqlx::query_as(
            "SELECT * FROM competition_registrations WHERE student_id = ? ORDER BY datetime(created_at) DESC, id DESC",
        )
        .bind(student.id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// 分组抽签：随机打乱已确认的报名者，生成第一轮对阵
    pub async fn draw(
        &self,
        user: &CurrentUser,
        competition_id: i64,
        group_type: GroupType,
    ) -> ApiResult<Vec<CompetitionMatch>> {
        require_admin(user)?;
        let competition = self.get(competition_id).await?;
        check_campus_scope(user, Some(competition.campus_id), "管理")?;

        let status: CompetitionStatus = competition.status.parse()?;
        if !matches!(status, CompetitionStatus::Registration | CompetitionStatus::DrawComplete) {
            return Err(ApiError::validation_error("当前比赛状态不能抽签"));
        }

        let mut entrants: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT student_id FROM competition_registrations
            WHERE competition_id = ? AND group_type = ? AND is_confirmed = 1
            ORDER BY id
            "#,
        )
        .bind(competition_id)
        .bind(group_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        if entrants.len() < 2 {
            return Err(ApiError::validation_error("该组已确认的报名人数不足2人"));
        }

        entrants.shuffle(&mut rand::rng());
        let pairs = pair_entrants(&entrants);

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM competition_matches WHERE competition_id = ? AND group_type = ?")
            .bind(competition_id)
            .bind(group_type.as_str())
            .execute(&mut *tx)
            .await?;

        for (index, (player1, player2)) in pairs.iter().enumerate() {
            let (winner, match_status) = match player2 {
                Some(_) => (None, MatchStatus::Pending),
                None => (Some(*player1), MatchStatus::Completed),
            };
            sqlx::query(
                r#"
                INSERT INTO competition_matches
                    (competition_id, group_type, round_number, match_number, player1_id, player2_id,
                     winner_id, match_status, created_at, updated_at)
                VALUES (?, ?, 1, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(competition_id)
            .bind(group_type.as_str())
            .bind(index as i64 + 1)
            .bind(player1)
            .bind(player2)
            .bind(winner)
            .bind(match_status.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE competitions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(CompetitionStatus::DrawComplete.as_str())
            .bind(now)
            .bind(competition_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "Competition {} group {} drawn: {} entrants, {} matches",
            competition_id,
            group_type,
            entrants.len(),
            pairs.len()
        );
        self.matches(competition_id, Some(group_type)).await
    }

    pub async fn matches(
        &self,
        competition_id: i64,
        group_type: Option<GroupType>,
    ) -> ApiResult<Vec<CompetitionMatch>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM competition_matches WHERE competition_id = ",
        );
        qb.push_bind(competition_id);
        if let Some(group_type) = group_type {
            qb.push(" AND group_type = ").push_bind(group_type.as_str());
        }
        qb.push(" ORDER BY group_type, round_number, match_number");

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    /// 录入比分；双方比分齐全时判定胜者并结束比赛
    pub async fn update_match(
        &self,
        user: &CurrentUser,
        match_id: i64,
        req: UpdateMatchRequest,
    ) -> ApiResult<CompetitionMatch> {
        require_admin(user)?;
        let existing = self.fetch_match(match_id).await?;
        let competition = self.get(existing.competition_id).await?;
        check_campus_scope(user, Some(competition.campus_id), "管理")?;

        for score in [req.player1_score, req.player2_score].into_iter().flatten() {
            if score < 0 {
                return Err(ApiError::validation_error("比分不能为负数"));
            }
        }

        let score1 = req.player1_score.or(existing.player1_score);
        let score2 = req.player2_score.or(existing.player2_score);

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE competition_matches SET ");
        let mut set = qb.separated(", ");
        if let Some(score) = req.player1_score {
            set.push("player1_score = ").push_bind_unseparated(score);
        }
        if let Some(score) = req.player2_score {
            set.push("player2_score = ").push_bind_unseparated(score);
        }
        if let Some(time) = req.scheduled_time {
            set.push("scheduled_time = ").push_bind_unseparated(time);
        }
        if let Some(notes) = req.referee_notes {
            set.push("referee_notes = ").push_bind_unseparated(notes.clean());
        }
        if let (Some(s1), Some(s2)) = (score1, score2) {
            let winner = decide_winner(existing.player1_id, existing.player2_id, s1, s2);
            set.push("winner_id = ").push_bind_unseparated(winner);
            set.push("match_status = ").push_bind_unseparated(MatchStatus::Completed.as_str());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(match_id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Match {} updated by {}", match_id, user.user_id);
        self.fetch_match(match_id).await
    }

    pub async fn statistics(&self, user: &CurrentUser) -> ApiResult<CompetitionStatistics> {
        let campus_id = campus_filter(user).filter(|_| user.is_admin());

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'upcoming' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status IN ('registration', 'draw_complete', 'in_progress') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM competitions WHERE 1=1"#,
        );
        if let Some(campus_id) = campus_id {
            qb.push(" AND campus_id = ").push_bind(campus_id);
        }
        let (total, upcoming, ongoing, completed): (i64, i64, i64, i64) =
            qb.build_query_as().fetch_one(&self.pool).await?;

        let mut group_qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT r.group_type, COUNT(*) FROM competition_registrations r
            JOIN competitions c ON c.id = r.competition_id
            WHERE r.is_confirmed = 1"#,
        );
        if let Some(campus_id) = campus_id {
            group_qb.push(" AND c.campus_id = ").push_bind(campus_id);
        }
        group_qb.push(" GROUP BY r.group_type");
        let groups: Vec<(String, i64)> = group_qb.build_query_as().fetch_all(&self.pool).await?;

        let mut participants_by_group: BTreeMap<String, i64> =
            GroupType::ALL.iter().map(|g| (g.as_str().to_string(), 0)).collect();
        let mut total_participants = 0;
        for (group, count) in groups {
            total_participants += count;
            participants_by_group.insert(group, count);
        }

        Ok(CompetitionStatistics {
            total,
            upcoming,
            ongoing,
            completed,
            total_participants,
            participants_by_group,
        })
    }

    async fn registration(&self, id: i64) -> ApiResult<CompetitionRegistration> {
        sqlx::query_as("SELECT * FROM competition_registrations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("报名记录不存在"))
    }

    async fn fetch_match(&self, id: i64) -> ApiResult<CompetitionMatch> {
        sqlx::query_as("SELECT * FROM competition_matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("对阵不存在"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_entrant_gets_bye() {
        assert_eq!(pair_entrants(&[1, 2, 3]), vec![(1, Some(2)), (3, None)]);
        assert_eq!(pair_entrants(&[4, 5]), vec![(4, Some(5))]);
    }

    #[test]
    fn higher_score_wins() {
        assert_eq!(decide_winner(Some(1), Some(2), 3, 1), Some(1));
        assert_eq!(decide_winner(Some(1), Some(2), 0, 3), Some(2));
        assert_eq!(decide_winner(Some(1), Some(2), 2, 2), None);
    }
}
