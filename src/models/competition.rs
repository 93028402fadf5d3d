use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

str_enum! {
    CompetitionStatus {
        Upcoming => "upcoming",
        Registration => "registration",
        DrawComplete => "draw_complete",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

str_enum! {
    /// 比赛分组
    GroupType {
        A => "A",
        B => "B",
        C => "C",
    }
}

str_enum! {
    MatchStatus {
        Pending => "pending",
        Completed => "completed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Competition {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub competition_date: DateTime<Utc>,
    pub registration_deadline: DateTime<Utc>,
    pub registration_fee: f64,
    pub max_participants: i64,
    pub status: String,
    pub campus_id: i64,
    /// 已确认的报名人数
    pub registered_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CompetitionRegistration {
    pub id: i64,
    pub competition_id: i64,
    pub student_id: i64,
    pub group_type: String,
    pub payment_id: Option<i64>,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CompetitionMatch {
    pub id: i64,
    pub competition_id: i64,
    pub group_type: String,
    pub round_number: i64,
    pub match_number: i64,
    pub player1_id: Option<i64>,
    pub player2_id: Option<i64>,
    pub player1_score: Option<i64>,
    pub player2_score: Option<i64>,
    pub winner_id: Option<i64>,
    pub match_status: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub referee_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_fee() -> f64 {
    30.0
}

fn default_max_participants() -> i64 {
    32
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompetitionRequest {
    #[validate(length(min = 1, max = 100, message = "比赛名称不能为空"))]
    pub title: String,
    pub description: Option<String>,
    pub competition_date: DateTime<Utc>,
    pub registration_deadline: DateTime<Utc>,
    #[serde(default = "default_fee")]
    #[validate(range(min = 0.0, message = "报名费不能为负数"))]
    pub registration_fee: f64,
    #[serde(default = "default_max_participants")]
    #[validate(range(min = 2, message = "参赛人数至少为2"))]
    pub max_participants: i64,
    pub campus_id: i64,
    pub status: Option<CompetitionStatus>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCompetitionRequest {
    #[validate(length(min = 1, max = 100, message = "比赛名称不能为空"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub competition_date: Option<DateTime<Utc>>,
    pub registration_deadline: Option<DateTime<Utc>>,
    #[validate(range(min = 0.0, message = "报名费不能为负数"))]
    pub registration_fee: Option<f64>,
    #[validate(range(min = 2, message = "参赛人数至少为2"))]
    pub max_participants: Option<i64>,
    pub status: Option<CompetitionStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CompetitionQuery {
    pub status: Option<CompetitionStatus>,
    pub campus_id: Option<i64>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct GroupQuery {
    pub group_type: Option<GroupType>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterCompetitionRequest {
    pub group_type: GroupType,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DrawRequest {
    pub group_type: GroupType,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateMatchRequest {
    pub player1_score: Option<i64>,
    pub player2_score: Option<i64>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub referee_notes: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CompetitionStatistics {
    pub total: i64,
    pub upcoming: i64,
    pub ongoing: i64,
    pub completed: i64,
    pub total_participants: i64,
    pub participants_by_group: BTreeMap<String, i64>,
}
