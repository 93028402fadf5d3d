use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

str_enum! {
    /// 教练级别
    CoachLevel {
        Senior => "senior",
        Intermediate => "intermediate",
        Junior => "junior",
    }
}

impl CoachLevel {
    /// 各级别的默认课时费（元/小时）
    pub fn hourly_rate(&self) -> f64 {
        match self {
            CoachLevel::Senior => 200.0,
            CoachLevel::Intermediate => 150.0,
            CoachLevel::Junior => 80.0,
        }
    }
}

str_enum! {
    ApprovalStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Coach {
    pub id: i64,
    pub user_id: i64,
    pub level: String,
    pub hourly_rate: f64,
    pub achievements: Option<String>,
    pub max_students: i64,
    pub approval_status: String,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 教练信息（含用户资料）
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CoachDetail {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub real_name: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub phone: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub campus_id: Option<i64>,
    pub level: String,
    pub hourly_rate: f64,
    pub achievements: Option<String>,
    pub max_students: i64,
    pub approval_status: String,
    pub approved_at: Option<DateTime<Utc>>,
    pub active_students: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CoachListQuery {
    pub campus_id: Option<i64>,
    pub level: Option<CoachLevel>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CoachSearchQuery {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
    pub campus_id: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailableCoachQuery {
    pub campus_id: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateCoachRequest {
    pub level: Option<CoachLevel>,
    pub hourly_rate: Option<f64>,
    pub achievements: Option<String>,
    pub max_students: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveCoachRequest {
    pub approved: bool,
}
