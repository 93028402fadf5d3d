use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Student {
    pub id: i64,
    pub user_id: i64,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub max_coaches: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 学员信息（含用户资料）
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct StudentDetail {
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
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub max_coaches: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentProfile {
    #[serde(flatten)]
    pub student: StudentDetail,
    pub balance: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentBalance {
    pub student_id: i64,
    pub user_id: i64,
    pub balance: f64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateStudentRequest {
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StudentListQuery {
    pub campus_id: Option<i64>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}
