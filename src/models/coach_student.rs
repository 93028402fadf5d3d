use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

str_enum! {
    /// 双选关系状态，审批通过存为 active
    RelationStatus {
        Pending => "pending",
        Active => "active",
        Rejected => "rejected",
        Changing => "changing",
        PendingChange => "pending_change",
        Deleted => "deleted",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CoachStudent {
    pub id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub status: String,
    pub applied_by: String,
    pub application_message: Option<String>,
    pub response_message: Option<String>,
    pub responded_by: Option<i64>,
    pub responded_at: Option<DateTime<Utc>>,
    pub replaces_relation_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 关系记录附带双方姓名
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RelationDetail {
    pub id: i64,
    pub coach_id: i64,
    pub coach_user_id: i64,
    pub coach_name: String,
    pub coach_level: String,
    pub student_id: i64,
    pub student_user_id: i64,
    pub student_name: String,
    pub campus_id: Option<i64>,
    pub status: String,
    pub applied_by: String,
    pub application_message: Option<String>,
    pub response_message: Option<String>,
    pub replaces_relation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyCoachRequest {
    pub coach_id: i64,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApproveRelationRequest {
    pub approved: bool,
    pub response_message: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeCoachRequest {
    pub old_coach_id: i64,
    pub new_coach_id: i64,
    pub message: Option<String>,
}
