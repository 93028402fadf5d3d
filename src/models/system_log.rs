use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SystemLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub description: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub extra_data: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 待写入的操作日志
#[derive(Debug, Clone, Default)]
pub struct NewSystemLog {
    pub user_id: Option<i64>,
    pub action: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub extra_data: Option<serde_json::Value>,
}

impl NewSystemLog {
    pub fn new(user_id: Option<i64>, action: &str, description: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.to_string(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn target(mut self, target_type: &str, target_id: i64) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn extra(mut self, extra_data: serde_json::Value) -> Self {
        self.extra_data = Some(extra_data);
        self
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
pub struct LogQuery {
    pub user_id: Option<i64>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct ActionCount {
    pub action: String,
    pub count: i64,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct UserActionCount {
    pub user_id: i64,
    pub username: Option<String>,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogStatistics {
    pub days: i64,
    pub total: i64,
    pub by_action: Vec<ActionCount>,
    pub top_users: Vec<UserActionCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResult {
    pub days: i64,
    pub deleted: u64,
}
