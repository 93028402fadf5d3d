use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Comment {
    pub id: i64,
    pub booking_id: i64,
    pub rating: i64,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 评论附带预约双方
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct CommentDetail {
    pub id: i64,
    pub booking_id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub coach_name: String,
    pub rating: i64,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCommentRequest {
    pub booking_id: i64,
    #[validate(range(min = 1, max = 5, message = "评分必须在1-5之间"))]
    pub rating: i64,
    #[validate(length(max = 100, message = "评论内容不能超过100字"))]
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCommentRequest {
    #[validate(range(min = 1, max = 5, message = "评分必须在1-5之间"))]
    pub rating: Option<i64>,
    #[validate(length(max = 100, message = "评论内容不能超过100字"))]
    pub content: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct CommentStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<i64>,
    pub total_comments: i64,
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<String, i64>,
    pub recent_comments: i64,
}
