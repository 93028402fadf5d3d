use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

str_enum! {
    EvaluatorType {
        Student => "student",
        Coach => "coach",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Evaluation {
    pub id: i64,
    pub course_id: i64,
    pub evaluator_id: i64,
    pub evaluator_type: String,
    pub content: String,
    pub rating: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEvaluationRequest {
    pub course_id: i64,
    #[validate(length(min = 1, max = 1000, message = "评价内容不能为空"))]
    pub content: String,
    #[validate(range(min = 1, max = 5, message = "评分必须在1-5之间"))]
    pub rating: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEvaluationRequest {
    #[validate(length(min = 1, max = 1000, message = "评价内容不能为空"))]
    pub content: Option<String>,
    #[validate(range(min = 1, max = 5, message = "评分必须在1-5之间"))]
    pub rating: Option<i64>,
}

/// 待评价的已完成课程
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct PendingEvaluation {
    pub course_id: i64,
    pub booking_id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub evaluator_type: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct EvaluationStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach_id: Option<i64>,
    pub total_evaluations: i64,
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<String, i64>,
    pub recent_evaluations: i64,
}
