use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

str_enum! {
    NotificationType {
        System => "system",
        Booking => "booking",
        Payment => "payment",
        Competition => "competition",
        Evaluation => "evaluation",
        CoachStudent => "coach_student",
    }
}

str_enum! {
    NotificationPriority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub notification_type: String,
    pub priority: String,
    pub sender_id: Option<i64>,
    pub recipient_id: i64,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub is_deleted: bool,
    pub send_email: bool,
    pub send_sms: bool,
    pub send_push: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NotificationSettings {
    pub id: i64,
    pub user_id: i64,
    pub system_notifications: bool,
    pub booking_notifications: bool,
    pub payment_notifications: bool,
    pub competition_notifications: bool,
    pub evaluation_notifications: bool,
    pub coach_student_notifications: bool,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub quiet_start_time: String,
    pub quiet_end_time: String,
    pub weekend_quiet: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationSettings {
    pub fn type_enabled(&self, notification_type: NotificationType) -> bool {
        match notification_type {
            NotificationType::System => self.system_notifications,
            NotificationType::Booking => self.booking_notifications,
            NotificationType::Payment => self.payment_notifications,
            NotificationType::Competition => self.competition_notifications,
            NotificationType::Evaluation => self.evaluation_notifications,
            NotificationType::CoachStudent => self.coach_student_notifications,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NotificationTemplate {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub notification_type: String,
    pub title_template: String,
    pub content_template: String,
    pub default_priority: String,
    pub default_send_email: bool,
    pub default_send_sms: bool,
    pub default_send_push: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateNotificationRequest {
    pub recipient_id: i64,
    #[validate(length(min = 1, max = 200, message = "标题不能为空"))]
    pub title: String,
    #[validate(length(min = 1, message = "内容不能为空"))]
    pub content: String,
    pub notification_type: NotificationType,
    pub priority: Option<NotificationPriority>,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub send_email: Option<bool>,
    pub send_sms: Option<bool>,
    pub send_push: Option<bool>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CreateNotificationRequest {
    /// 内部自动通知使用的简化构造
    pub fn simple(
        recipient_id: i64,
        notification_type: NotificationType,
        title: impl Into<String>,
        content: impl Into<String>,
        resource: Option<(&str, i64)>,
    ) -> Self {
        Self {
            recipient_id,
            title: title.into(),
            content: content.into(),
            notification_type,
            priority: None,
            resource_type: resource.map(|(t, _)| t.to_string()),
            resource_id: resource.map(|(_, id)| id),
            send_email: None,
            send_sms: None,
            send_push: None,
            scheduled_at: None,
            expires_at: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkNotificationRequest {
    #[validate(length(min = 1, message = "接收人不能为空"))]
    pub recipient_ids: Vec<i64>,
    #[validate(length(min = 1, max = 200, message = "标题不能为空"))]
    pub title: String,
    #[validate(length(min = 1, message = "内容不能为空"))]
    pub content: String,
    pub notification_type: NotificationType,
    pub priority: Option<NotificationPriority>,
    pub send_email: Option<bool>,
    pub send_sms: Option<bool>,
    pub send_push: Option<bool>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationQuery {
    pub notification_type: Option<NotificationType>,
    pub is_read: Option<bool>,
    pub priority: Option<NotificationPriority>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct NotificationStatistics {
    pub total: i64,
    pub unread: i64,
    pub read: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub system_notifications: Option<bool>,
    pub booking_notifications: Option<bool>,
    pub payment_notifications: Option<bool>,
    pub competition_notifications: Option<bool>,
    pub evaluation_notifications: Option<bool>,
    pub coach_student_notifications: Option<bool>,
    pub email_enabled: Option<bool>,
    pub sms_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub quiet_start_time: Option<String>,
    pub quiet_end_time: Option<String>,
    pub weekend_quiet: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTemplateRequest {
    #[validate(length(min = 1, max = 50, message = "模板编码不能为空"))]
    pub code: String,
    #[validate(length(min = 1, max = 100, message = "模板名称不能为空"))]
    pub name: String,
    pub notification_type: NotificationType,
    pub title_template: String,
    pub content_template: String,
    pub default_priority: Option<NotificationPriority>,
    #[serde(default)]
    pub default_send_email: bool,
    #[serde(default)]
    pub default_send_sms: bool,
    #[serde(default = "default_true")]
    pub default_send_push: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendTemplateRequest {
    pub code: String,
    pub recipient_id: i64,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}
