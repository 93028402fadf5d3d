use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use validator::Validate;

use crate::models::{
    BulkNotificationRequest, CreateNotificationRequest, CreateTemplateRequest, Notification,
    NotificationPriority, NotificationQuery, NotificationSettings, NotificationStatistics,
    NotificationTemplate, NotificationType, Pagination, SendTemplateRequest,
    UpdateSettingsRequest,
};
use crate::utils::{ApiError, ApiResult, is_valid_hhmm};

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("valid placeholder regex"));

/// 判断当前是否处于免打扰时段，时段可以跨越午夜
pub fn is_quiet_time(now: NaiveDateTime, start: &str, end: &str, weekend_quiet: bool) -> bool {
    if weekend_quiet && matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return true;
    }

    let (Ok(start), Ok(end)) =
        (NaiveTime::parse_from_str(start, "%H:%M"), NaiveTime::parse_from_str(end, "%H:%M"))
    else {
        return false;
    };

    let t = now.time();
    if start == end {
        false
    } else if start < end {
        t >= start && t < end
    } else {
        t >= start || t < end
    }
}

/// 用变量替换模板中的 `{name}`，缺失的变量原样保留
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER_REGEX
        .replace_all(template, |caps: &regex::Captures| {
            variables.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[derive(Clone)]
pub struct NotificationService {
    pool: SqlitePool,
}

impl NotificationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        sender_id: Option<i64>,
        req: CreateNotificationRequest,
    ) -> ApiResult<Notification> {
        req.validate()?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
            .bind(req.recipient_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(ApiError::not_found("接收用户不存在"));
        }

        let settings = self.get_settings(req.recipient_id).await?;

        let (send_email, send_sms, send_push) = if settings.type_enabled(req.notification_type) {
            let quiet = is_quiet_time(
                Local::now().naive_local(),
                &settings.quiet_start_time,
                &settings.quiet_end_time,
                settings.weekend_quiet,
            );
            (
                req.send_email.unwrap_or(false) && settings.email_enabled,
                req.send_sms.unwrap_or(false) && settings.sms_enabled,
                req.send_push.unwrap_or(true) && settings.push_enabled && !quiet,
            )
        } else {
            // 用户关闭了该类通知：仍然入库，但不触达任何渠道
            (false, false, false)
        };

        let now = Utc::now();
        let priority = req.priority.unwrap_or(NotificationPriority::Normal);
        let result = sqlx::query(
            r#"
            INSERT INTO notifications
                (title, content, notification_type, priority, sender_id, recipient_id,
                 resource_type, resource_id, send_email, send_sms, send_push,
                 scheduled_at, sent_at, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&req.title)
        .bind(&req.content)
        .bind(req.notification_type.as_str())
        .bind(priority.as_str())
        .bind(sender_id)
        .bind(req.recipient_id)
        .bind(&req.resource_type)
        .bind(req.resource_id)
        .bind(send_email)
        .bind(send_sms)
        .bind(send_push)
        .bind(req.scheduled_at)
        .bind(now)
        .bind(req.expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.fetch(result.last_insert_rowid()).await
    }

    /// 业务流程中的自动通知，失败只记日志
    pub async fn notify(
        &self,
        recipient_id: i64,
        notification_type: NotificationType,
        title: &str,
        content: String,
        resource: Option<(&str, i64)>,
    ) {
        let req =
            CreateNotificationRequest::simple(recipient_id, notification_type, title, content, resource);
        if let Err(e) = self.create(None, req).await {
            tracing::warn!("Failed to send notification to user {}: {}", recipient_id, e);
        }
    }

    pub async fn bulk(
        &self,
        sender_id: i64,
        req: BulkNotificationRequest,
    ) -> ApiResult<Vec<Notification>> {
        req.validate()?;

        let mut created = Vec::with_capacity(req.recipient_ids.len());
        for recipient_id in &req.recipient_ids {
            let single = CreateNotificationRequest {
                recipient_id: *recipient_id,
                title: req.title.clone(),
                content: req.content.clone(),
                notification_type: req.notification_type,
                priority: req.priority,
                resource_type: None,
                resource_id: None,
                send_email: req.send_email,
                send_sms: req.send_sms,
                send_push: req.send_push,
                scheduled_at: None,
                expires_at: None,
            };
            created.push(self.create(Some(sender_id), single).await?);
        }

        tracing::info!("Bulk notification sent to {} users by {}", created.len(), sender_id);
        Ok(created)
    }

    pub async fn list(
        &self,
        user_id: i64,
        query: &NotificationQuery,
    ) -> ApiResult<Vec<Notification>> {
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM notifications WHERE is_deleted = 0 AND recipient_id = ",
        );
        qb.push_bind(user_id);
        if let Some(notification_type) = query.notification_type {
            qb.push(" AND notification_type = ").push_bind(notification_type.as_str());
        }
        if let Some(is_read) = query.is_read {
            qb.push(" AND is_read = ").push_bind(is_read);
        }
        if let Some(priority) = query.priority {
            qb.push(" AND priority = ").push_bind(priority.as_str());
        }
        qb.push(" ORDER BY datetime(created_at) DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as::<Notification>().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, user_id: i64, id: i64) -> ApiResult<Notification> {
        sqlx::query_as(
            "SELECT * FROM notifications WHERE id = ? AND recipient_id = ? AND is_deleted = 0",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("通知不存在"))
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> ApiResult<Notification> {
        let notification = self.get(user_id, id).await?;
        if !notification.is_read {
            let now = Utc::now();
            sqlx::query("UPDATE notifications SET is_read = 1, read_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        self.get(user_id, id).await
    }

    pub async fn mark_all_read(&self, user_id: i64) -> ApiResult<i64> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, read_at = ?, updated_at = ? WHERE recipient_id = ? AND is_read = 0 AND is_deleted = 0",
        )
        .bind(now)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> ApiResult<()> {
        self.get(user_id, id).await?;
        sqlx::query("UPDATE notifications SET is_deleted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn unread_count(&self, user_id: i64) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = 0 AND is_deleted = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn statistics(&self, user_id: i64) -> ApiResult<NotificationStatistics> {
        let rows: Vec<(String, String, bool)> = sqlx::query_as(
            "SELECT notification_type, priority, is_read FROM notifications WHERE recipient_id = ? AND is_deleted = 0",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = NotificationStatistics {
            by_type: NotificationType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect(),
            by_priority: NotificationPriority::ALL
                .iter()
                .map(|p| (p.as_str().to_string(), 0))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        };
        for (notification_type, priority, is_read) in rows {
            stats.total += 1;
            if is_read {
                stats.read += 1;
            } else {
                stats.unread += 1;
            }
            *stats.by_type.entry(notification_type).or_default() += 1;
            *stats.by_priority.entry(priority).or_default() += 1;
        }
        Ok(stats)
    }

    /// 读取通知设置，不存在时按默认值创建
    pub async fn get_settings(&self, user_id: i64) -> ApiResult<NotificationSettings> {
        let now = Utc::now();
        sqlx::query(
            "INSERT OR IGNORE INTO user_notification_settings (user_id, created_at, updated_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM user_notification_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        req: UpdateSettingsRequest,
    ) -> ApiResult<NotificationSettings> {
        for value in [&req.quiet_start_time, &req.quiet_end_time].into_iter().flatten() {
            if !is_valid_hhmm(value) {
                return Err(ApiError::validation_error("免打扰时间格式必须为HH:MM"));
            }
        }

        self.get_settings(user_id).await?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE user_notification_settings SET ");
        let mut set = qb.separated(", ");
        let toggles = [
            ("system_notifications", req.system_notifications),
            ("booking_notifications", req.booking_notifications),
            ("payment_notifications", req.payment_notifications),
            ("competition_notifications", req.competition_notifications),
            ("evaluation_notifications", req.evaluation_notifications),
            ("coach_student_notifications", req.coach_student_notifications),
            ("email_enabled", req.email_enabled),
            ("sms_enabled", req.sms_enabled),
            ("push_enabled", req.push_enabled),
            ("weekend_quiet", req.weekend_quiet),
        ];
        for (column, value) in toggles {
            if let Some(value) = value {
                set.push(format!("{} = ", column)).push_bind_unseparated(value);
            }
        }
        if let Some(start) = req.quiet_start_time {
            set.push("quiet_start_time = ").push_bind_unseparated(start);
        }
        if let Some(end) = req.quiet_end_time {
            set.push("quiet_end_time = ").push_bind_unseparated(end);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE user_id = ").push_bind(user_id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("Notification settings updated for user {}", user_id);
        self.get_settings(user_id).await
    }

    pub async fn create_template(&self, req: CreateTemplateRequest) -> ApiResult<NotificationTemplate> {
        req.validate()?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM notification_templates WHERE code = ?")
                .bind(&req.code)
                .fetch_optional(&self.pool)
                .await?;
        if existing.is_some() {
            return Err(ApiError::conflict("模板编码已存在"));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO notification_templates
                (code, name, notification_type, title_template, content_template, default_priority,
                 default_send_email, default_send_sms, default_send_push, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&req.code)
        .bind(&req.name)
        .bind(req.notification_type.as_str())
        .bind(&req.title_template)
        .bind(&req.content_template)
        .bind(req.default_priority.unwrap_or(NotificationPriority::Normal).as_str())
        .bind(req.default_send_email)
        .bind(req.default_send_sms)
        .bind(req.default_send_push)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM notification_templates WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn templates(&self) -> ApiResult<Vec<NotificationTemplate>> {
        Ok(sqlx::query_as("SELECT * FROM notification_templates WHERE is_active = 1 ORDER BY code")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn send_from_template(
        &self,
        sender_id: i64,
        req: SendTemplateRequest,
    ) -> ApiResult<Notification> {
        let template: NotificationTemplate = sqlx::query_as(
            "SELECT * FROM notification_templates WHERE code = ? AND is_active = 1",
        )
        .bind(&req.code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ApiError::not_found("通知模板不存在"))?;

        let create = CreateNotificationRequest {
            recipient_id: req.recipient_id,
            title: render_template(&template.title_template, &req.variables),
            content: render_template(&template.content_template, &req.variables),
            notification_type: template.notification_type.parse()?,
            priority: Some(template.default_priority.parse()?),
            resource_type: None,
            resource_id: None,
            send_email: Some(template.default_send_email),
            send_sms: Some(template.default_send_sms),
            send_push: Some(template.default_send_push),
            scheduled_at: None,
            expires_at: None,
        };

        self.create(Some(sender_id), create).await
    }

    async fn fetch(&self, id: i64) -> ApiResult<Notification> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("通知不存在"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn quiet_window_wraps_midnight() {
        // 2025-01-08 是周三
        assert!(is_quiet_time(at(2025, 1, 8, 23, 0), "22:00", "08:00", false));
        assert!(is_quiet_time(at(2025, 1, 8, 7, 59), "22:00", "08:00", false));
        assert!(!is_quiet_time(at(2025, 1, 8, 8, 0), "22:00", "08:00", false));
        assert!(!is_quiet_time(at(2025, 1, 8, 12, 0), "22:00", "08:00", false));
    }

    #[test]
    fn quiet_window_same_day() {
        assert!(is_quiet_time(at(2025, 1, 8, 13, 0), "12:00", "14:00", false));
        assert!(!is_quiet_time(at(2025, 1, 8, 14, 0), "12:00", "14:00", false));
        assert!(!is_quiet_time(at(2025, 1, 8, 13, 0), "12:00", "12:00", false));
    }

    #[test]
    fn weekend_quiet_covers_whole_day() {
        // 2025-01-11 是周六
        assert!(is_quiet_time(at(2025, 1, 11, 12, 0), "22:00", "08:00", true));
        assert!(!is_quiet_time(at(2025, 1, 11, 12, 0), "22:00", "08:00", false));
    }

    #[test]
    fn template_keeps_unknown_placeholders() {
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "张三".to_string());
        assert_eq!(
            render_template("{name}，您的课程{course}已确认", &vars),
            "张三，您的课程{course}已确认"
        );
    }
}
