use std::collections::HashMap;

use crate::models::{
    CreateNotificationRequest, CreateTemplateRequest, NotificationPriority, NotificationQuery,
    NotificationType, SendTemplateRequest, UpdateSettingsRequest, UserRole,
};
use crate::services::NotificationService;
use crate::tests::common::{create_campus, create_test_db, create_user};
use crate::utils::ApiError;

fn all() -> NotificationQuery {
    NotificationQuery { limit: 100, ..Default::default() }
}

#[tokio::test]
async fn test_unread_count_and_mark_all_read() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let user_id = create_user(&pool, "stu_n", UserRole::Student, Some(campus_id)).await;
    let service = NotificationService::new(pool.clone());

    for i in 0..3 {
        service
            .notify(user_id, NotificationType::System, "系统公告", format!("第{}条", i), None)
            .await;
    }
    assert_eq!(service.unread_count(user_id).await.unwrap(), 3);

    let list = service.list(user_id, &all()).await.unwrap();
    assert_eq!(list.len(), 3);
    let first = service.mark_read(user_id, list[0].id).await.unwrap();
    assert!(first.is_read);
    assert!(first.read_at.is_some());
    assert_eq!(service.unread_count(user_id).await.unwrap(), 2);

    assert_eq!(service.mark_all_read(user_id).await.unwrap(), 2);
    assert_eq!(service.unread_count(user_id).await.unwrap(), 0);

    let stats = service.statistics(user_id).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.read, 3);
}

#[tokio::test]
async fn test_notification_is_private_to_recipient() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let owner = create_user(&pool, "stu_owner", UserRole::Student, Some(campus_id)).await;
    let other = create_user(&pool, "stu_other", UserRole::Student, Some(campus_id)).await;
    let service = NotificationService::new(pool.clone());

    let created = service
        .create(
            None,
            CreateNotificationRequest::simple(owner, NotificationType::Payment, "充值成功", "到账100元", None),
        )
        .await
        .unwrap();

    assert!(matches!(service.mark_read(other, created.id).await, Err(ApiError::NotFound(_))));
    assert!(matches!(service.delete(other, created.id).await, Err(ApiError::NotFound(_))));

    service.delete(owner, created.id).await.unwrap();
    assert!(service.list(owner, &all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_disabled_type_is_stored_without_channels() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let user_id = create_user(&pool, "stu_quiet", UserRole::Student, Some(campus_id)).await;
    let service = NotificationService::new(pool.clone());

    let settings = service
        .update_settings(
            user_id,
            UpdateSettingsRequest { booking_notifications: Some(false), ..Default::default() },
        )
        .await
        .unwrap();
    assert!(!settings.booking_notifications);
    assert!(settings.payment_notifications);

    let mut req = CreateNotificationRequest::simple(user_id, NotificationType::Booking, "预约提醒", "明天上课", None);
    req.send_push = Some(true);
    req.send_sms = Some(true);
    let stored = service.create(None, req).await.unwrap();
    assert!(!stored.send_push);
    assert!(!stored.send_sms);

    let bad = service
        .update_settings(
            user_id,
            UpdateSettingsRequest { quiet_start_time: Some("25:00".into()), ..Default::default() },
        )
        .await;
    assert!(matches!(bad, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_send_from_template_renders_variables() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_user(&pool, "admin_tpl", UserRole::CampusAdmin, Some(campus_id)).await;
    let user_id = create_user(&pool, "stu_tpl", UserRole::Student, Some(campus_id)).await;
    let service = NotificationService::new(pool.clone());

    let template = CreateTemplateRequest {
        code: "match_reminder".into(),
        name: "比赛提醒".into(),
        notification_type: NotificationType::Competition,
        title_template: "{competition}即将开始".into(),
        content_template: "{name}，您的第一场比赛在{table}，{missing}".into(),
        default_priority: Some(NotificationPriority::High),
        default_send_email: false,
        default_send_sms: false,
        default_send_push: true,
    };
    service.create_template(template).await.unwrap();

    let duplicate = CreateTemplateRequest {
        code: "match_reminder".into(),
        name: "重复".into(),
        notification_type: NotificationType::Competition,
        title_template: "t".into(),
        content_template: "c".into(),
        default_priority: None,
        default_send_email: false,
        default_send_sms: false,
        default_send_push: true,
    };
    assert!(matches!(service.create_template(duplicate).await, Err(ApiError::Conflict(_))));

    let variables = HashMap::from([
        ("competition".to_string(), "春季联赛".to_string()),
        ("name".to_string(), "王同学".to_string()),
        ("table".to_string(), "桌03".to_string()),
    ]);
    let sent = service
        .send_from_template(
            admin,
            SendTemplateRequest { code: "match_reminder".into(), recipient_id: user_id, variables },
        )
        .await
        .unwrap();

    assert_eq!(sent.title, "春季联赛即将开始");
    assert_eq!(sent.content, "王同学，您的第一场比赛在桌03，{missing}");
    assert_eq!(sent.priority, "high");
    assert_eq!(sent.sender_id, Some(admin));

    let unknown = service
        .send_from_template(
            admin,
            SendTemplateRequest { code: "nope".into(), recipient_id: user_id, variables: HashMap::new() },
        )
        .await;
    assert!(matches!(unknown, Err(ApiError::NotFound(_))));
}
