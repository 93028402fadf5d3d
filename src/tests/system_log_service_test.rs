use chrono::{Duration, Utc};

use crate::models::{LogQuery, NewSystemLog, UserRole};
use crate::services::SystemLogService;
use crate::tests::common::{count, create_campus, create_test_db, create_user};
use crate::utils::ApiError;

#[tokio::test]
async fn test_logs_filtered_by_campus_and_action() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let west = create_campus(&pool, "西区").await;
    let east_user = create_user(&pool, "stu_east", UserRole::Student, Some(east)).await;
    let west_user = create_user(&pool, "stu_west", UserRole::Student, Some(west)).await;
    let service = SystemLogService::new(pool.clone());

    service.record(NewSystemLog::new(Some(east_user), "user_login", "登录")).await;
    service.record(NewSystemLog::new(Some(east_user), "booking_create", "预约").target("booking", 1)).await;
    service.record(NewSystemLog::new(Some(west_user), "user_login", "登录")).await;

    let all = service.get_logs(&LogQuery { limit: 100, ..Default::default() }, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let east_only = service.get_logs(&LogQuery { limit: 100, ..Default::default() }, Some(east)).await.unwrap();
    assert_eq!(east_only.len(), 2);
    assert!(east_only.iter().all(|l| l.user_id == Some(east_user)));

    let logins = service
        .get_logs(&LogQuery { action: Some("user_login".into()), limit: 100, ..Default::default() }, None)
        .await
        .unwrap();
    assert_eq!(logins.len(), 2);

    let stats = service.statistics(7, None).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.by_action[0].action, "user_login");
    assert_eq!(stats.by_action[0].count, 2);
    assert_eq!(stats.top_users[0].user_id, east_user);
    assert_eq!(stats.top_users[0].username.as_deref(), Some("stu_east"));
}

#[tokio::test]
async fn test_export_csv_quotes_fields() {
    let pool = create_test_db().await;
    let service = SystemLogService::new(pool.clone());
    service
        .record(NewSystemLog::new(None, "campus_update", "修改地址为\"体育路, 3号\""))
        .await;

    let csv = service.export_csv(&LogQuery::default(), None).await.unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("id,user_id,action"));
    let row = lines.next().unwrap();
    assert!(row.contains("\"修改地址为\"\"体育路, 3号\"\"\""));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn test_cleanup_keeps_recent_logs() {
    let pool = create_test_db().await;
    let operator = create_user(&pool, "root", UserRole::SuperAdmin, None).await;
    let service = SystemLogService::new(pool.clone());

    let old = service.log_action(NewSystemLog::new(None, "user_login", "旧日志")).await.unwrap();
    sqlx::query("UPDATE system_logs SET created_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::days(120))
        .bind(old)
        .execute(&pool)
        .await
        .unwrap();
    service.log_action(NewSystemLog::new(None, "user_login", "新日志")).await.unwrap();

    assert!(matches!(service.cleanup(7, operator).await, Err(ApiError::ValidationError(_))));
    assert!(matches!(
        service.cleanup(100_000_000, operator).await,
        Err(ApiError::ValidationError(_))
    ));

    let result = service.cleanup(90, operator).await.unwrap();
    assert_eq!(result.deleted, 1);

    // 清理操作本身也会留痕
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM system_logs").await, 2);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM system_logs WHERE action = 'system_log_cleanup'").await,
        1
    );
}
