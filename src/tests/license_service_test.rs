// Software license issuing, activation and expiry

use chrono::{Duration, Utc};

use crate::models::{
    CreateLicenseRequest, HeartbeatRequest, LicenseType, UsageStats, ValidateLicenseRequest,
};
use crate::services::LicenseService;
use crate::tests::common::{
    count, create_campus, create_campus_admin, create_super_admin, create_test_db,
};
use crate::utils::ApiError;

fn license_request(campus_id: i64, max_activations: i64) -> CreateLicenseRequest {
    let now = Utc::now();
    CreateLicenseRequest {
        license_type: LicenseType::Premium,
        campus_id,
        organization_name: "星火乒乓俱乐部".to_string(),
        contact_person: "陈经理".to_string(),
        contact_phone: "13912345678".to_string(),
        contact_email: Some("ops@example.com".to_string()),
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(365),
        max_users: None,
        max_coaches: None,
        max_students: None,
        allow_competitions: None,
        allow_evaluations: None,
        allow_advanced_reports: Some(true),
        allow_api_access: None,
        annual_fee: Some(1200.0),
        max_activations: Some(max_activations),
        notes: None,
    }
}

fn validate(key: &str, fingerprint: &str) -> ValidateLicenseRequest {
    ValidateLicenseRequest {
        license_key: key.to_string(),
        hardware_fingerprint: fingerprint.to_string(),
        client_info: Some("desktop 1.0".to_string()),
    }
}

#[tokio::test]
async fn test_only_super_admin_issues_licenses() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_campus_admin(&pool, "admin_l", campus_id).await;
    let root = create_super_admin(&pool).await;
    let service = LicenseService::new(pool.clone());

    let denied = service.create(&admin, license_request(campus_id, 2)).await;
    assert!(matches!(denied, Err(ApiError::Forbidden(_))));

    let mut bad_phone = license_request(campus_id, 2);
    bad_phone.contact_phone = "12345".to_string();
    assert!(matches!(service.create(&root, bad_phone).await, Err(ApiError::ValidationError(_))));

    let license = service.create(&root, license_request(campus_id, 2)).await.unwrap();
    assert_eq!(license.status, "active");
    assert_eq!(license.license_key.len(), 19);
    assert_eq!(license.license_key.matches('-').count(), 3);
    assert_eq!(license.max_users, 100);
    assert!(license.allow_advanced_reports);

    // 授权费以待支付流水记录
    let pending = count(
        &pool,
        "SELECT COUNT(*) FROM payments WHERE payment_type = 'license' AND status = 'pending'",
    )
    .await;
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_activation_limit_counts_distinct_devices() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let root = create_super_admin(&pool).await;
    let service = LicenseService::new(pool.clone());
    let license = service.create(&root, license_request(campus_id, 2)).await.unwrap();
    let key = license.license_key.as_str();

    let first = service.validate(validate(key, "device-a"), Some("10.0.0.1".into())).await.unwrap();
    assert!(first.valid);
    assert_eq!(first.license_type.as_deref(), Some("premium"));
    let code = first.activation_code.clone().expect("activation code");
    assert_eq!(code.len(), 32);

    // 同一设备再次校验复用原激活码
    let again = service.validate(validate(key, "device-a"), None).await.unwrap();
    assert_eq!(again.activation_code, Some(code));

    assert!(service.validate(validate(key, "device-b"), None).await.unwrap().valid);
    let third = service.validate(validate(key, "device-c"), None).await.unwrap();
    assert!(!third.valid);
    assert!(third.activation_code.is_none());

    // 解绑一台设备后可以激活新设备
    service.deactivate(&root, license.id, "device-b").await.unwrap();
    assert!(service.validate(validate(key, "device-c"), None).await.unwrap().valid);

    let activations = service.activations(&root, license.id).await.unwrap();
    assert_eq!(activations.len(), 3);
    assert_eq!(activations.iter().filter(|a| a.is_active).count(), 2);

    let unknown = service.validate(validate("NOPE-NOPE-NOPE-NOPE", "device-a"), None).await.unwrap();
    assert!(!unknown.valid);
}

#[tokio::test]
async fn test_expired_license_is_marked_and_renewable() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let root = create_super_admin(&pool).await;
    let service = LicenseService::new(pool.clone());

    let mut req = license_request(campus_id, 1);
    req.start_date = Utc::now() - Duration::days(400);
    req.end_date = Utc::now() - Duration::days(1);
    let license = service.create(&root, req).await.unwrap();

    let result = service.validate(validate(&license.license_key, "pc"), None).await.unwrap();
    assert!(!result.valid);
    assert_eq!(service.get(&root, license.id).await.unwrap().status, "expired");

    assert!(matches!(service.renew(&root, license.id, 0).await, Err(ApiError::ValidationError(_))));

    let renewed = service.renew(&root, license.id, 12).await.unwrap();
    assert_eq!(renewed.status, "active");
    assert!(renewed.end_date > Utc::now() + Duration::days(359));

    let renewal_fee: f64 = sqlx::query_scalar(
        "SELECT amount FROM payments WHERE payment_type = 'license' AND related_id = ? ORDER BY id DESC LIMIT 1",
    )
    .bind(license.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(renewal_fee, 1200.0);

    assert!(service.validate(validate(&license.license_key, "pc"), None).await.unwrap().valid);
}

#[tokio::test]
async fn test_heartbeat_records_usage() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let root = create_super_admin(&pool).await;
    let service = LicenseService::new(pool.clone());
    let license = service.create(&root, license_request(campus_id, 1)).await.unwrap();

    let missing = service
        .heartbeat(HeartbeatRequest {
            license_key: "XXXX-XXXX-XXXX-XXXX".into(),
            hardware_fingerprint: "pc".into(),
            usage_stats: None,
        })
        .await
        .unwrap();
    assert_eq!(missing.status, "error");

    let beat = service
        .heartbeat(HeartbeatRequest {
            license_key: license.license_key.clone(),
            hardware_fingerprint: "pc".into(),
            usage_stats: Some(UsageStats { active_users: 12, bookings_count: 40, ..Default::default() }),
        })
        .await
        .unwrap();
    assert_eq!(beat.status, "success");
    assert_eq!(beat.license_status.as_deref(), Some("active"));

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM license_usage_logs").await, 1);
    assert!(service.get(&root, license.id).await.unwrap().last_heartbeat.is_some());
}
