// Account ledger: recharge channels, admin scope, deductions and refunds

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::{
    ConfirmPaymentRequest, OfflinePaymentRequest, PaymentMethod, PaymentQuery, PaymentType,
    RechargeRequest, RefundRequest,
};
use crate::services::PaymentService;
use crate::services::payment_service::deduct_on;
use crate::tests::common::{
    create_campus, create_campus_admin, create_student, create_super_admin, create_test_db,
};
use crate::utils::ApiError;

/// 待支付的比赛报名费
async fn pending_expense(pool: &SqlitePool, user_id: i64, amount: f64) -> i64 {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO payments (user_id, payment_type, amount, payment_method, status, created_at, updated_at)
        VALUES (?, 'competition', ?, 'balance', 'pending', ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

#[tokio::test]
async fn test_online_recharge_accepts_wechat_and_alipay_only() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, _) = create_student(&pool, "stu_pay", campus_id).await;
    let service = PaymentService::new(pool.clone());

    let wechat = service
        .recharge(&student, RechargeRequest { amount: 200.0, payment_method: PaymentMethod::Wechat })
        .await
        .unwrap();
    assert_eq!(wechat.status, "success");
    assert_eq!(wechat.payment_type, "recharge");

    let offline = service
        .recharge(&student, RechargeRequest { amount: 50.0, payment_method: PaymentMethod::Offline })
        .await;
    assert!(matches!(offline, Err(ApiError::ValidationError(_))));

    let zero = service
        .recharge(&student, RechargeRequest { amount: 0.0, payment_method: PaymentMethod::Alipay })
        .await;
    assert!(matches!(zero, Err(ApiError::ValidationError(_))));

    assert_eq!(service.balance(student.user_id).await.unwrap(), 200.0);
}

#[tokio::test]
async fn test_offline_payment_is_scoped_to_admin_campus() {
    let pool = create_test_db().await;
    let east = create_campus(&pool, "东区").await;
    let west = create_campus(&pool, "西区").await;
    let (student, _) = create_student(&pool, "stu_east", east).await;
    let west_admin = create_campus_admin(&pool, "admin_west", west).await;
    let east_admin = create_campus_admin(&pool, "admin_east", east).await;
    let service = PaymentService::new(pool.clone());

    let req = || OfflinePaymentRequest { user_id: student.user_id, amount: 300.0, description: None };

    assert!(matches!(service.offline_payment(&student, req()).await, Err(ApiError::Forbidden(_))));
    assert!(matches!(service.offline_payment(&west_admin, req()).await, Err(ApiError::Forbidden(_))));

    let paid = service.offline_payment(&east_admin, req()).await.unwrap();
    assert_eq!(paid.payment_method, "offline");
    assert_eq!(paid.created_by, Some(east_admin.user_id));
    assert_eq!(service.balance(student.user_id).await.unwrap(), 300.0);
}

#[tokio::test]
async fn test_deduct_requires_sufficient_balance() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, _) = create_student(&pool, "stu_poor", campus_id).await;
    let service = PaymentService::new(pool.clone());
    let mut conn = pool.acquire().await.unwrap();

    let short = deduct_on(&mut conn, student.user_id, 100.0, PaymentType::Booking, Some(1), "课程费用").await;
    assert!(matches!(short, Err(ApiError::ValidationError(_))));
    drop(conn);

    service
        .recharge(&student, RechargeRequest { amount: 100.0, payment_method: PaymentMethod::Alipay })
        .await
        .unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let paid_id = deduct_on(&mut conn, student.user_id, 100.0, PaymentType::Booking, Some(1), "课程费用")
        .await
        .unwrap();
    drop(conn);
    let paid = service.get_payment(paid_id).await.unwrap();
    assert_eq!(paid.payment_method, "balance");
    assert_eq!(paid.status, "success");
    assert_eq!(service.balance(student.user_id).await.unwrap(), 0.0);

    let mut conn = pool.acquire().await.unwrap();
    let wrong_type = deduct_on(&mut conn, student.user_id, 1.0, PaymentType::Recharge, None, "x").await;
    assert!(matches!(wrong_type, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_amount_rounding_to_zero_is_rejected() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, _) = create_student(&pool, "stu_cent", campus_id).await;
    let root = create_super_admin(&pool).await;
    let service = PaymentService::new(pool.clone());

    let tiny = service
        .recharge(&student, RechargeRequest { amount: 0.001, payment_method: PaymentMethod::Wechat })
        .await;
    assert!(matches!(tiny, Err(ApiError::ValidationError(_))));

    let tiny_refund = service
        .refund(
            &root,
            RefundRequest { user_id: student.user_id, amount: 0.004, reason: "补差".to_string() },
        )
        .await;
    assert!(matches!(tiny_refund, Err(ApiError::ValidationError(_))));
    assert_eq!(service.balance(student.user_id).await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_confirm_pending_expense_checks_balance() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, _) = create_student(&pool, "stu_fee", campus_id).await;
    let service = PaymentService::new(pool.clone());
    let payment_id = pending_expense(&pool, student.user_id, 80.0).await;

    let broke = service
        .confirm_payment(&student, payment_id, ConfirmPaymentRequest { transaction_id: None })
        .await;
    assert!(matches!(broke, Err(ApiError::ValidationError(_))));

    service
        .recharge(&student, RechargeRequest { amount: 100.0, payment_method: PaymentMethod::Wechat })
        .await
        .unwrap();
    let confirmed = service
        .confirm_payment(&student, payment_id, ConfirmPaymentRequest { transaction_id: None })
        .await
        .unwrap();
    assert_eq!(confirmed.status, "success");
    assert!(confirmed.transaction_id.as_deref().is_some_and(|t| t.starts_with("TXN")));
    assert_eq!(service.balance(student.user_id).await.unwrap(), 20.0);

    let twice = service
        .confirm_payment(&student, payment_id, ConfirmPaymentRequest { transaction_id: None })
        .await;
    assert!(matches!(twice, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_refund_and_summary() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let (student, _) = create_student(&pool, "stu_sum", campus_id).await;
    let root = create_super_admin(&pool).await;
    let service = PaymentService::new(pool.clone());

    service
        .recharge(&student, RechargeRequest { amount: 500.0, payment_method: PaymentMethod::Wechat })
        .await
        .unwrap();
    {
        let mut conn = pool.acquire().await.unwrap();
        deduct_on(&mut conn, student.user_id, 200.0, PaymentType::Booking, Some(7), "课程费用")
            .await
            .unwrap();
    }

    let denied = service
        .refund(&student, RefundRequest { user_id: student.user_id, amount: 50.0, reason: "自助退款".into() })
        .await;
    assert!(matches!(denied, Err(ApiError::Forbidden(_))));

    service
        .refund(&root, RefundRequest { user_id: student.user_id, amount: 50.0, reason: "课程取消".into() })
        .await
        .unwrap();

    let summary = service.summary(student.user_id).await.unwrap();
    assert_eq!(summary.total_recharge, 500.0);
    assert_eq!(summary.total_expense, 200.0);
    assert_eq!(summary.total_refund, 50.0);
    assert_eq!(summary.current_balance, 350.0);
    assert_eq!(summary.payment_count, 3);
    assert_eq!(service.balance(student.user_id).await.unwrap(), 350.0);

    let refunds = service
        .records(
            student.user_id,
            &PaymentQuery { payment_type: Some(PaymentType::Refund), skip: 0, limit: 100 },
        )
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].description.as_deref(), Some("课程取消"));
}
