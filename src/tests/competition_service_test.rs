use chrono::{Duration, Utc};

use crate::middleware::CurrentUser;
use crate::models::{
    CompetitionQuery, CompetitionStatus, ConfirmPaymentRequest, CreateCompetitionRequest, GroupType,
    MatchStatus, UpdateMatchRequest,
};
use crate::services::{CompetitionService, PaymentService};
use crate::tests::common::{
    create_campus, create_campus_admin, create_student, create_test_db, recharge,
};
use crate::utils::ApiError;

fn open_competition(campus_id: i64, fee: f64) -> CreateCompetitionRequest {
    let date = Utc::now() + Duration::days(14);
    CreateCompetitionRequest {
        title: "月度积分赛".to_string(),
        description: None,
        competition_date: date,
        registration_deadline: date - Duration::days(3),
        registration_fee: fee,
        max_participants: 32,
        campus_id,
        status: Some(CompetitionStatus::Registration),
    }
}

#[tokio::test]
async fn test_create_rejects_deadline_after_competition() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_campus_admin(&pool, "admin_c", campus_id).await;
    let service = CompetitionService::new(pool.clone());

    let mut req = open_competition(campus_id, 30.0);
    req.registration_deadline = req.competition_date + Duration::hours(1);
    assert!(matches!(service.create(&admin, req).await, Err(ApiError::ValidationError(_))));

    let other = create_campus(&pool, "分部").await;
    let foreign = service.create(&admin, open_competition(other, 30.0)).await;
    assert!(matches!(foreign, Err(ApiError::Forbidden(_))));
}

#[tokio::test]
async fn test_paid_registration_confirms_after_payment() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_campus_admin(&pool, "admin_c", campus_id).await;
    let (student, student_id) = create_student(&pool, "stu_c", campus_id).await;
    let service = CompetitionService::new(pool.clone());
    let payments = PaymentService::new(pool.clone());

    let competition = service.create(&admin, open_competition(campus_id, 30.0)).await.unwrap();
    assert_eq!(competition.registered_count, 0);
    let registration = service.register(&student, competition.id, GroupType::B).await.unwrap();
    assert_eq!(registration.student_id, student_id);
    assert!(!registration.is_confirmed);
    let payment_id = registration.payment_id.expect("fee payment created");

    let again = service.register(&student, competition.id, GroupType::A).await;
    assert!(matches!(again, Err(ApiError::Conflict(_))));

    let unpaid = service.confirm_registration(&student, registration.id).await;
    assert!(matches!(unpaid, Err(ApiError::ValidationError(_))));

    recharge(&pool, student.user_id, 30.0).await;
    payments
        .confirm_payment(&student, payment_id, ConfirmPaymentRequest { transaction_id: None })
        .await
        .unwrap();
    let confirmed = service.confirm_registration(&student, registration.id).await.unwrap();
    assert!(confirmed.is_confirmed);
    assert_eq!(payments.balance(student.user_id).await.unwrap(), 0.0);

    // 只有确认后的报名计入人数
    assert_eq!(service.get(competition.id).await.unwrap().registered_count, 1);
    let listed = service
        .list(&CompetitionQuery { status: None, campus_id: Some(campus_id), skip: 0, limit: 100 })
        .await
        .unwrap();
    assert_eq!(listed[0].registered_count, 1);
}

#[tokio::test]
async fn test_registration_requires_open_status() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_campus_admin(&pool, "admin_c", campus_id).await;
    let (student, _) = create_student(&pool, "stu_early", campus_id).await;
    let service = CompetitionService::new(pool.clone());

    let mut req = open_competition(campus_id, 0.0);
    req.status = None;
    let upcoming = service.create(&admin, req).await.unwrap();
    assert_eq!(upcoming.status, "upcoming");

    let result = service.register(&student, upcoming.id, GroupType::A).await;
    assert!(matches!(result, Err(ApiError::ValidationError(_))));
}

#[tokio::test]
async fn test_draw_with_odd_entrants_gives_bye_and_scores_decide_winner() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let admin = create_campus_admin(&pool, "admin_c", campus_id).await;
    let service = CompetitionService::new(pool.clone());
    let competition = service.create(&admin, open_competition(campus_id, 0.0)).await.unwrap();

    let mut players: Vec<(CurrentUser, i64)> = Vec::new();
    for name in ["stu_1", "stu_2", "stu_3"] {
        players.push(create_student(&pool, name, campus_id).await);
    }

    // 免费比赛报名即确认
    for (student, _) in &players {
        let reg = service.register(student, competition.id, GroupType::A).await.unwrap();
        assert!(reg.is_confirmed);
        assert!(reg.payment_id.is_none());
    }

    let too_few = service.draw(&admin, competition.id, GroupType::C).await;
    assert!(matches!(too_few, Err(ApiError::ValidationError(_))));

    let matches = service.draw(&admin, competition.id, GroupType::A).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(service.get(competition.id).await.unwrap().status, "draw_complete");

    let bye = matches.iter().find(|m| m.player2_id.is_none()).expect("one bye");
    assert_eq!(bye.winner_id, bye.player1_id);
    assert_eq!(bye.match_status, MatchStatus::Completed.as_str());

    let real = matches.iter().find(|m| m.player2_id.is_some()).expect("one real match");
    let partial = service
        .update_match(
            &admin,
            real.id,
            UpdateMatchRequest { player1_score: Some(3), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(partial.match_status, "pending");
    assert!(partial.winner_id.is_none());

    let done = service
        .update_match(
            &admin,
            real.id,
            UpdateMatchRequest { player2_score: Some(1), ..Default::default() },
        )
        .await
        .unwrap();
    assert_eq!(done.match_status, "completed");
    assert_eq!(done.winner_id, real.player1_id);

    let negative = service
        .update_match(
            &admin,
            real.id,
            UpdateMatchRequest { player1_score: Some(-1), ..Default::default() },
        )
        .await;
    assert!(matches!(negative, Err(ApiError::ValidationError(_))));

    // 重新抽签会替换该组原有对阵
    let redrawn = service.draw(&admin, competition.id, GroupType::A).await.unwrap();
    assert_eq!(redrawn.len(), 2);
    assert_eq!(service.matches(competition.id, None).await.unwrap().len(), 2);
}
