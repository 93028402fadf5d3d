// Router-level tests: bearer authentication and the register/login round trip

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::build_router;
use crate::models::UserRole;
use crate::tests::common::{create_campus, create_test_db, create_user, test_jwt, test_state};

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let pool = create_test_db().await;
    let app = build_router(test_state(&pool));

    let (status, _) = send(&app, get("/api/v1/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/api/v1/auth/me", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_valid_token_reaches_handler_and_inactive_user_is_rejected() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let user_id = create_user(&pool, "stu_token", UserRole::Student, Some(campus_id)).await;
    let app = build_router(test_state(&pool));

    let token = test_jwt().generate_token(user_id, "stu_token", "student").unwrap();
    let (status, body) = send(&app, get("/api/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "stu_token");

    // 学员访问管理员接口
    let (status, _) = send(&app, get("/api/v1/system-logs", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
        .bind(user_id)
        .execute(&pool)
        .await
        .unwrap();
    let (status, _) = send(&app, get("/api/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_then_login() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let app = build_router(test_state(&pool));

    let registration = json!({
        "username": "new_player",
        "password": "Pingpong#1",
        "real_name": "刘小龙",
        "phone": "13712345678",
        "campus_id": campus_id
    });
    let (status, body) = send(&app, post_json("/api/v1/auth/register/student", registration.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "student");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let (status, _) = send(&app, post_json("/api/v1/auth/register/student", registration)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let weak = json!({
        "username": "weak_player",
        "password": "password",
        "real_name": "弱密码",
        "phone": "13712345679"
    });
    let (status, _) = send(&app, post_json("/api/v1/auth/register/student", weak)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        post_json("/api/v1/auth/login", json!({ "username": "new_player", "password": "Pingpong#1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/api/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["real_name"], "刘小龙");

    let (status, _) = send(
        &app,
        post_json("/api/v1/auth/login", json!({ "username": "new_player", "password": "Wrong#123" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let logged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_logs WHERE action = 'user_register'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logged, 1);
}

#[tokio::test]
async fn test_malformed_input_uses_error_envelope() {
    let pool = create_test_db().await;
    let campus_id = create_campus(&pool, "总部").await;
    let user_id = create_user(&pool, "stu_input", UserRole::Student, Some(campus_id)).await;
    let app = build_router(test_state(&pool));

    let broken = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().starts_with("请求体格式错误"));

    let token = test_jwt().generate_token(user_id, "stu_input", "student").unwrap();
    let (status, body) = send(&app, get("/api/v1/bookings?limit=many", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(&app, get("/api/v1/bookings/first", Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_handler_panic_becomes_500_envelope() {
    use axum::routing::get as get_route;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn explode() -> &'static str {
        panic!("unexpected state")
    }

    let app = Router::new()
        .route("/explode", get_route(explode))
        .layer(CatchPanicLayer::custom(crate::utils::panic_response));

    let (status, body) = send(&app, get("/explode", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "服务器内部错误");
}
