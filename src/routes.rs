use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

use crate::utils::panic_response;
use crate::{AppState, handlers, middleware};

/// 组装 /api/v1 下的全部路由（不含 Swagger 与全局 layer）
pub fn build_router(state: Arc<AppState>) -> Router {
    let auth_state = middleware::AuthState {
        jwt_util: Arc::clone(&state.jwt_util),
        db: state.db.clone(),
    };

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/v1/auth/register/student", post(handlers::auth::register_student))
        .route("/api/v1/auth/register/coach", post(handlers::auth::register_coach))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/licenses/validate", post(handlers::license::validate_license))
        .route("/api/v1/licenses/heartbeat", post(handlers::license::heartbeat))
        .with_state(Arc::clone(&state));

    // Protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/api/v1/auth/me", get(handlers::auth::me))
        // Users
        .route("/api/v1/users", post(handlers::user::create_user))
        .route(
            "/api/v1/users/me",
            get(handlers::user::get_me).put(handlers::user::update_me),
        )
        .route("/api/v1/users/me/password", put(handlers::user::change_password))
        .route("/api/v1/users/campus/:campus_id", get(handlers::user::list_by_campus))
        .route(
            "/api/v1/users/:id",
            get(handlers::user::get_user)
                .put(handlers::user::update_user)
                .delete(handlers::user::deactivate_user),
        )
        // Campus
        .route(
            "/api/v1/campus",
            post(handlers::campus::create_campus).get(handlers::campus::list_campuses),
        )
        .route("/api/v1/campus/main", get(handlers::campus::get_main_campus))
        .route(
            "/api/v1/campus/:id",
            get(handlers::campus::get_campus)
                .put(handlers::campus::update_campus)
                .delete(handlers::campus::delete_campus),
        )
        .route("/api/v1/campus/:id/admin", put(handlers::campus::assign_admin))
        // Coaches
        .route("/api/v1/coaches", get(handlers::coach::list_coaches))
        .route("/api/v1/coaches/search", get(handlers::coach::search_coaches))
        .route("/api/v1/coaches/pending", get(handlers::coach::pending_coaches))
        .route("/api/v1/coaches/available", get(handlers::coach::available_coaches))
        .route("/api/v1/coaches/me/students", get(handlers::coach::my_students))
        .route(
            "/api/v1/coaches/:id",
            get(handlers::coach::get_coach).put(handlers::coach::update_coach),
        )
        .route("/api/v1/coaches/:id/approve", put(handlers::coach::approve_coach))
        .route("/api/v1/coaches/:id/students", get(handlers::coach::coach_students))
        .route(
            "/api/v1/coaches/:id/evaluation-summary",
            get(handlers::coach::evaluation_summary),
        )
        .route("/api/v1/coaches/:id/comment-stats", get(handlers::coach::comment_stats))
        // Students
        .route("/api/v1/students", get(handlers::student::list_students))
        .route("/api/v1/students/me", get(handlers::student::get_me))
        .route(
            "/api/v1/students/:id",
            get(handlers::student::get_student).put(handlers::student::update_student),
        )
        .route("/api/v1/students/:id/coaches", get(handlers::student::student_coaches))
        .route("/api/v1/students/:id/bookings", get(handlers::student::student_bookings))
        .route("/api/v1/students/:id/balance", get(handlers::student::student_balance))
        .route("/api/v1/students/:id/comment-stats", get(handlers::student::comment_stats))
        // Coach-student relations
        .route("/api/v1/coach-students/apply", post(handlers::coach_student::apply))
        .route("/api/v1/coach-students/change", post(handlers::coach_student::request_change))
        .route("/api/v1/coach-students/pending", get(handlers::coach_student::pending_approvals))
        .route(
            "/api/v1/coach-students/student/:student_id",
            get(handlers::coach_student::list_for_student),
        )
        .route(
            "/api/v1/coach-students/coach/:coach_id",
            get(handlers::coach_student::list_for_coach),
        )
        .route("/api/v1/coach-students/:id", delete(handlers::coach_student::delete_relation))
        .route("/api/v1/coach-students/:id/approve", put(handlers::coach_student::approve))
        // Bookings
        .route(
            "/api/v1/bookings",
            post(handlers::booking::create_booking).get(handlers::booking::list_bookings),
        )
        .route("/api/v1/bookings/pending", get(handlers::booking::my_pending))
        .route(
            "/api/v1/bookings/coach/:coach_id/schedule",
            get(handlers::booking::coach_schedule),
        )
        .route("/api/v1/bookings/tables/available", get(handlers::booking::available_tables))
        .route(
            "/api/v1/bookings/statistics/monthly",
            get(handlers::booking::monthly_statistics),
        )
        .route("/api/v1/bookings/:id", get(handlers::booking::get_booking))
        .route("/api/v1/bookings/:id/respond", put(handlers::booking::respond_booking))
        .route("/api/v1/bookings/:id/cancel", put(handlers::booking::cancel_booking))
        .route("/api/v1/bookings/:id/complete", put(handlers::booking::complete_booking))
        // Payments
        .route("/api/v1/payments/balance", get(handlers::payment::balance))
        .route("/api/v1/payments/recharge", post(handlers::payment::recharge))
        .route("/api/v1/payments/offline", post(handlers::payment::offline_payment))
        .route("/api/v1/payments/refund", post(handlers::payment::refund))
        .route("/api/v1/payments/records", get(handlers::payment::records))
        .route("/api/v1/payments/records/user/:user_id", get(handlers::payment::records_for))
        .route("/api/v1/payments/all", get(handlers::payment::all_payments))
        .route("/api/v1/payments/summary", get(handlers::payment::summary))
        .route("/api/v1/payments/:id/confirm", put(handlers::payment::confirm_payment))
        .route("/api/v1/payments/:id/fail", put(handlers::payment::fail_payment))
        .route("/api/v1/payments/:id/wechat-qr", get(handlers::payment::wechat_qr))
        .route("/api/v1/payments/:id/alipay-qr", get(handlers::payment::alipay_qr))
        // Evaluations
        .route(
            "/api/v1/evaluations",
            post(handlers::evaluation::create_evaluation)
                .get(handlers::evaluation::list_evaluations),
        )
        .route("/api/v1/evaluations/pending", get(handlers::evaluation::pending_evaluations))
        .route(
            "/api/v1/evaluations/statistics",
            get(handlers::evaluation::evaluation_statistics),
        )
        .route(
            "/api/v1/evaluations/course/:course_id",
            get(handlers::evaluation::course_evaluations),
        )
        .route(
            "/api/v1/evaluations/:id",
            get(handlers::evaluation::get_evaluation)
                .put(handlers::evaluation::update_evaluation)
                .delete(handlers::evaluation::delete_evaluation),
        )
        // Comments
        .route("/api/v1/comments", post(handlers::comment::create_comment))
        .route("/api/v1/comments/my", get(handlers::comment::my_comments))
        .route("/api/v1/comments/booking/:booking_id", get(handlers::comment::by_booking))
        .route("/api/v1/comments/coach/:coach_id", get(handlers::comment::by_coach))
        .route("/api/v1/comments/student/:student_id", get(handlers::comment::by_student))
        .route(
            "/api/v1/comments/:id",
            get(handlers::comment::get_comment)
                .put(handlers::comment::update_comment)
                .delete(handlers::comment::delete_comment),
        )
        // Competitions
        .route(
            "/api/v1/competitions",
            post(handlers::competition::create_competition)
                .get(handlers::competition::list_competitions),
        )
        .route(
            "/api/v1/competitions/statistics",
            get(handlers::competition::competition_statistics),
        )
        .route(
            "/api/v1/competitions/registrations/my",
            get(handlers::competition::my_registrations),
        )
        .route(
            "/api/v1/competitions/registrations/:id/confirm",
            put(handlers::competition::confirm_registration),
        )
        .route(
            "/api/v1/competitions/matches/:match_id",
            put(handlers::competition::update_match),
        )
        .route(
            "/api/v1/competitions/:id",
            get(handlers::competition::get_competition)
                .put(handlers::competition::update_competition),
        )
        .route("/api/v1/competitions/:id/register", post(handlers::competition::register))
        .route(
            "/api/v1/competitions/:id/registrations",
            get(handlers::competition::registrations),
        )
        .route("/api/v1/competitions/:id/draw", post(handlers::competition::draw))
        .route("/api/v1/competitions/:id/matches", get(handlers::competition::matches))
        // Notifications
        .route(
            "/api/v1/notifications",
            post(handlers::notification::create_notification)
                .get(handlers::notification::list_notifications),
        )
        .route("/api/v1/notifications/bulk", post(handlers::notification::bulk_notifications))
        .route("/api/v1/notifications/unread-count", get(handlers::notification::unread_count))
        .route("/api/v1/notifications/read-all", put(handlers::notification::mark_all_read))
        .route(
            "/api/v1/notifications/statistics",
            get(handlers::notification::notification_statistics),
        )
        .route(
            "/api/v1/notifications/settings",
            get(handlers::notification::get_settings)
                .put(handlers::notification::update_settings),
        )
        .route(
            "/api/v1/notifications/templates",
            get(handlers::notification::list_templates)
                .post(handlers::notification::create_template),
        )
        .route(
            "/api/v1/notifications/templates/send",
            post(handlers::notification::send_from_template),
        )
        .route(
            "/api/v1/notifications/:id",
            get(handlers::notification::get_notification)
                .delete(handlers::notification::delete_notification),
        )
        .route("/api/v1/notifications/:id/read", put(handlers::notification::mark_read))
        // Licenses
        .route(
            "/api/v1/licenses",
            post(handlers::license::create_license).get(handlers::license::list_licenses),
        )
        .route("/api/v1/licenses/statistics", get(handlers::license::license_statistics))
        .route("/api/v1/licenses/key/:license_key", get(handlers::license::get_by_key))
        .route(
            "/api/v1/licenses/:id",
            get(handlers::license::get_license).put(handlers::license::update_license),
        )
        .route("/api/v1/licenses/:id/activations", get(handlers::license::activations))
        .route("/api/v1/licenses/:id/renew", post(handlers::license::renew_license))
        .route("/api/v1/licenses/:id/deactivate", post(handlers::license::deactivate_license))
        // System logs
        .route("/api/v1/system-logs", get(handlers::system_log::list_logs))
        .route(
            "/api/v1/system-logs/campus/:campus_id",
            get(handlers::system_log::logs_by_campus),
        )
        .route("/api/v1/system-logs/statistics", get(handlers::system_log::log_statistics))
        .route("/api/v1/system-logs/export", get(handlers::system_log::export_logs))
        .route("/api/v1/system-logs/cleanup", delete(handlers::system_log::cleanup_logs))
        .route("/api/v1/system-logs/:id", get(handlers::system_log::get_log))
        .with_state(Arc::clone(&state))
        .layer(axum_middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(health_routes)
        .layer(CatchPanicLayer::custom(panic_response))
}

async fn health_check() -> &'static str {
    "OK"
}
