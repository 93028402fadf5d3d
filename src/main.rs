use axum::Router;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tabletennis_admin::config::Config;
use tabletennis_admin::utils::JwtUtil;
use tabletennis_admin::{AppState, build_router, db, handlers, models};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Auth
        handlers::auth::register_student,
        handlers::auth::register_coach,
        handlers::auth::login,
        handlers::auth::me,
        // Users
        handlers::user::get_me,
        handlers::user::update_me,
        handlers::user::change_password,
        handlers::user::create_user,
        handlers::user::get_user,
        handlers::user::update_user,
        handlers::user::deactivate_user,
        handlers::user::list_by_campus,
        // Campus
        handlers::campus::create_campus,
        handlers::campus::list_campuses,
        handlers::campus::get_main_campus,
        handlers::campus::get_campus,
        handlers::campus::update_campus,
        handlers::campus::delete_campus,
        handlers::campus::assign_admin,
        // Coaches
        handlers::coach::list_coaches,
        handlers::coach::search_coaches,
        handlers::coach::pending_coaches,
        handlers::coach::available_coaches,
        handlers::coach::my_students,
        handlers::coach::get_coach,
        handlers::coach::update_coach,
        handlers::coach::approve_coach,
        handlers::coach::coach_students,
        handlers::coach::evaluation_summary,
        handlers::coach::comment_stats,
        // Students
        handlers::student::list_students,
        handlers::student::get_me,
        handlers::student::get_student,
        handlers::student::update_student,
        handlers::student::student_coaches,
        handlers::student::student_bookings,
        handlers::student::student_balance,
        handlers::student::comment_stats,
        // Coach-student relations
        handlers::coach_student::apply,
        handlers::coach_student::approve,
        handlers::coach_student::request_change,
        handlers::coach_student::pending_approvals,
        handlers::coach_student::list_for_student,
        handlers::coach_student::list_for_coach,
        handlers::coach_student::delete_relation,
        // Bookings
        handlers::booking::create_booking,
        handlers::booking::list_bookings,
        handlers::booking::my_pending,
        handlers::booking::coach_schedule,
        handlers::booking::available_tables,
        handlers::booking::monthly_statistics,
        handlers::booking::get_booking,
        handlers::booking::respond_booking,
        handlers::booking::cancel_booking,
        handlers::booking::complete_booking,
        // Payments
        handlers::payment::balance,
        handlers::payment::recharge,
        handlers::payment::offline_payment,
        handlers::payment::confirm_payment,
        handlers::payment::fail_payment,
        handlers::payment::refund,
        handlers::payment::records,
        handlers::payment::records_for,
        handlers::payment::all_payments,
        handlers::payment::summary,
        handlers::payment::wechat_qr,
        handlers::payment::alipay_qr,
        // Evaluations
        handlers::evaluation::create_evaluation,
        handlers::evaluation::list_evaluations,
        handlers::evaluation::pending_evaluations,
        handlers::evaluation::evaluation_statistics,
        handlers::evaluation::course_evaluations,
        handlers::evaluation::get_evaluation,
        handlers::evaluation::update_evaluation,
        handlers::evaluation::delete_evaluation,
        // Comments
        handlers::comment::create_comment,
        handlers::comment::my_comments,
        handlers::comment::by_booking,
        handlers::comment::by_coach,
        handlers::comment::by_student,
        handlers::comment::get_comment,
        handlers::comment::update_comment,
        handlers::comment::delete_comment,
        // Competitions
        handlers::competition::create_competition,
        handlers::competition::list_competitions,
        handlers::competition::competition_statistics,
        handlers::competition::my_registrations,
        handlers::competition::confirm_registration,
        handlers::competition::update_match,
        handlers::competition::get_competition,
        handlers::competition::update_competition,
        handlers::competition::register,
        handlers::competition::registrations,
        handlers::competition::draw,
        handlers::competition::matches,
        // Notifications
        handlers::notification::create_notification,
        handlers::notification::bulk_notifications,
        handlers::notification::list_notifications,
        handlers::notification::unread_count,
        handlers::notification::mark_all_read,
        handlers::notification::notification_statistics,
        handlers::notification::get_settings,
        handlers::notification::update_settings,
        handlers::notification::list_templates,
        handlers::notification::create_template,
        handlers::notification::send_from_template,
        handlers::notification::get_notification,
        handlers::notification::mark_read,
        handlers::notification::delete_notification,
        // Licenses
        handlers::license::create_license,
        handlers::license::list_licenses,
        handlers::license::license_statistics,
        handlers::license::get_by_key,
        handlers::license::validate_license,
        handlers::license::heartbeat,
        handlers::license::get_license,
        handlers::license::update_license,
        handlers::license::activations,
        handlers::license::renew_license,
        handlers::license::deactivate_license,
        // System logs
        handlers::system_log::list_logs,
        handlers::system_log::logs_by_campus,
        handlers::system_log::log_statistics,
        handlers::system_log::export_logs,
        handlers::system_log::cleanup_logs,
        handlers::system_log::get_log,
    ),
    components(
        schemas(
            models::UserRole, models::User, models::UserResponse, models::RegisterStudentRequest,
            models::RegisterCoachRequest, models::LoginRequest, models::LoginResponse,
            models::UpdateMeRequest, models::ChangePasswordRequest, models::AdminUpdateUserRequest,
            models::AdminCreateUserRequest,
            models::Campus, models::CreateCampusRequest, models::UpdateCampusRequest,
            models::AssignAdminRequest,
            models::CoachLevel, models::ApprovalStatus, models::Coach, models::CoachDetail,
            models::UpdateCoachRequest, models::ApproveCoachRequest,
            models::Student, models::StudentDetail, models::StudentProfile, models::StudentBalance,
            models::UpdateStudentRequest,
            models::RelationStatus, models::CoachStudent, models::RelationDetail,
            models::ApplyCoachRequest, models::ApproveRelationRequest, models::ChangeCoachRequest,
            models::BookingStatus, models::BookingAction, models::Booking, models::Course,
            models::CreateBookingRequest, models::RespondBookingRequest,
            models::CancelBookingRequest, models::CompleteBookingRequest, models::ScheduleEntry,
            models::AvailableTables, models::MonthlyStatistics,
            models::PaymentType, models::PaymentStatus, models::PaymentMethod, models::Payment,
            models::RechargeRequest, models::OfflinePaymentRequest, models::ConfirmPaymentRequest,
            models::RefundRequest, models::BalanceResponse, models::PaymentSummary,
            models::QrCodeResponse,
            models::EvaluatorType, models::Evaluation, models::CreateEvaluationRequest,
            models::UpdateEvaluationRequest, models::PendingEvaluation,
            models::EvaluationStatistics,
            models::Comment, models::CommentDetail, models::CreateCommentRequest,
            models::UpdateCommentRequest, models::CommentStatistics,
            models::CompetitionStatus, models::GroupType, models::MatchStatus, models::Competition,
            models::CompetitionRegistration, models::CompetitionMatch,
            models::CreateCompetitionRequest, models::UpdateCompetitionRequest,
            models::RegisterCompetitionRequest, models::DrawRequest, models::UpdateMatchRequest,
            models::CompetitionStatistics,
            models::NotificationType, models::NotificationPriority, models::Notification,
            models::NotificationSettings, models::NotificationTemplate,
            models::CreateNotificationRequest, models::BulkNotificationRequest,
            models::NotificationStatistics, models::CountResponse, models::UpdateSettingsRequest,
            models::CreateTemplateRequest, models::SendTemplateRequest,
            models::LicenseType, models::LicenseStatus, models::License, models::LicenseActivation,
            models::LicenseFeatures, models::CreateLicenseRequest, models::UpdateLicenseRequest,
            models::ValidateLicenseRequest, models::LicenseValidation, models::UsageStats,
            models::HeartbeatRequest, models::HeartbeatResponse, models::RenewLicenseRequest,
            models::DeactivateLicenseRequest, models::LicenseStatistics,
            models::SystemLog, models::ActionCount, models::UserActionCount, models::LogStatistics,
            models::CleanupResult,
        )
    ),
    tags(
        (name = "Authentication", description = "Registration and login"),
        (name = "Users", description = "Account management"),
        (name = "Campus", description = "Campus management"),
        (name = "Coaches", description = "Coach profiles and approval"),
        (name = "Students", description = "Student profiles"),
        (name = "Coach-Student", description = "Two-way coach selection"),
        (name = "Bookings", description = "Lesson booking and table allocation"),
        (name = "Payments", description = "Account balance and payment records"),
        (name = "Evaluations", description = "Post-lesson evaluations"),
        (name = "Comments", description = "Lesson comments and ratings"),
        (name = "Competitions", description = "Monthly competitions"),
        (name = "Notifications", description = "In-app notifications"),
        (name = "Licenses", description = "Software license management"),
        (name = "System Logs", description = "Audit trail"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first
    let config = Config::load()?;

    // Initialize logging
    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // 配置了日志文件时按天滚动，同时保留控制台输出
    let _guard = if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tabletennis.log");
        // rolling appender adds the date suffix itself
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    };
    tracing::info!("Table tennis admin starting up");
    tracing::info!("Configuration loaded successfully");

    let pool = db::create_pool(&config.database.url).await?;
    tracing::info!("Database pool created successfully");

    let jwt_util = Arc::new(JwtUtil::new(&config.auth.jwt_secret, &config.auth.jwt_expires_in));
    let app_state = AppState::new(pool, jwt_util, config.business.clone());

    app_state
        .user_service
        .ensure_super_admin(
            &config.auth.bootstrap_admin_username,
            &config.auth.bootstrap_admin_password,
        )
        .await?;

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(build_router(Arc::new(app_state)))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
