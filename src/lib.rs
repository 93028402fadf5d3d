//! Table tennis training center back office
//!
//! 校区、教练、学员、预约、支付、比赛与软件授权的后台服务。

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{BusinessConfig, Config};
pub use routes::build_router;
pub use services::{
    AuthService, BookingService, CampusService, CoachService, CoachStudentService, CommentService,
    CompetitionService, EvaluationService, LicenseService, NotificationService, PaymentService,
    StudentService, SystemLogService, UserService,
};
pub use utils::JwtUtil;

/// Application shared state
///
/// 所有服务都包在 Arc 里，clone 只增加引用计数。
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jwt_util: Arc<JwtUtil>,
    pub business: BusinessConfig,

    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub campus_service: Arc<CampusService>,
    pub coach_service: Arc<CoachService>,
    pub student_service: Arc<StudentService>,
    pub coach_student_service: Arc<CoachStudentService>,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub evaluation_service: Arc<EvaluationService>,
    pub comment_service: Arc<CommentService>,
    pub competition_service: Arc<CompetitionService>,
    pub notification_service: Arc<NotificationService>,
    pub license_service: Arc<LicenseService>,
    pub system_log_service: Arc<SystemLogService>,
}

impl AppState {
    /// Wire every service onto one pool.
    pub fn new(pool: SqlitePool, jwt_util: Arc<JwtUtil>, business: BusinessConfig) -> Self {
        let notification_service = Arc::new(NotificationService::new(pool.clone()));

        Self {
            auth_service: Arc::new(AuthService::new(pool.clone(), Arc::clone(&jwt_util))),
            user_service: Arc::new(UserService::new(pool.clone())),
            campus_service: Arc::new(CampusService::new(pool.clone())),
            coach_service: Arc::new(CoachService::new(pool.clone(), business.clone())),
            student_service: Arc::new(StudentService::new(pool.clone())),
            coach_student_service: Arc::new(CoachStudentService::new(
                pool.clone(),
                business.clone(),
                Arc::clone(&notification_service),
            )),
            booking_service: Arc::new(BookingService::new(
                pool.clone(),
                business.clone(),
                Arc::clone(&notification_service),
            )),
            payment_service: Arc::new(PaymentService::new(pool.clone())),
            evaluation_service: Arc::new(EvaluationService::new(pool.clone())),
            comment_service: Arc::new(CommentService::new(pool.clone())),
            competition_service: Arc::new(CompetitionService::new(pool.clone())),
            license_service: Arc::new(LicenseService::new(pool.clone())),
            system_log_service: Arc::new(SystemLogService::new(pool.clone())),
            notification_service,
            db: pool,
            jwt_util,
            business,
        }
    }
}
