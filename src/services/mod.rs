pub mod auth_service;
pub mod booking_service;
pub mod campus_service;
pub mod coach_service;
pub mod coach_student_service;
pub mod comment_service;
pub mod competition_service;
pub mod evaluation_service;
pub mod license_service;
pub mod notification_service;
pub mod payment_service;
pub mod student_service;
pub mod system_log_service;
pub mod user_service;

pub use auth_service::AuthService;
pub use booking_service::BookingService;
pub use campus_service::CampusService;
pub use coach_service::CoachService;
pub use coach_student_service::CoachStudentService;
pub use comment_service::CommentService;
pub use competition_service::CompetitionService;
pub use evaluation_service::EvaluationService;
pub use license_service::LicenseService;
pub use notification_service::NotificationService;
pub use payment_service::PaymentService;
pub use student_service::StudentService;
pub use system_log_service::SystemLogService;
pub use user_service::UserService;
