// Test modules

mod auth_middleware_test;
mod booking_service_test;
mod campus_isolation_test;
mod coach_student_service_test;
mod comment_service_test;
pub mod common;
mod competition_service_test;
mod evaluation_service_test;
mod license_service_test;
mod models_test;
mod notification_service_test;
mod payment_service_test;
mod system_log_service_test;
