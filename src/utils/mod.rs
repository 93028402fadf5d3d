pub mod error;
pub mod handler_helpers;
pub mod jwt;
pub mod money;
pub mod password;
pub mod string_ext;

pub use error::{ApiError, ApiResult, panic_response};
pub use handler_helpers::{
    campus_filter, check_campus_scope, require_admin, require_role, require_super_admin,
};
pub use jwt::{Claims, JwtUtil};
pub use money::round2;
pub use password::{hash_password, validate_password_strength, verify_password};
pub use string_ext::{StringExt, is_valid_hhmm, is_valid_phone};
