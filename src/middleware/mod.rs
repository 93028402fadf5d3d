pub mod auth;

pub use auth::{AuthState, CurrentUser, auth_middleware};
