use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::models::UserRole;
use crate::utils::{ApiError, JwtUtil};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct AuthState {
    pub jwt_util: Arc<JwtUtil>,
    pub db: SqlitePool,
}

/// 当前登录用户，由中间件写入 request extensions
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct CurrentUser {
    pub user_id: i64,
    pub username: String,
    pub role: UserRole,
    pub campus_id: Option<i64>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::SuperAdmin | UserRole::CampusAdmin)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }
}

/// Authentication middleware.
/// 1. 验证 JWT
/// 2. 从数据库读取最新的角色、校区和启用状态（令牌中的角色可能已过期）
/// 3. 将 `CurrentUser` 写入 request extensions
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let uri = req.uri().path().to_string();
    let method = req.method().to_string();

    tracing::debug!("Auth middleware processing: {} {}", method, uri);

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing authorization header for {} {}", method, uri);
            ApiError::unauthorized("Missing authorization header")
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Invalid authorization header format for {} {}", method, uri);
        ApiError::unauthorized("Invalid authorization header format")
    })?;

    let claims = state.jwt_util.verify_token(token).map_err(|err| {
        tracing::warn!("JWT verification failed for {} {}: {:?}", method, uri, err);
        err
    })?;

    let user_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| ApiError::unauthorized("Invalid token subject"))?;

    let row: Option<(String, String, Option<i64>, bool)> =
        sqlx::query_as("SELECT username, role, campus_id, is_active FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;

    let (username, role, campus_id, is_active) = row.ok_or_else(|| {
        tracing::warn!("Token refers to missing user {} on {} {}", user_id, method, uri);
        ApiError::unauthorized("用户不存在")
    })?;

    if !is_active {
        tracing::warn!("Inactive user {} rejected on {} {}", user_id, method, uri);
        return Err(ApiError::unauthorized("账户已被禁用"));
    }

    let role: UserRole = role
        .parse()
        .map_err(|_| ApiError::internal_error(format!("unknown role '{}'", role)))?;

    tracing::debug!(
        "JWT token verified for user {} (ID: {}, role: {}) on {} {}",
        username,
        user_id,
        role.as_str(),
        method,
        uri
    );

    req.extensions_mut().insert(CurrentUser { user_id, username, role, campus_id });

    Ok(next.run(req).await)
}
