//! Handler 公共辅助函数模块
//!
//! 角色守卫与校区范围检查，handlers 和 services 共用

use crate::middleware::CurrentUser;
use crate::models::UserRole;
use crate::utils::{ApiError, ApiResult};

/// 仅超级管理员
pub fn require_super_admin(user: &CurrentUser) -> ApiResult<()> {
    if user.role == UserRole::SuperAdmin {
        return Ok(());
    }
    Err(ApiError::forbidden("只有超级管理员可以执行此操作"))
}

/// 超级管理员或校区管理员
pub fn require_admin(user: &CurrentUser) -> ApiResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    Err(ApiError::forbidden("需要管理员权限"))
}

/// 当前用户的角色必须在 `allowed` 中
pub fn require_role(user: &CurrentUser, allowed: &[UserRole]) -> ApiResult<()> {
    if allowed.contains(&user.role) {
        return Ok(());
    }
    Err(ApiError::forbidden(format!("角色 {} 无权执行此操作", user.role.as_str())))
}

/// 检查用户是否有权限访问指定校区的资源
///
/// 超级管理员不受限制，其他角色只能操作自己所在校区
///
/// # Returns
/// - `Ok(())` 如果有权限
/// - `Err(ApiError::forbidden(...))` 如果无权限
pub fn check_campus_scope(
    user: &CurrentUser,
    resource_campus_id: Option<i64>,
    action_desc: &str,
) -> ApiResult<()> {
    if user.role == UserRole::SuperAdmin {
        return Ok(());
    }

    if user.campus_id.is_none() || resource_campus_id != user.campus_id {
        return Err(ApiError::forbidden(format!("只能{}本校区的数据", action_desc)));
    }

    Ok(())
}

/// 列表查询的校区过滤条件：超级管理员为 None（不过滤）
pub fn campus_filter(user: &CurrentUser) -> Option<i64> {
    match user.role {
        UserRole::SuperAdmin => None,
        _ => user.campus_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, campus_id: Option<i64>) -> CurrentUser {
        CurrentUser { user_id: 1, username: "u".to_string(), role, campus_id }
    }

    #[test]
    fn admin_guards() {
        assert!(require_admin(&user(UserRole::SuperAdmin, None)).is_ok());
        assert!(require_admin(&user(UserRole::CampusAdmin, Some(1))).is_ok());
        assert!(require_admin(&user(UserRole::Coach, Some(1))).is_err());
        assert!(require_super_admin(&user(UserRole::CampusAdmin, Some(1))).is_err());
        assert!(require_role(&user(UserRole::Student, Some(1)), &[UserRole::Student]).is_ok());
    }

    #[test]
    fn campus_admin_is_scoped_to_own_campus() {
        let ca = user(UserRole::CampusAdmin, Some(2));
        assert!(check_campus_scope(&ca, Some(2), "管理").is_ok());
        assert!(check_campus_scope(&ca, Some(3), "管理").is_err());
        assert!(check_campus_scope(&user(UserRole::SuperAdmin, None), Some(3), "管理").is_ok());
        assert_eq!(campus_filter(&ca), Some(2));
        assert_eq!(campus_filter(&user(UserRole::SuperAdmin, Some(1))), None);
    }
}
