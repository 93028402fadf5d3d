use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::CoachLevel;
use crate::utils::string_ext::PHONE_REGEX;

str_enum! {
    /// 用户角色
    UserRole {
        SuperAdmin => "super_admin",
        CampusAdmin => "campus_admin",
        Coach => "coach",
        Student => "student",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub real_name: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub phone: String,
    pub email: Option<String>,
    pub role: String,
    pub campus_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub id_number: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub real_name: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub phone: String,
    pub email: Option<String>,
    pub role: String,
    pub campus_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            real_name: user.real_name,
            gender: user.gender,
            age: user.age,
            phone: user.phone,
            email: user.email,
            role: user.role,
            campus_id: user.campus_id,
            avatar_url: user.avatar_url,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterStudentRequest {
    #[validate(length(min = 3, max = 50, message = "用户名长度必须为3-50位"))]
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, max = 50, message = "真实姓名不能为空"))]
    pub real_name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "手机号格式不正确"))]
    pub phone: String,
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120, message = "年龄不合法"))]
    pub age: Option<i64>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub campus_id: Option<i64>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterCoachRequest {
    #[validate(length(min = 3, max = 50, message = "用户名长度必须为3-50位"))]
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, max = 50, message = "真实姓名不能为空"))]
    pub real_name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "手机号格式不正确"))]
    pub phone: String,
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120, message = "年龄不合法"))]
    pub age: Option<i64>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub campus_id: Option<i64>,
    pub level: CoachLevel,
    pub achievements: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMeRequest {
    #[validate(length(min = 1, max = 50, message = "真实姓名不能为空"))]
    pub real_name: Option<String>,
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120, message = "年龄不合法"))]
    pub age: Option<i64>,
    #[validate(regex(path = *PHONE_REGEX, message = "手机号格式不正确"))]
    pub phone: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 1, max = 50, message = "真实姓名不能为空"))]
    pub real_name: Option<String>,
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120, message = "年龄不合法"))]
    pub age: Option<i64>,
    #[validate(regex(path = *PHONE_REGEX, message = "手机号格式不正确"))]
    pub phone: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<UserRole>,
    pub campus_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminCreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "用户名长度必须为3-50位"))]
    pub username: String,
    pub password: String,
    #[validate(length(min = 1, max = 50, message = "真实姓名不能为空"))]
    pub real_name: String,
    #[validate(regex(path = *PHONE_REGEX, message = "手机号格式不正确"))]
    pub phone: String,
    pub role: UserRole,
    pub campus_id: Option<i64>,
    pub gender: Option<String>,
    #[validate(range(min = 1, max = 120, message = "年龄不合法"))]
    pub age: Option<i64>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: Option<String>,
    /// 仅在创建教练账号时使用
    pub level: Option<CoachLevel>,
    pub achievements: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
}
