use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::utils::string_ext::PHONE_REGEX;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Campus {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub admin_id: Option<i64>,
    pub is_main_campus: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCampusRequest {
    #[validate(length(min = 1, max = 100, message = "校区名称不能为空"))]
    pub name: String,
    #[validate(length(min = 1, max = 200, message = "地址不能为空"))]
    pub address: String,
    #[validate(length(min = 1, max = 50, message = "联系人不能为空"))]
    pub contact_person: String,
    #[validate(regex(path = *PHONE_REGEX, message = "联系电话格式不正确"))]
    pub contact_phone: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub is_main_campus: bool,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCampusRequest {
    #[validate(length(min = 1, max = 100, message = "校区名称不能为空"))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact_person: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "联系电话格式不正确"))]
    pub contact_phone: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub contact_email: Option<String>,
    pub is_main_campus: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignAdminRequest {
    pub user_id: i64,
}
