use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::utils::string_ext::PHONE_REGEX;

str_enum! {
    LicenseType {
        Basic => "basic",
        Premium => "premium",
        Enterprise => "enterprise",
    }
}

str_enum! {
    LicenseStatus {
        Active => "active",
        Expired => "expired",
        Suspended => "suspended",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct License {
    pub id: i64,
    pub license_key: String,
    pub license_type: String,
    pub status: String,
    pub campus_id: i64,
    pub organization_name: String,
    pub contact_person: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_users: i64,
    pub max_coaches: i64,
    pub max_students: i64,
    pub allow_competitions: bool,
    pub allow_evaluations: bool,
    pub allow_advanced_reports: bool,
    pub allow_api_access: bool,
    pub annual_fee: f64,
    pub payment_id: Option<i64>,
    pub hardware_fingerprint: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub activation_count: i64,
    pub max_activations: i64,
    pub notes: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    pub fn features(&self) -> LicenseFeatures {
        LicenseFeatures {
            max_users: self.max_users,
            max_coaches: self.max_coaches,
            max_students: self.max_students,
            allow_competitions: self.allow_competitions,
            allow_evaluations: self.allow_evaluations,
            allow_advanced_reports: self.allow_advanced_reports,
            allow_api_access: self.allow_api_access,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LicenseActivation {
    pub id: i64,
    pub license_id: i64,
    pub activation_code: String,
    pub hardware_fingerprint: String,
    pub client_ip: Option<String>,
    pub client_info: Option<String>,
    pub is_active: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LicenseFeatures {
    pub max_users: i64,
    pub max_coaches: i64,
    pub max_students: i64,
    pub allow_competitions: bool,
    pub allow_evaluations: bool,
    pub allow_advanced_reports: bool,
    pub allow_api_access: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLicenseRequest {
    pub license_type: LicenseType,
    pub campus_id: i64,
    #[validate(length(min = 1, max = 100, message = "机构名称不能为空"))]
    pub organization_name: String,
    #[validate(length(min = 1, max = 50, message = "联系人不能为空"))]
    pub contact_person: String,
    #[validate(regex(path = *PHONE_REGEX, message = "联系电话格式不正确"))]
    pub contact_phone: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub contact_email: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub max_users: Option<i64>,
    pub max_coaches: Option<i64>,
    pub max_students: Option<i64>,
    pub allow_competitions: Option<bool>,
    pub allow_evaluations: Option<bool>,
    pub allow_advanced_reports: Option<bool>,
    pub allow_api_access: Option<bool>,
    pub annual_fee: Option<f64>,
    pub max_activations: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateLicenseRequest {
    pub license_type: Option<LicenseType>,
    pub status: Option<LicenseStatus>,
    pub organization_name: Option<String>,
    pub contact_person: Option<String>,
    #[validate(regex(path = *PHONE_REGEX, message = "联系电话格式不正确"))]
    pub contact_phone: Option<String>,
    #[validate(email(message = "邮箱格式不正确"))]
    pub contact_email: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub max_users: Option<i64>,
    pub max_coaches: Option<i64>,
    pub max_students: Option<i64>,
    pub allow_competitions: Option<bool>,
    pub allow_evaluations: Option<bool>,
    pub allow_advanced_reports: Option<bool>,
    pub allow_api_access: Option<bool>,
    pub annual_fee: Option<f64>,
    pub max_activations: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LicenseQuery {
    pub status: Option<LicenseStatus>,
    pub license_type: Option<LicenseType>,
    pub campus_id: Option<i64>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateLicenseRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
    pub client_info: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LicenseValidation {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<LicenseFeatures>,
}

impl LicenseValidation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            license_type: None,
            expires_at: None,
            activation_code: None,
            features: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UsageStats {
    #[serde(default)]
    pub active_users: i64,
    #[serde(default)]
    pub active_coaches: i64,
    #[serde(default)]
    pub active_students: i64,
    #[serde(default)]
    pub bookings_count: i64,
    #[serde(default)]
    pub competitions_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HeartbeatRequest {
    pub license_key: String,
    pub hardware_fingerprint: String,
    pub usage_stats: Option<UsageStats>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HeartbeatResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenewLicenseRequest {
    pub extend_months: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeactivateLicenseRequest {
    pub hardware_fingerprint: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct LicenseStatistics {
    pub total: i64,
    pub active: i64,
    pub expired: i64,
    pub expiring_soon: i64,
    pub total_revenue: f64,
    pub by_type: BTreeMap<String, i64>,
}
