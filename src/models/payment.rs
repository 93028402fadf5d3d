use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

str_enum! {
    PaymentType {
        Recharge => "recharge",
        Booking => "booking",
        Refund => "refund",
        Competition => "competition",
        License => "license",
    }
}

impl PaymentType {
    /// 支出类流水会减少余额
    pub fn is_expense(&self) -> bool {
        matches!(self, PaymentType::Booking | PaymentType::Competition | PaymentType::License)
    }
}

str_enum! {
    PaymentStatus {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
    }
}

str_enum! {
    PaymentMethod {
        Wechat => "wechat",
        Alipay => "alipay",
        Offline => "offline",
        Balance => "balance",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub payment_type: String,
    pub amount: f64,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub related_id: Option<i64>,
    pub description: Option<String>,
    pub qr_code_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RechargeRequest {
    pub amount: f64,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OfflinePaymentRequest {
    pub user_id: i64,
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub user_id: i64,
    pub amount: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PaymentQuery {
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: i64,
    pub balance: f64,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct PaymentSummary {
    pub total_recharge: f64,
    pub total_expense: f64,
    pub total_refund: f64,
    pub current_balance: f64,
    pub payment_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QrCodeResponse {
    pub payment_id: i64,
    pub payment_method: String,
    pub amount: f64,
    pub qr_code_url: String,
}
