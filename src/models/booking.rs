use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

str_enum! {
    BookingStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub campus_id: i64,
    pub table_number: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub hourly_rate: f64,
    pub total_cost: f64,
    pub status: String,
    pub booking_message: Option<String>,
    pub response_message: Option<String>,
    pub cancelled_by: Option<i64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 已完成课程记录，评价基于此
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Course {
    pub id: i64,
    pub booking_id: i64,
    pub coach_id: i64,
    pub student_id: i64,
    pub campus_id: i64,
    pub table_number: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub total_cost: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequest {
    pub coach_id: i64,
    pub campus_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub table_number: Option<String>,
    pub booking_message: Option<String>,
}

str_enum! {
    BookingAction {
        Confirm => "confirm",
        Reject => "reject",
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondBookingRequest {
    pub action: BookingAction,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CompleteBookingRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "super::default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ScheduleQuery {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ScheduleEntry {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub campus_id: i64,
    pub table_number: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AvailableTablesQuery {
    pub campus_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailableTables {
    pub campus_id: i64,
    pub tables: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MonthlyStatisticsQuery {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MonthlyStatistics {
    pub year: i32,
    pub month: u32,
    pub total_bookings: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
    pub cancelled: i64,
    pub completed: i64,
    pub total_hours: f64,
    pub total_revenue: f64,
}
