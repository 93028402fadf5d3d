use crate::models::{
    BookingAction, CoachLevel, CreateBookingRequest, Pagination, PaymentType, RegisterStudentRequest,
    RelationStatus, User, UserResponse, UserRole,
};
use crate::utils::ApiError;
use chrono::Utc;
use validator::Validate;

#[test]
fn test_user_response_hides_password_hash() {
    let user = User {
        id: 7,
        username: "stu_zhang".to_string(),
        password_hash: "$2b$12$secret".to_string(),
        real_name: "张三".to_string(),
        gender: Some("male".to_string()),
        age: Some(15),
        phone: "13800138000".to_string(),
        email: None,
        role: "student".to_string(),
        campus_id: Some(1),
        avatar_url: None,
        id_number: Some("110101200901011234".to_string()),
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let raw = serde_json::to_string(&user).unwrap();
    assert!(!raw.contains("password_hash"));

    let response: UserResponse = user.into();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["username"], "stu_zhang");
    assert!(json.get("password_hash").is_none());
    assert!(json.get("id_number").is_none());
}

#[test]
fn test_role_parsing_uses_wire_names() {
    assert_eq!("campus_admin".parse::<UserRole>().unwrap(), UserRole::CampusAdmin);
    assert_eq!(UserRole::SuperAdmin.to_string(), "super_admin");
    assert!(matches!("admin".parse::<UserRole>(), Err(ApiError::ValidationError(_))));

    assert_eq!(
        serde_json::to_string(&RelationStatus::PendingChange).unwrap(),
        "\"pending_change\""
    );
    let action: BookingAction = serde_json::from_str("\"reject\"").unwrap();
    assert_eq!(action, BookingAction::Reject);
}

#[test]
fn test_coach_level_rates() {
    assert_eq!(CoachLevel::Senior.hourly_rate(), 200.0);
    assert_eq!(CoachLevel::Intermediate.hourly_rate(), 150.0);
    assert_eq!(CoachLevel::Junior.hourly_rate(), 80.0);
    assert_eq!(CoachLevel::ALL.len(), 3);
}

#[test]
fn test_expense_payment_types() {
    assert!(PaymentType::Booking.is_expense());
    assert!(PaymentType::Competition.is_expense());
    assert!(PaymentType::License.is_expense());
    assert!(!PaymentType::Recharge.is_expense());
    assert!(!PaymentType::Refund.is_expense());
}

#[test]
fn test_pagination_defaults_and_bounds() {
    let page: Pagination = serde_json::from_str("{}").unwrap();
    assert_eq!(page.bounds(), (100, 0));
    assert_eq!(Pagination::new(-5, 10_000).bounds(), (500, 0));
    assert_eq!(Pagination::new(20, 0).bounds(), (1, 20));
}

#[test]
fn test_register_request_validation() {
    let json_str = r#"{"username":"ab","password":"Abc#1234","real_name":"李四","phone":"13800138000"}"#;
    let req: RegisterStudentRequest = serde_json::from_str(json_str).unwrap();
    assert!(req.validate().is_err());

    let json_str = r#"{"username":"lisi","password":"Abc#1234","real_name":"李四","phone":"23800138000"}"#;
    let req: RegisterStudentRequest = serde_json::from_str(json_str).unwrap();
    assert!(req.validate().is_err());

    let json_str = r#"{"username":"lisi","password":"Abc#1234","real_name":"李四","phone":"13800138000","age":16}"#;
    let req: RegisterStudentRequest = serde_json::from_str(json_str).unwrap();
    assert!(req.validate().is_ok());
    assert_eq!(req.age, Some(16));
}

#[test]
fn test_booking_request_accepts_rfc3339_times() {
    let json_str = r#"{"coach_id":3,"campus_id":1,"start_time":"2025-03-01T10:00:00Z","end_time":"2025-03-01T11:30:00Z"}"#;
    let req: CreateBookingRequest = serde_json::from_str(json_str).unwrap();
    assert_eq!((req.end_time - req.start_time).num_minutes(), 90);
    assert!(req.table_number.is_none());
}
