use std::sync::Arc;

use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
};

use crate::AppState;
use crate::handlers::client_meta;
use crate::handlers::extract::{Json, Path, Query};
use crate::middleware::CurrentUser;
use crate::models::{
    BalanceResponse, ConfirmPaymentRequest, NewSystemLog, OfflinePaymentRequest, Pagination,
    Payment, PaymentMethod, PaymentQuery, PaymentSummary, QrCodeResponse, RechargeRequest,
    RefundRequest,
};
use crate::utils::ApiResult;

#[utoipa::path(
    get,
    path = "/api/v1/payments/balance",
    responses((status = 200, description = "Derived balance of the current user", body = BalanceResponse)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.payment_service.balance(user.user_id).await?;
    Ok(Json(BalanceResponse { user_id: user.user_id, balance }))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/recharge",
    request_body = RechargeRequest,
    responses(
        (status = 200, description = "Recharge recorded", body = Payment),
        (status = 400, description = "Invalid amount or method")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn recharge(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<RechargeRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = state.payment_service.recharge(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "payment_recharge", format!("充值 {:.2} 元", payment.amount))
                .target("payment", payment.id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(payment))
}

/// 线下收款，由管理员代为入账
#[utoipa::path(
    post,
    path = "/api/v1/payments/offline",
    request_body = OfflinePaymentRequest,
    responses(
        (status = 200, description = "Offline payment recorded", body = Payment),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn offline_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<OfflinePaymentRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = state.payment_service.offline_payment(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "payment_offline",
                format!("为用户 {} 线下充值 {:.2} 元", payment.user_id, payment.amount),
            )
            .target("payment", payment.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(payment))
}

#[utoipa::path(
    put,
    path = "/api/v1/payments/{id}/confirm",
    params(("id" = i64, Path, description = "Payment ID")),
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed", body = Payment),
        (status = 400, description = "Not pending or insufficient balance")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = state.payment_service.confirm_payment(&user, id, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(Some(user.user_id), "payment_confirm", "确认支付")
                .target("payment", id)
                .client(ip, ua),
        )
        .await;
    Ok(Json(payment))
}

#[utoipa::path(
    put,
    path = "/api/v1/payments/{id}/fail",
    params(("id" = i64, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment marked failed", body = Payment),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn fail_payment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Payment>> {
    tracing::warn!("Payment {} marked failed by {}", id, user.user_id);
    Ok(Json(state.payment_service.fail_payment(&user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/refund",
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund recorded", body = Payment),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(req): Json<RefundRequest>,
) -> ApiResult<Json<Payment>> {
    let payment = state.payment_service.refund(&user, req).await?;

    let (ip, ua) = client_meta(&headers);
    state
        .system_log_service
        .record(
            NewSystemLog::new(
                Some(user.user_id),
                "payment_refund",
                format!("为用户 {} 退款 {:.2} 元", payment.user_id, payment.amount),
            )
            .target("payment", payment.id)
            .client(ip, ua),
        )
        .await;
    Ok(Json(payment))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/records",
    params(PaymentQuery),
    responses((status = 200, description = "Own payment records", body = Vec<Payment>)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn records(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.payment_service.records(user.user_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/records/user/{user_id}",
    params(("user_id" = i64, Path, description = "User ID"), PaymentQuery),
    responses(
        (status = 200, description = "Payment records of a user", body = Vec<Payment>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn records_for(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(user_id): Path<i64>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.payment_service.records_for(&user, user_id, &query).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/all",
    params(Pagination),
    responses(
        (status = 200, description = "All payments in scope", body = Vec<Payment>),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn all_payments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.payment_service.all(&user, page).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/summary",
    responses((status = 200, description = "Totals of the current user", body = PaymentSummary)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn summary(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<PaymentSummary>> {
    Ok(Json(state.payment_service.summary(user.user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/wechat-qr",
    params(("id" = i64, Path, description = "Payment ID")),
    responses((status = 200, description = "Simulated WeChat Pay QR URL", body = QrCodeResponse)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn wechat_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<QrCodeResponse>> {
    Ok(Json(state.payment_service.qr_code(&user, id, PaymentMethod::Wechat).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}/alipay-qr",
    params(("id" = i64, Path, description = "Payment ID")),
    responses((status = 200, description = "Simulated Alipay QR URL", body = QrCodeResponse)),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn alipay_qr(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<QrCodeResponse>> {
    Ok(Json(state.payment_service.qr_code(&user, id, PaymentMethod::Alipay).await?))
}
