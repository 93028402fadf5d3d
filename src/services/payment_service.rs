use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::middleware::CurrentUser;
use crate::models::{
    ConfirmPaymentRequest, OfflinePaymentRequest, Pagination, Payment, PaymentMethod,
    PaymentQuery, PaymentStatus, PaymentSummary, PaymentType, QrCodeResponse, RechargeRequest,
    RefundRequest,
};
use crate::utils::{ApiError, ApiResult, campus_filter, check_campus_scope, require_admin, round2};

/// 单笔充值上限
pub const MAX_RECHARGE_AMOUNT: f64 = 100_000.0;

const QR_BASE_URL: &str = "https://api.tabletennis.com";

/// 一条待写入的流水
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub user_id: i64,
    pub payment_type: PaymentType,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub related_id: Option<i64>,
    pub description: Option<&'a str>,
    pub created_by: Option<i64>,
}

/// 余额 = 成功的充值 + 退款 - 成功的支出，实时计算不落库
pub async fn balance_on(conn: &mut SqliteConnection, user_id: i64) -> ApiResult<f64> {
    let (income, expense): (f64, f64) = sqlx::query_as(
        r#"
        SELECT
            CAST(COALESCE(SUM(CASE WHEN payment_type IN ('recharge', 'refund') THEN amount ELSE 0 END), 0) AS REAL),
            CAST(COALESCE(SUM(CASE WHEN payment_type IN ('booking', 'competition', 'license') THEN amount ELSE 0 END), 0) AS REAL)
        FROM payments
        WHERE user_id = ? AND status = 'success'
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(round2(income - expense))
}

pub async fn insert_payment(conn: &mut SqliteConnection, entry: LedgerEntry<'_>) -> ApiResult<i64> {
    if !entry.amount.is_finite() || round2(entry.amount) <= 0.0 {
        return Err(ApiError::validation_error("金额必须大于0"));
    }

    let now = Utc::now();
    let paid_at = (entry.status == PaymentStatus::Success).then_some(now);

    let result = sqlx::query(
        r#"
        INSERT INTO payments
            (user_id, payment_type, amount, payment_method, status, related_id, description,
             paid_at, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.payment_type.as_str())
    .bind(round2(entry.amount))
    .bind(entry.method.as_str())
    .bind(entry.status.as_str())
    .bind(entry.related_id)
    .bind(entry.description)
    .bind(paid_at)
    .bind(entry.created_by)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// 校验余额后写入一笔成功的支出
pub async fn deduct_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: f64,
    payment_type: PaymentType,
    related_id: Option<i64>,
    description: &str,
) -> ApiResult<i64> {
    if !payment_type.is_expense() {
        return Err(ApiError::validation_error("只能扣除支出类款项"));
    }

    let balance = balance_on(conn, user_id).await?;
    if balance < round2(amount) {
        return Err(ApiError::validation_error("账户余额不足，请先充值"));
    }

    insert_payment(
        conn,
        LedgerEntry {
            user_id,
            payment_type,
            amount,
            method: PaymentMethod::Balance,
            status: PaymentStatus::Success,
            related_id,
            description: Some(description),
            created_by: None,
        },
    )
    .await
}

pub async fn refund_on(
    conn: &mut SqliteConnection,
    user_id: i64,
    amount: f64,
    related_id: Option<i64>,
    reason: &str,
    created_by: Option<i64>,
) -> ApiResult<i64> {
    insert_payment(
        conn,
        LedgerEntry {
            user_id,
            payment_type: PaymentType::Refund,
            amount,
            method: PaymentMethod::Balance,
            status: PaymentStatus::Success,
            related_id,
            description: Some(reason),
            created_by,
        },
    )
    .await
}

#[derive(Clone)]
pub struct PaymentService {
    pool: SqlitePool,
}

impl PaymentService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn balance(&self, user_id: i64) -> ApiResult<f64> {
        let mut conn = self.pool.acquire().await?;
        balance_on(&mut conn, user_id).await
    }

    pub async fn get_payment(&self, id: i64) -> ApiResult<Payment> {
        sqlx::query_as("SELECT * FROM payments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("支付记录不存在"))
    }

    pub async fn recharge(&self, user: &CurrentUser, req: RechargeRequest) -> ApiResult<Payment> {
        validate_amount(req.amount)?;
        if !matches!(req.payment_method, PaymentMethod::Wechat | PaymentMethod::Alipay) {
            return Err(ApiError::validation_error("在线充值仅支持微信或支付宝"));
        }

        let mut conn = self.pool.acquire().await?;
        let id = insert_payment(
            &mut conn,
            LedgerEntry {
                user_id: user.user_id,
                payment_type: PaymentType::Recharge,
                amount: req.amount,
                method: req.payment_method,
                status: PaymentStatus::Success,
                related_id: None,
                description: Some("账户充值"),
                created_by: Some(user.user_id),
            },
        )
        .await?;
        drop(conn);

        self.get_payment(id).await
    }

    pub async fn offline_payment(
        &self,
        user: &CurrentUser,
        req: OfflinePaymentRequest,
    ) -> ApiResult<Payment> {
        require_admin(user)?;
        validate_amount(req.amount)?;
        let campus_id = self.user_campus(req.user_id).await?;
        check_campus_scope(user, campus_id, "为")?;

        let description = req.description.unwrap_or_else(|| "线下充值".to_string());
        let mut conn = self.pool.acquire().await?;
        let id = insert_payment(
            &mut conn,
            LedgerEntry {
                user_id: req.user_id,
                payment_type: PaymentType::Recharge,
                amount: req.amount,
                method: PaymentMethod::Offline,
                status: PaymentStatus::Success,
                related_id: None,
                description: Some(&description),
                created_by: Some(user.user_id),
            },
        )
        .await?;
        drop(conn);

        self.get_payment(id).await
    }

    pub async fn confirm_payment(
        &self,
        user: &CurrentUser,
        id: i64,
        req: ConfirmPaymentRequest,
    ) -> ApiResult<Payment> {
        let payment = self.get_payment(id).await?;
        self.ensure_owner_or_admin(user, payment.user_id).await?;

        if payment.status != PaymentStatus::Pending.as_str() {
            return Err(ApiError::validation_error("只能确认待支付的记录"));
        }

        let mut tx = self.pool.begin().await?;

        let payment_type: PaymentType = payment.payment_type.parse()?;
        if payment_type.is_expense() {
            let balance = balance_on(&mut tx, payment.user_id).await?;
            if balance < payment.amount {
                return Err(ApiError::validation_error("账户余额不足，请先充值"));
            }
        }

        let transaction_id = req
            .transaction_id
            .unwrap_or_else(|| format!("TXN{}", uuid::Uuid::new_v4().simple()).to_uppercase());
        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE payments SET status = ?, transaction_id = ?, paid_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(PaymentStatus::Success.as_str())
        .bind(&transaction_id)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("只能确认待支付的记录"));
        }

        tx.commit().await?;

        self.get_payment(id).await
    }

    pub async fn fail_payment(&self, user: &CurrentUser, id: i64) -> ApiResult<Payment> {
        require_admin(user)?;
        let payment = self.get_payment(id).await?;
        let campus_id = self.user_campus(payment.user_id).await?;
        check_campus_scope(user, campus_id, "处理")?;

        if payment.status != PaymentStatus::Pending.as_str() {
            return Err(ApiError::validation_error("只能将待支付的记录标记为失败"));
        }

        let updated =
            sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'")
                .bind(PaymentStatus::Failed.as_str())
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
        if updated.rows_affected() != 1 {
            return Err(ApiError::validation_error("只能将待支付的记录标记为失败"));
        }

        self.get_payment(id).await
    }

    /// 管理员手工退款
    pub async fn refund(&self, user: &CurrentUser, req: RefundRequest) -> ApiResult<Payment> {
        require_admin(user)?;
        validate_amount(req.amount)?;
        let campus_id = self.user_campus(req.user_id).await?;
        check_campus_scope(user, campus_id, "为")?;

        let mut conn = self.pool.acquire().await?;
        let id =
            refund_on(&mut conn, req.user_id, req.amount, None, &req.reason, Some(user.user_id))
                .await?;
        drop(conn);

        self.get_payment(id).await
    }

    pub async fn records(&self, user_id: i64, query: &PaymentQuery) -> ApiResult<Vec<Payment>> {
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM payments WHERE user_id = ");
        qb.push_bind(user_id);
        if let Some(payment_type) = query.payment_type {
            qb.push(" AND payment_type = ").push_bind(payment_type.as_str());
        }
        qb.push(" ORDER BY datetime(created_at) DESC, id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as::<Payment>().fetch_all(&self.pool).await?)
    }

    pub async fn records_for(
        &self,
        user: &CurrentUser,
        target_user_id: i64,
        query: &PaymentQuery,
    ) -> ApiResult<Vec<Payment>> {
        require_admin(user)?;
        let campus_id = self.user_campus(target_user_id).await?;
        check_campus_scope(user, campus_id, "查看")?;
        self.records(target_user_id, query).await
    }

    pub async fn all(&self, user: &CurrentUser, page: Pagination) -> ApiResult<Vec<Payment>> {
        require_admin(user)?;
        let (limit, offset) = page.bounds();

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT p.* FROM payments p JOIN users u ON u.id = p.user_id WHERE 1=1",
        );
        if let Some(campus_id) = campus_filter(user) {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY datetime(p.created_at) DESC, p.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as::<Payment>().fetch_all(&self.pool).await?)
    }

    pub async fn summary(&self, user_id: i64) -> ApiResult<PaymentSummary> {
        let (total_recharge, total_expense, total_refund, payment_count): (f64, f64, f64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    CAST(COALESCE(SUM(CASE WHEN payment_type = 'recharge' AND status = 'success' THEN amount ELSE 0 END), 0) AS REAL),
                    CAST(COALESCE(SUM(CASE WHEN payment_type IN ('booking', 'competition', 'license') AND status = 'success' THEN amount ELSE 0 END), 0) AS REAL),
                    CAST(COALESCE(SUM(CASE WHEN payment_type = 'refund' AND status = 'success' THEN amount ELSE 0 END), 0) AS REAL),
                    COUNT(*)
                FROM payments
                WHERE user_id = ?
                "#,
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(PaymentSummary {
            total_recharge: round2(total_recharge),
            total_expense: round2(total_expense),
            total_refund: round2(total_refund),
            current_balance: round2(total_recharge + total_refund - total_expense),
            payment_count,
        })
    }

    /// 生成模拟支付二维码地址
    pub async fn qr_code(
        &self,
        user: &CurrentUser,
        id: i64,
        method: PaymentMethod,
    ) -> ApiResult<QrCodeResponse> {
        let channel = match method {
            PaymentMethod::Wechat => "wechat",
            PaymentMethod::Alipay => "alipay",
            _ => return Err(ApiError::validation_error("仅支持微信或支付宝二维码")),
        };

        let payment = self.get_payment(id).await?;
        self.ensure_owner_or_admin(user, payment.user_id).await?;

        let url = format!(
            "{}/{}/pay?payment_id={}&amount={}",
            QR_BASE_URL, channel, payment.id, payment.amount
        );
        sqlx::query("UPDATE payments SET qr_code_url = ?, updated_at = ? WHERE id = ?")
            .bind(&url)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(QrCodeResponse {
            payment_id: payment.id,
            payment_method: channel.to_string(),
            amount: payment.amount,
            qr_code_url: url,
        })
    }

    async fn user_campus(&self, user_id: i64) -> ApiResult<Option<i64>> {
        let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT campus_id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(campus_id,)| campus_id).ok_or_else(|| ApiError::not_found("用户不存在"))
    }

    async fn ensure_owner_or_admin(&self, user: &CurrentUser, owner_id: i64) -> ApiResult<()> {
        if user.user_id == owner_id {
            return Ok(());
        }
        require_admin(user)?;
        let campus_id = self.user_campus(owner_id).await?;
        check_campus_scope(user, campus_id, "操作")
    }
}

fn validate_amount(amount: f64) -> ApiResult<()> {
    // 按入账精度判断，0.001 这类金额会被舍入为 0
    if !amount.is_finite() || round2(amount) <= 0.0 {
        return Err(ApiError::validation_error("金额必须大于0"));
    }
    if amount > MAX_RECHARGE_AMOUNT {
        return Err(ApiError::validation_error("单笔金额不能超过100000元"));
    }
    Ok(())
}
