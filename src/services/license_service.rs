use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::CurrentUser;
use crate::models::{
    CreateLicenseRequest, HeartbeatRequest, HeartbeatResponse, License, LicenseActivation,
    LicenseQuery, LicenseStatistics, LicenseStatus, LicenseType, LicenseValidation, Pagination,
    PaymentMethod, PaymentStatus, PaymentType, UpdateLicenseRequest, ValidateLicenseRequest,
};
use crate::services::payment_service::{LedgerEntry, insert_payment};
use crate::utils::{ApiError, ApiResult, StringExt, require_admin, require_super_admin, round2};

/// 授权到期提醒的提前天数
const EXPIRING_WITHIN_DAYS: i64 = 30;

/// XXXX-XXXX-XXXX-XXXX，大写字母数字
pub fn generate_license_key() -> String {
    let raw = Uuid::new_v4().simple().to_string().to_uppercase();
    raw.as_bytes()
        .chunks(4)
        .take(4)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// 32 位大写十六进制
pub fn generate_activation_code() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// 续期从当前有效期末尾（已过期则从现在）顺延，每月按 30 天计
pub fn renewed_end(end_date: DateTime<Utc>, now: DateTime<Utc>, months: i64) -> DateTime<Utc> {
    end_date.max(now) + Duration::days(30 * months)
}

#[derive(Clone)]
pub struct LicenseService {
    pool: SqlitePool,
}

impl LicenseService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &CurrentUser, req: CreateLicenseRequest) -> ApiResult<License> {
        require_super_admin(user)?;
        req.validate()?;
        if req.start_date >= req.end_date {
            return Err(ApiError::validation_error("开始时间必须早于结束时间"));
        }

        let campus: Option<(i64,)> = sqlx::query_as("SELECT id FROM campuses WHERE id = ? AND is_active = 1")
            .bind(req.campus_id)
            .fetch_optional(&self.pool)
            .await?;
        if campus.is_none() {
            return Err(ApiError::not_found("校区不存在"));
        }

        let annual_fee = round2(req.annual_fee.unwrap_or(500.0));
        if annual_fee <= 0.0 {
            return Err(ApiError::validation_error("年费必须大于0"));
        }
        let max_activations = req.max_activations.unwrap_or(3);
        if max_activations < 1 {
            return Err(ApiError::validation_error("最大激活数至少为1"));
        }

        let license_key = generate_license_key();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let description = format!("授权费用：{}", req.organization_name.trim());
        let payment_id = insert_payment(
            &mut tx,
            LedgerEntry {
                user_id: user.user_id,
                payment_type: PaymentType::License,
                amount: annual_fee,
                method: PaymentMethod::Offline,
                status: PaymentStatus::Pending,
                related_id: None,
                description: Some(&description),
                created_by: Some(user.user_id),
            },
        )
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO licenses
                (license_key, license_type, status, campus_id, organization_name, contact_person,
                 contact_phone, contact_email, start_date, end_date, max_users, max_coaches,
                 max_students, allow_competitions, allow_evaluations, allow_advanced_reports,
                 allow_api_access, annual_fee, payment_id, max_activations, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&license_key)
        .bind(req.license_type.as_str())
        .bind(LicenseStatus::Active.as_str())
        .bind(req.campus_id)
        .bind(req.organization_name.trim())
        .bind(req.contact_person.trim())
        .bind(req.contact_phone.trim())
        .bind(req.contact_email.clean())
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.max_users.unwrap_or(100))
        .bind(req.max_coaches.unwrap_or(20))
        .bind(req.max_students.unwrap_or(500))
        .bind(req.allow_competitions.unwrap_or(true))
        .bind(req.allow_evaluations.unwrap_or(true))
        .bind(req.allow_advanced_reports.unwrap_or(false))
        .bind(req.allow_api_access.unwrap_or(false))
        .bind(annual_fee)
        .bind(payment_id)
        .bind(max_activations)
        .bind(req.notes.clean())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        sqlx::query("UPDATE payments SET related_id = ? WHERE id = ?")
            .bind(id)
            .bind(payment_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "License {} ({}) issued to campus {} by {}",
            id,
            license_key,
            req.campus_id,
            user.user_id
        );
        self.fetch(id).await
    }

    pub async fn list(&self, user: &CurrentUser, query: &LicenseQuery) -> ApiResult<Vec<License>> {
        require_admin(user)?;
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM licenses WHERE 1=1");
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(license_type) = query.license_type {
            qb.push(" AND license_type = ").push_bind(license_type.as_str());
        }
        if let Some(campus_id) = query.campus_id {
            qb.push(" AND campus_id = ").push_bind(campus_id);
        }
        qb.push(" ORDER BY id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, user: &CurrentUser, id: i64) -> ApiResult<License> {
        require_admin(user)?;
        self.fetch(id).await
    }

    pub async fn get_by_key(&self, user: &CurrentUser, license_key: &str) -> ApiResult<License> {
        require_admin(user)?;
        self.find_by_key(license_key)
            .await?
            .ok_or_else(|| ApiError::not_found("授权不存在"))
    }

    pub async fn update(&self, user: &CurrentUser, id: i64, req: UpdateLicenseRequest) -> ApiResult<License> {
        require_super_admin(user)?;
        req.validate()?;
        let existing = self.fetch(id).await?;
        if let Some(end_date) = req.end_date {
            if end_date <= existing.start_date {
                return Err(ApiError::validation_error("结束时间必须晚于开始时间"));
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE licenses SET ");
        let mut set = qb.separated(", ");
        if let Some(license_type) = req.license_type {
            set.push("license_type = ").push_bind_unseparated(license_type.as_str());
        }
        if let Some(status) = req.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(name) = req.organization_name.clean() {
            set.push("organization_name = ").push_bind_unseparated(name);
        }
        if let Some(person) = req.contact_person.clean() {
            set.push("contact_person = ").push_bind_unseparated(person);
        }
        if let Some(phone) = req.contact_phone.clean() {
            set.push("contact_phone = ").push_bind_unseparated(phone);
        }
        if let Some(email) = req.contact_email {
            set.push("contact_email = ").push_bind_unseparated(email.clean());
        }
        if let Some(end_date) = req.end_date {
            set.push("end_date = ").push_bind_unseparated(end_date);
        }
        if let Some(v) = req.max_users {
            set.push("max_users = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.max_coaches {
            set.push("max_coaches = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.max_students {
            set.push("max_students = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.allow_competitions {
            set.push("allow_competitions = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.allow_evaluations {
            set.push("allow_evaluations = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.allow_advanced_reports {
            set.push("allow_advanced_reports = ").push_bind_unseparated(v);
        }
        if let Some(v) = req.allow_api_access {
            set.push("allow_api_access = ").push_bind_unseparated(v);
        }
        if let Some(fee) = req.annual_fee {
            set.push("annual_fee = ").push_bind_unseparated(round2(fee));
        }
        if let Some(v) = req.max_activations {
            set.push("max_activations = ").push_bind_unseparated(v);
        }
        if let Some(notes) = req.notes {
            set.push("notes = ").push_bind_unseparated(notes.clean());
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&self.pool).await?;

        tracing::info!("License {} updated by {}", id, user.user_id);
        self.fetch(id).await
    }

    /// 客户端校验授权（无需登录）。校验失败以 `valid = false` 返回而不是错误码
    pub async fn validate(
        &self,
        req: ValidateLicenseRequest,
        client_ip: Option<String>,
    ) -> ApiResult<LicenseValidation> {
        let Some(license) = self.find_by_key(req.license_key.trim()).await? else {
            return Ok(LicenseValidation::invalid("授权密钥不存在"));
        };

        if license.status != LicenseStatus::Active.as_str() {
            return Ok(LicenseValidation::invalid(format!("授权状态异常：{}", license.status)));
        }

        let now = Utc::now();
        if now < license.start_date {
            return Ok(LicenseValidation::invalid("授权尚未生效"));
        }
        if now > license.end_date {
            sqlx::query("UPDATE licenses SET status = ?, updated_at = ? WHERE id = ?")
                .bind(LicenseStatus::Expired.as_str())
                .bind(now)
                .bind(license.id)
                .execute(&self.pool)
                .await?;
            tracing::warn!("License {} expired at {}", license.license_key, license.end_date);
            return Ok(LicenseValidation::invalid("授权已过期"));
        }

        let existing = self.active_activation(license.id, &req.hardware_fingerprint).await?;
        if existing.is_none() && license.activation_count >= license.max_activations {
            return Ok(LicenseValidation::invalid("授权激活次数已达上限"));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE licenses SET last_heartbeat = ?, hardware_fingerprint = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(&req.hardware_fingerprint)
        .bind(now)
        .bind(license.id)
        .execute(&mut *tx)
        .await?;

        let activation_code = match existing {
            Some(activation) => {
                sqlx::query("UPDATE license_activations SET last_used = ?, client_ip = ? WHERE id = ?")
                    .bind(now)
                    .bind(&client_ip)
                    .bind(activation.id)
                    .execute(&mut *tx)
                    .await?;
                activation.activation_code
            },
            None => {
                let code = generate_activation_code();
                sqlx::query(
                    r#"
                    INSERT INTO license_activations
                        (license_id, activation_code, hardware_fingerprint, client_ip, client_info,
                         is_active, last_used, created_at)
                    VALUES (?, ?, ?, ?, ?, 1, ?, ?)
                    "#,
                )
                .bind(license.id)
                .bind(&code)
                .bind(&req.hardware_fingerprint)
                .bind(&client_ip)
                .bind(req.client_info.clean())
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"
                    UPDATE licenses
                    SET activation_count = activation_count + 1,
                        activated_at = COALESCE(activated_at, ?)
                    WHERE id = ?
                    "#,
                )
                .bind(now)
                .bind(license.id)
                .execute(&mut *tx)
                .await?;

                tracing::info!(
                    "License {} activated on fingerprint {}",
                    license.license_key,
                    req.hardware_fingerprint
                );
                code
            },
        };
        tx.commit().await?;

        Ok(LicenseValidation {
            valid: true,
            message: "授权有效".to_string(),
            license_type: Some(license.license_type.clone()),
            expires_at: Some(license.end_date),
            activation_code: Some(activation_code),
            features: Some(license.features()),
        })
    }

    pub async fn heartbeat(&self, req: HeartbeatRequest) -> ApiResult<HeartbeatResponse> {
        let Some(license) = self.find_by_key(req.license_key.trim()).await? else {
            return Ok(HeartbeatResponse {
                status: "error".to_string(),
                message: Some("授权密钥不存在".to_string()),
                license_status: None,
                expires_at: None,
            });
        };

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE licenses SET last_heartbeat = ? WHERE id = ?")
            .bind(now)
            .bind(license.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE license_activations SET last_used = ? WHERE license_id = ? AND hardware_fingerprint = ? AND is_active = 1",
        )
        .bind(now)
        .bind(license.id)
        .bind(&req.hardware_fingerprint)
        .execute(&mut *tx)
        .await?;

        if let Some(stats) = &req.usage_stats {
            sqlx::query(
                r#"
                INSERT INTO license_usage_logs
                    (license_id, usage_date, active_users, active_coaches, active_students,
                     bookings_count, competitions_count, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(license.id)
            .bind(now.date_naive().to_string())
            .bind(stats.active_users)
            .bind(stats.active_coaches)
            .bind(stats.active_students)
            .bind(stats.bookings_count)
            .bind(stats.competitions_count)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!("Heartbeat from license {}", license.license_key);
        Ok(HeartbeatResponse {
            status: "success".to_string(),
            message: None,
            license_status: Some(license.status),
            expires_at: Some(license.end_date),
        })
    }

    /// 续期并生成一笔待支付的续费
    pub async fn renew(&self, user: &CurrentUser, id: i64, extend_months: i64) -> ApiResult<License> {
        require_super_admin(user)?;
        if !(1..=60).contains(&extend_months) {
            return Err(ApiError::validation_error("续期月数必须在1到60之间"));
        }
        let license = self.fetch(id).await?;
        if license.status == LicenseStatus::Cancelled.as_str() {
            return Err(ApiError::validation_error("已取消的授权不能续期"));
        }

        let now = Utc::now();
        let new_end = renewed_end(license.end_date, now, extend_months);
        let amount = round2(license.annual_fee / 12.0 * extend_months as f64);

        let mut tx = self.pool.begin().await?;
        let description = format!("授权续期 {} 个月：{}", extend_months, license.license_key);
        insert_payment(
            &mut tx,
            LedgerEntry {
                user_id: user.user_id,
                payment_type: PaymentType::License,
                amount,
                method: PaymentMethod::Offline,
                status: PaymentStatus::Pending,
                related_id: Some(id),
                description: Some(&description),
                created_by: Some(user.user_id),
            },
        )
        .await?;

        sqlx::query("UPDATE licenses SET end_date = ?, status = ?, updated_at = ? WHERE id = ?")
            .bind(new_end)
            .bind(LicenseStatus::Active.as_str())
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("License {} renewed until {} by {}", id, new_end, user.user_id);
        self.fetch(id).await
    }

    /// 解除某台设备的激活，释放一个激活名额
    pub async fn deactivate(&self, user: &CurrentUser, id: i64, hardware_fingerprint: &str) -> ApiResult<()> {
        require_super_admin(user)?;
        let license = self.fetch(id).await?;
        let activation = self
            .active_activation(license.id, hardware_fingerprint)
            .await?
            .ok_or_else(|| ApiError::not_found("该设备没有有效的激活记录"))?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE license_activations SET is_active = 0, deactivated_at = ? WHERE id = ?")
            .bind(now)
            .bind(activation.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE licenses SET activation_count = MAX(activation_count - 1, 0), updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::warn!(
            "License {} deactivated on fingerprint {} by {}",
            license.license_key,
            hardware_fingerprint,
            user.user_id
        );
        Ok(())
    }

    pub async fn statistics(&self, user: &CurrentUser) -> ApiResult<LicenseStatistics> {
        require_admin(user)?;
        let now = Utc::now();
        let soon = now + Duration::days(EXPIRING_WITHIN_DAYS);

        let (total, active, expired, expiring_soon, total_revenue): (i64, i64, i64, i64, f64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'active'
                                   AND datetime(end_date) >= datetime(?)
                                   AND datetime(end_date) <= datetime(?) THEN 1 ELSE 0 END), 0),
                CAST(COALESCE(SUM(CASE WHEN status != 'cancelled' THEN annual_fee ELSE 0 END), 0) AS REAL)
            FROM licenses
            "#,
        )
        .bind(now)
        .bind(soon)
        .fetch_one(&self.pool)
        .await?;

        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT license_type, COUNT(*) FROM licenses GROUP BY license_type")
                .fetch_all(&self.pool)
                .await?;
        let mut by_type: BTreeMap<String, i64> =
            LicenseType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect();
        by_type.extend(rows);

        Ok(LicenseStatistics {
            total,
            active,
            expired,
            expiring_soon,
            total_revenue: round2(total_revenue),
            by_type,
        })
    }

    pub async fn activations(&self, user: &CurrentUser, id: i64) -> ApiResult<Vec<LicenseActivation>> {
        require_admin(user)?;
        self.fetch(id).await?;
        Ok(sqlx::query_as("SELECT * FROM license_activations WHERE license_id = ? ORDER BY id DESC")
            .bind(id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch(&self, id: i64) -> ApiResult<License> {
        sqlx::query_as("SELECT * FROM licenses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("授权不存在"))
    }

    async fn find_by_key(&self, license_key: &str) -> ApiResult<Option<License>> {
        Ok(sqlx::query_as("SELECT * FROM licenses WHERE license_key = ?")
            .bind(license_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_activation(
        &self,
        license_id: i64,
        hardware_fingerprint: &str,
    ) -> ApiResult<Option<LicenseActivation>> {
        Ok(sqlx::query_as(
            "SELECT * FROM license_activations WHERE license_id = ? AND hardware_fingerprint = ? AND is_active = 1",
        )
        .bind(license_id)
        .bind(hardware_fingerprint)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_key_has_four_groups() {
        let key = generate_license_key();
        let groups: Vec<&str> = key.split('-').collect();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 4));
        assert!(key.chars().all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn activation_code_is_uppercase_hex() {
        let code = generate_activation_code();
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn renewal_extends_from_later_of_end_and_now() {
        let now = Utc::now();
        let past = now - Duration::days(10);
        let future = now + Duration::days(10);
        assert_eq!(renewed_end(past, now, 1), now + Duration::days(30));
        assert_eq!(renewed_end(future, now, 2), future + Duration::days(60));
    }
}
