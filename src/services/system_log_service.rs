// System Log Service
// Purpose: append-only audit trail of user operations, with query, statistics and export

use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::models::{
    ActionCount, CleanupResult, LogQuery, LogStatistics, NewSystemLog, Pagination, SystemLog,
    UserActionCount,
};
use crate::utils::{ApiError, ApiResult};

/// 日志最短保留天数
pub const MIN_RETENTION_DAYS: i64 = 30;
pub const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Clone)]
pub struct SystemLogService {
    pool: SqlitePool,
}

impl SystemLogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn log_action(&self, entry: NewSystemLog) -> ApiResult<i64> {
        let extra = entry.extra_data.as_ref().map(|v| v.to_string());
        let result = sqlx::query(
            r#"
            INSERT INTO system_logs
                (user_id, action, target_type, target_id, description, ip_address, user_agent, extra_data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.target_type)
        .bind(entry.target_id)
        .bind(&entry.description)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(extra)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 写日志失败不影响业务操作
    pub async fn record(&self, entry: NewSystemLog) {
        let action = entry.action.clone();
        if let Err(e) = self.log_action(entry).await {
            tracing::warn!("Failed to write system log '{}': {}", action, e);
        }
    }

    pub async fn get_log(&self, id: i64) -> ApiResult<SystemLog> {
        sqlx::query_as("SELECT * FROM system_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ApiError::not_found("日志不存在"))
    }

    /// 按条件查询日志，`campus_id` 为 Some 时只返回该校区用户的日志
    pub async fn get_logs(
        &self,
        query: &LogQuery,
        campus_id: Option<i64>,
    ) -> ApiResult<Vec<SystemLog>> {
        let (limit, offset) = Pagination::new(query.skip, query.limit).bounds();
        let mut qb = Self::filtered(query, campus_id, "SELECT l.* FROM system_logs l");
        qb.push(" ORDER BY datetime(l.created_at) DESC, l.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        Ok(qb.build_query_as::<SystemLog>().fetch_all(&self.pool).await?)
    }

    pub async fn logs_by_campus(
        &self,
        campus_id: i64,
        page: Pagination,
    ) -> ApiResult<Vec<SystemLog>> {
        let query = LogQuery { skip: page.skip, limit: page.limit, ..Default::default() };
        self.get_logs(&query, Some(campus_id)).await
    }

    pub async fn statistics(&self, days: i64, campus_id: Option<i64>) -> ApiResult<LogStatistics> {
        let days = days.max(1);
        let since = Utc::now() - Duration::days(days);

        let mut total_qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM system_logs l LEFT JOIN users u ON u.id = l.user_id WHERE datetime(l.created_at) >= datetime(",
        );
        total_qb.push_bind(since).push(")");
        if let Some(campus_id) = campus_id {
            total_qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        let total: i64 = total_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut action_qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.action AS action, COUNT(*) AS count FROM system_logs l LEFT JOIN users u ON u.id = l.user_id WHERE datetime(l.created_at) >= datetime(",
        );
        action_qb.push_bind(since).push(")");
        if let Some(campus_id) = campus_id {
            action_qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        action_qb.push(" GROUP BY l.action ORDER BY count DESC");
        let by_action: Vec<ActionCount> =
            action_qb.build_query_as().fetch_all(&self.pool).await?;

        let mut user_qb = QueryBuilder::<Sqlite>::new(
            "SELECT l.user_id AS user_id, u.username AS username, COUNT(*) AS count FROM system_logs l LEFT JOIN users u ON u.id = l.user_id WHERE l.user_id IS NOT NULL AND datetime(l.created_at) >= datetime(",
        );
        user_qb.push_bind(since).push(")");
        if let Some(campus_id) = campus_id {
            user_qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        user_qb.push(" GROUP BY l.user_id, u.username ORDER BY count DESC LIMIT 10");
        let top_users: Vec<UserActionCount> =
            user_qb.build_query_as().fetch_all(&self.pool).await?;

        Ok(LogStatistics { days, total, by_action, top_users })
    }

    /// 导出 CSV（含表头）
    pub async fn export_csv(&self, query: &LogQuery, campus_id: Option<i64>) -> ApiResult<String> {
        let mut qb = Self::filtered(query, campus_id, "SELECT l.* FROM system_logs l");
        qb.push(" ORDER BY datetime(l.created_at) DESC, l.id DESC LIMIT 10000");
        let logs: Vec<SystemLog> = qb.build_query_as().fetch_all(&self.pool).await?;

        let mut csv = String::from(
            "id,user_id,action,target_type,target_id,description,ip_address,user_agent,created_at\n",
        );
        for log in logs {
            let row = [
                log.id.to_string(),
                log.user_id.map(|v| v.to_string()).unwrap_or_default(),
                log.action,
                log.target_type.unwrap_or_default(),
                log.target_id.map(|v| v.to_string()).unwrap_or_default(),
                log.description,
                log.ip_address.unwrap_or_default(),
                log.user_agent.unwrap_or_default(),
                log.created_at.to_rfc3339(),
            ];
            let line = row.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
            csv.push_str(&line);
            csv.push('\n');
        }

        Ok(csv)
    }

    /// 删除 N 天前的日志，N 不得小于 30
    pub async fn cleanup(&self, days: i64, operator_id: i64) -> ApiResult<CleanupResult> {
        if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(ApiError::validation_error(format!(
                "日志保留天数须在{}到{}天之间",
                MIN_RETENTION_DAYS, MAX_RETENTION_DAYS
            )));
        }

        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM system_logs WHERE datetime(created_at) < datetime(?)")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected();

        tracing::warn!("System logs older than {} days cleaned up: {} rows", days, deleted);

        self.log_action(
            NewSystemLog::new(
                Some(operator_id),
                "system_log_cleanup",
                format!("清理{}天前的系统日志，共{}条", days, deleted),
            )
            .extra(serde_json::json!({ "days": days, "deleted": deleted })),
        )
        .await?;

        Ok(CleanupResult { days, deleted })
    }

    fn filtered<'a>(
        query: &'a LogQuery,
        campus_id: Option<i64>,
        select: &str,
    ) -> QueryBuilder<'a, Sqlite> {
        let mut qb = QueryBuilder::<Sqlite>::new(select);
        qb.push(" LEFT JOIN users u ON u.id = l.user_id WHERE 1=1");
        if let Some(campus_id) = campus_id {
            qb.push(" AND u.campus_id = ").push_bind(campus_id);
        }
        if let Some(user_id) = query.user_id {
            qb.push(" AND l.user_id = ").push_bind(user_id);
        }
        if let Some(action) = &query.action {
            qb.push(" AND l.action = ").push_bind(action.as_str());
        }
        if let Some(target_type) = &query.target_type {
            qb.push(" AND l.target_type = ").push_bind(target_type.as_str());
        }
        qb
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::csv_field;

    #[test]
    fn csv_fields_are_quoted_when_needed() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
