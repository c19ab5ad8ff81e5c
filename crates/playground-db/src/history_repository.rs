use chrono::{DateTime, Utc};
use playground_core::error::AppError;
use playground_core::models::{HistoryEntry, NewHistoryEntry};
use playground_core::traits::HistoryStore;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for query history in the application database.
#[derive(Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of entries recorded for a user.
    pub async fn count(&self, user_login: &str) -> Result<u64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM query_history WHERE user_login = ?")
            .bind(user_login)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(row.0.max(0) as u64)
    }
}

impl HistoryStore for HistoryRepository {
    async fn record(&self, entry: &NewHistoryEntry) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO query_history (
                id, user_login, query, parameters, success, message,
                error_code, rows_affected, execution_time_ms, executed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&entry.user_login)
        .bind(&entry.query)
        .bind(entry.parameters.as_ref().map(|p| p.to_string()))
        .bind(entry.success)
        .bind(&entry.message)
        .bind(&entry.error_code)
        .bind(entry.rows_affected.map(|r| r as i64))
        .bind(entry.execution_time_ms.map(|t| t as i64))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(id)
    }

    async fn recent(&self, user_login: &str, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_login, query, parameters, success, message,
                   error_code, rows_affected, execution_time_ms, executed_at
            FROM query_history
            WHERE user_login = ?
            ORDER BY executed_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_login)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_login: String,
    query: String,
    parameters: Option<String>,
    success: bool,
    message: String,
    error_code: Option<String>,
    rows_affected: Option<i64>,
    execution_time_ms: Option<i64>,
    executed_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            user_login: row.user_login,
            query: row.query,
            parameters: row
                .parameters
                .and_then(|p| serde_json::from_str(&p).ok()),
            success: row.success,
            message: row.message,
            error_code: row.error_code,
            rows_affected: row.rows_affected.map(|r| r.max(0) as u64),
            execution_time_ms: row.execution_time_ms.map(|t| t.max(0) as u64),
            executed_at: row.executed_at,
        }
    }
}
